pub mod catalog_adapter;
pub mod circuit_breaker;
pub mod keepalive;
pub mod local_index;
pub mod profile_store;
pub mod recommendations;
pub mod reranker;
pub mod smart_search;

pub use catalog_adapter::{CatalogAdapter, HttpCatalogAdapter};
pub use circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerMetrics, CircuitBreakerService,
    CircuitBreakerStateEnum,
};
pub use keepalive::run_keepalive;
pub use local_index::LocalSongIndex;
pub use profile_store::{ActivityProfileStore, InMemoryProfileStore};
pub use recommendations::{CurrentSong, RecommendationGenerator};
pub use reranker::{PersonalizedReranker, RerankContext};
pub use smart_search::{SmartSearchEngine, SmartSearchOptions};
