pub mod auth;
pub mod cache;
pub mod index;
pub mod song;
pub mod user;

pub use auth::{AuthenticatedUser, Claims};
pub use cache::CacheEntry;
pub use index::LocalIndexEntry;
pub use song::{AlbumRef, ArtistRef, MatchTier, RankingAnnotation, Song, TaggedUrl};
pub use user::{
    ActivityEvent, ActivityType, RealtimeProfile, SongInteraction, UserPreferences,
};
