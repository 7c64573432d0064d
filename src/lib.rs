//! Search, ranking and personalization core for a music-streaming hub.
//!
//! Three components do the real work — the Smart Search Engine (§4.3), the
//! Personalized Reranker (§4.4) and the Recommendation Generator (§4.5) — sitting
//! on top of an Upstream Catalog Adapter (§4.1) and a Local Song Index (§4.2). This
//! crate wires them into an axum service; persistent storage of preferences and
//! activity, and bearer-token verification, are external collaborators (§1).

use axum::{
    http::{StatusCode, Uri},
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod error;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod recovery;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, ErrorResponse, Result};
pub use metrics::MetricsCollector;
pub use middleware::{JwtTokenVerifier, TokenVerifier};
pub use services::{
    ActivityProfileStore, CatalogAdapter, CircuitBreakerService, CurrentSong, HttpCatalogAdapter,
    InMemoryProfileStore, LocalSongIndex, PersonalizedReranker, RecommendationGenerator,
    SmartSearchEngine,
};

/// Shared application state, threaded through every handler via axum's `State`
/// extractor. All fields are `Arc`-wrapped so cloning `AppState` (required for
/// axum's per-request state access) is cheap.
#[derive(Clone)]
pub struct AppState {
    pub smart_search: Arc<SmartSearchEngine>,
    pub reranker: Arc<PersonalizedReranker>,
    pub recommendations: Arc<RecommendationGenerator>,
    pub catalog: Arc<dyn CatalogAdapter>,
    pub profile_store: Arc<dyn ActivityProfileStore>,
    pub token_verifier: Arc<dyn TokenVerifier>,
    pub metrics: Arc<MetricsCollector>,
    pub config: Arc<AppConfig>,
}

/// `GET /health` (§6): redirects to `/healthz`.
async fn health_redirect() -> impl IntoResponse {
    Redirect::temporary("/healthz")
}

async fn not_found(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        axum::Json(serde_json::json!({ "error": "not found", "path": uri.path() })),
    )
}

/// Prometheus exposition endpoint, scraped rather than called by API clients.
async fn metrics_endpoint(axum::extract::State(state): axum::extract::State<AppState>) -> impl IntoResponse {
    match state.metrics.get_metrics() {
        Ok(body) => ([("content-type", "text/plain; version=0.0.4")], body).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Builds the full router described in §6: public read endpoints, an optionally
/// authenticated search endpoint, and an authenticated group for preferences,
/// activity and recommendations.
pub fn create_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/health", get(health_redirect))
        .route("/metrics", get(metrics_endpoint));

    let search_routes = Router::new()
        .route("/api/search", get(handlers::search::search))
        .route("/api/songs/:id", get(handlers::songs::get_song))
        .route("/api/albums", get(handlers::albums::get_albums))
        .route("/api/artists/by-language", get(handlers::artists::by_language))
        .route("/api/artists/:id/albums", get(handlers::artists::albums))
        .layer(axum::middleware::from_fn_with_state(
            state.token_verifier.clone(),
            middleware::optional_auth_middleware,
        ));

    let authenticated_routes = Router::new()
        .route(
            "/api/user/preferences",
            post(handlers::preferences::put_preferences).get(handlers::preferences::get_preferences),
        )
        .route("/api/activity/:kind", post(handlers::activity::record_activity))
        .route("/api/activity/history", get(handlers::activity::history))
        .route("/api/recommendations", get(handlers::recommendations::recommendations))
        .route("/api/recommendations/next", post(handlers::recommendations::next_track))
        .layer(axum::middleware::from_fn_with_state(
            state.token_verifier.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(search_routes)
        .merge(authenticated_routes)
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(middleware::tracing_middleware))
                .layer(axum::middleware::from_fn_with_state(
                    state.metrics.clone(),
                    middleware::latency_middleware,
                ))
                .layer(middleware::create_cors_layer()),
        )
        .with_state(state)
}
