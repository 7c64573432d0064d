use std::sync::Arc;

use sonara_core::{
    create_router, ActivityProfileStore, AppConfig, AppState, CatalogAdapter, CircuitBreakerService,
    HttpCatalogAdapter, InMemoryProfileStore, JwtTokenVerifier, LocalSongIndex, MetricsCollector,
    PersonalizedReranker, RecommendationGenerator, SmartSearchEngine, TokenVerifier,
};

#[tokio::main]
async fn main() {
    if dotenvy::dotenv().is_err() {
        eprintln!("no .env file found, reading configuration from the environment only");
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            std::process::exit(1);
        }
    };

    if let Some(code) = sonara_core::services::keepalive::validate_or_exit_code(&config.keepalive) {
        tracing::error!("invalid keepalive configuration");
        std::process::exit(code);
    }

    let metrics = Arc::new(MetricsCollector::new().expect("failed to register prometheus metrics"));

    let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
        tracing::warn!("JWT_SECRET not set, using an insecure development default");
        "development-secret-do-not-use-in-production".to_string()
    });
    let token_verifier: Arc<dyn TokenVerifier> = Arc::new(JwtTokenVerifier::new(&jwt_secret));

    let circuit_breaker = Arc::new(CircuitBreakerService::new());

    let primary_base = std::env::var("PRIMARY_CATALOG_BASE_URL")
        .unwrap_or_else(|_| "https://catalog-primary.example.internal".to_string());
    let fallback_base = std::env::var("FALLBACK_CATALOG_BASE_URL")
        .unwrap_or_else(|_| "https://catalog-fallback.example.internal".to_string());

    let catalog: Arc<dyn CatalogAdapter> = Arc::new(HttpCatalogAdapter::new(
        primary_base,
        fallback_base,
        config.upstream_timeouts,
        circuit_breaker,
    ));

    let local_index = Arc::new(LocalSongIndex::new(
        config.search_tuning.local_index_cap,
        config.search_tuning.local_index_search_cap,
    ));

    let smart_search = Arc::new(SmartSearchEngine::new(
        catalog.clone(),
        local_index.clone(),
        metrics.clone(),
        config.search_tuning,
    ));

    let profile_store: Arc<dyn ActivityProfileStore> = Arc::new(InMemoryProfileStore::new());

    let reranker = Arc::new(PersonalizedReranker::new(
        profile_store.clone(),
        config.search_tuning.profile_cache_cap,
        config.search_tuning.profile_cache_ttl,
        metrics.clone(),
    ));

    let recommendations = Arc::new(RecommendationGenerator::new(
        smart_search.clone(),
        reranker.clone(),
        profile_store.clone(),
        metrics.clone(),
    ));

    let keepalive_config = config.keepalive.clone();
    let bind_address = config.server.bind_address();

    let state = AppState {
        smart_search,
        reranker,
        recommendations,
        catalog,
        profile_store,
        token_verifier,
        metrics,
        config: Arc::new(config),
    };

    if keepalive_config.url.is_some() {
        tokio::spawn(sonara_core::services::keepalive::run_keepalive(keepalive_config));
    }

    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_address).await.unwrap_or_else(|err| {
        tracing::error!(error = %err, address = %bind_address, "failed to bind");
        std::process::exit(1);
    });

    tracing::info!(address = %bind_address, "sonara-core listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap_or_else(|err| {
            tracing::error!(error = %err, "server exited with error");
            std::process::exit(1);
        });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
