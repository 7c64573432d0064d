//! Upstream Catalog Adapter (§4.1): timeout-bounded HTTP calls to a primary and a
//! fallback catalog provider, normalized to the common `Song` record.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::UpstreamTimeouts;
use crate::error::{AppError, UpstreamError, UpstreamErrorKind};
use crate::models::Song;
use crate::services::circuit_breaker::CircuitBreakerService;

pub const PRIMARY_PROVIDER: &str = "primary";
pub const FALLBACK_PROVIDER: &str = "fallback";

/// A page of primary-provider results.
#[derive(Debug, Clone, Default)]
pub struct PrimaryPage {
    pub start: u32,
    pub total: u32,
    pub results: Vec<Song>,
}

/// Raw artist/album records returned by broad search and utility lookups. Kept as
/// `serde_json::Value` since the HTTP surface passes these through largely unmodified
/// (§6 "upstream passthrough").
#[derive(Debug, Clone, Default)]
pub struct BroadSearchResult {
    pub songs: Vec<Song>,
    pub albums: Vec<Value>,
    pub artists: Vec<Value>,
}

/// The four logical operations §4.1 names, each independently timeout-bounded.
#[async_trait]
pub trait CatalogAdapter: Send + Sync {
    async fn primary_songs(&self, query: &str, page: u32) -> Result<PrimaryPage, UpstreamError>;
    async fn fallback_songs(&self, query: &str) -> Vec<Song>;
    async fn broad_search(&self, query: &str, page: u32) -> Result<BroadSearchResult, UpstreamError>;

    async fn song_by_id(&self, id: &str) -> Result<Value, UpstreamError>;
    async fn album_by_id(&self, id: &str) -> Result<Value, UpstreamError>;
    async fn albums_by_query(&self, query: &str) -> Result<Value, UpstreamError>;
    async fn artists_by_query(&self, query: &str) -> Result<Value, UpstreamError>;
    /// Issues `"Top <L> Artists"` and `"Popular <L> Artists"` in parallel and merges by id.
    async fn artists_by_language(&self, language: &str) -> Result<Vec<Value>, UpstreamError>;
    async fn artist_albums(&self, artist_id: &str, limit: u32, page: u32) -> Result<Value, UpstreamError>;
}

/// Real HTTP-backed implementation against a primary and fallback provider. Every
/// call is additionally gated by a per-provider circuit breaker so a provider that
/// is failing outright stops being hammered between individual request timeouts.
pub struct HttpCatalogAdapter {
    client: Client,
    primary_base: String,
    fallback_base: String,
    timeouts: UpstreamTimeouts,
    circuit_breaker: Arc<CircuitBreakerService>,
}

impl HttpCatalogAdapter {
    pub fn new(
        primary_base: impl Into<String>,
        fallback_base: impl Into<String>,
        timeouts: UpstreamTimeouts,
        circuit_breaker: Arc<CircuitBreakerService>,
    ) -> Self {
        Self {
            client: Client::new(),
            primary_base: primary_base.into(),
            fallback_base: fallback_base.into(),
            timeouts,
            circuit_breaker,
        }
    }

    async fn get_json(&self, url: &str, timeout: Duration, provider: &str) -> Result<Value, UpstreamError> {
        let client = &self.client;
        let result = self
            .circuit_breaker
            .execute(provider, || async {
                let response = tokio::time::timeout(timeout, client.get(url).send())
                    .await
                    .map_err(|_| AppError::Upstream(UpstreamError::new(provider, UpstreamErrorKind::Timeout)))?
                    .map_err(|_| AppError::Upstream(UpstreamError::new(provider, UpstreamErrorKind::Timeout)))?;

                if !response.status().is_success() {
                    return Err(AppError::Upstream(UpstreamError::new(provider, UpstreamErrorKind::Status)));
                }

                response
                    .json::<Value>()
                    .await
                    .map_err(|_| AppError::Upstream(UpstreamError::new(provider, UpstreamErrorKind::Parse)))
            })
            .await;

        result.map_err(|err| match err {
            AppError::Upstream(upstream) => upstream,
            _ => UpstreamError::new(provider, UpstreamErrorKind::Status),
        })
    }
}

#[async_trait]
impl CatalogAdapter for HttpCatalogAdapter {
    async fn primary_songs(&self, query: &str, page: u32) -> Result<PrimaryPage, UpstreamError> {
        let url = format!(
            "{}/search/songs?query={}&page={}",
            self.primary_base,
            urlencoding::encode(query),
            page
        );
        let body = self.get_json(&url, self.timeouts.primary, PRIMARY_PROVIDER).await?;

        let data = body.get("data").unwrap_or(&body);
        let start = data.get("start").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        let total = data.get("total").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        let results = data
            .get("results")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(Song::from_primary).collect())
            .unwrap_or_default();

        Ok(PrimaryPage { start, total, results })
    }

    async fn fallback_songs(&self, query: &str) -> Vec<Song> {
        let url = format!("{}/search?q={}", self.fallback_base, urlencoding::encode(query));
        match self.get_json(&url, self.timeouts.fallback, FALLBACK_PROVIDER).await {
            Ok(body) => body
                .as_array()
                .map(|arr| arr.iter().filter_map(Song::from_fallback).collect())
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    async fn broad_search(&self, query: &str, page: u32) -> Result<BroadSearchResult, UpstreamError> {
        let url = format!(
            "{}/search/all?query={}&page={}",
            self.primary_base,
            urlencoding::encode(query),
            page
        );
        let body = self.get_json(&url, self.timeouts.primary, PRIMARY_PROVIDER).await?;
        let data = body.get("data").unwrap_or(&body);

        let songs = data
            .get("songs")
            .and_then(|v| v.get("results"))
            .or_else(|| data.get("songs"))
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(Song::from_primary).collect())
            .unwrap_or_default();

        let albums = data
            .get("albums")
            .and_then(|v| v.get("results"))
            .or_else(|| data.get("albums"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let artists = data
            .get("artists")
            .and_then(|v| v.get("results"))
            .or_else(|| data.get("artists"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(BroadSearchResult { songs, albums, artists })
    }

    async fn song_by_id(&self, id: &str) -> Result<Value, UpstreamError> {
        let url = format!("{}/songs/{}", self.primary_base, id);
        self.get_json(&url, self.timeouts.lookup, PRIMARY_PROVIDER).await
    }

    async fn album_by_id(&self, id: &str) -> Result<Value, UpstreamError> {
        let url = format!("{}/albums?id={}", self.primary_base, id);
        self.get_json(&url, self.timeouts.lookup, PRIMARY_PROVIDER).await
    }

    async fn albums_by_query(&self, query: &str) -> Result<Value, UpstreamError> {
        let url = format!("{}/search/albums?query={}", self.primary_base, urlencoding::encode(query));
        self.get_json(&url, self.timeouts.lookup, PRIMARY_PROVIDER).await
    }

    async fn artists_by_query(&self, query: &str) -> Result<Value, UpstreamError> {
        let url = format!("{}/search/artists?query={}", self.primary_base, urlencoding::encode(query));
        self.get_json(&url, self.timeouts.lookup, PRIMARY_PROVIDER).await
    }

    async fn artists_by_language(&self, language: &str) -> Result<Vec<Value>, UpstreamError> {
        let top = self.artists_by_query(&format!("Top {language} Artists"));
        let popular = self.artists_by_query(&format!("Popular {language} Artists"));
        let (top, popular) = tokio::join!(top, popular);

        let mut merged = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for result in [top, popular].into_iter().flatten() {
            let items = result
                .get("data")
                .and_then(|v| v.get("results"))
                .or_else(|| result.as_array().map(|_| &result))
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            for item in items {
                if let Some(id) = item.get("id").and_then(|v| v.as_str()) {
                    if seen.insert(id.to_string()) {
                        merged.push(item);
                    }
                }
            }
        }

        Ok(merged)
    }

    async fn artist_albums(&self, artist_id: &str, limit: u32, page: u32) -> Result<Value, UpstreamError> {
        let url = format!(
            "{}/artists/{}/albums?limit={}&page={}",
            self.primary_base, artist_id, limit, page
        );
        self.get_json(&url, self.timeouts.lookup, PRIMARY_PROVIDER).await
    }
}

/// Convert an all-providers-failed condition into the app error §7 reserves for it.
pub fn all_providers_failed(step: &str) -> AppError {
    AppError::Upstream(UpstreamError::new(step, UpstreamErrorKind::Timeout))
}
