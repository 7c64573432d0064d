//! `GET /api/search` (§6): optionally-authenticated free-text search. Resolves
//! preferred languages from the query string and, if present, the caller's
//! preferences; runs the Smart Search Engine, optionally reranks for a signed-in
//! user, then buckets the merged result into the abridged response shape §6 names.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::error::{AppError, Result};
use crate::handlers::split_csv;
use crate::models::{AuthenticatedUser, Song};
use crate::services::catalog_adapter::all_providers_failed;
use crate::services::{RerankContext, SmartSearchOptions};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub languages: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LanguageSongSection {
    pub language: String,
    pub songs: Vec<Song>,
}

#[derive(Debug, Serialize)]
pub struct LanguageAlbumSection {
    pub language: String,
    pub albums: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct SearchData {
    pub songs: Vec<Song>,
    pub albums: Vec<Value>,
    pub artists: Vec<Value>,
    pub top_result: Option<Song>,
    pub related_languages: Vec<String>,
    pub album_language_sections: Vec<LanguageAlbumSection>,
    pub sections: Vec<LanguageSongSection>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub success: bool,
    pub data: SearchData,
}

pub async fn search(
    State(state): State<AppState>,
    user: Option<AuthenticatedUser>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<SearchResponse>> {
    let query = params.query.trim();
    if query.is_empty() {
        return Err(AppError::InvalidInput("query is required".to_string()));
    }
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(20).clamp(10, 20);

    let mut preferred_languages = split_csv(params.languages.as_deref());
    if let Some(user) = &user {
        if let Ok(Some(prefs)) = state.profile_store.get_preferences(&user.id).await {
            for lang in prefs.languages {
                let lang = lang.to_lowercase();
                if !preferred_languages.contains(&lang) {
                    preferred_languages.push(lang);
                }
            }
        }
    }

    let mut songs = state
        .smart_search
        .smart_search(
            query,
            SmartSearchOptions { wait_for_fresh: false, preferred_languages: preferred_languages.clone() },
        )
        .await;

    if let Some(user) = &user {
        songs = state
            .reranker
            .rerank(
                Some(&user.id),
                songs,
                &RerankContext { query: query.to_string(), preferred_languages: preferred_languages.clone() },
            )
            .await;
    }

    let catalog = state.catalog.clone();
    let metrics = state.metrics.clone();
    let (albums, artists) = crate::recovery::with_graceful_degradation(
        || async {
            catalog.broad_search(query, page).await.map(|result| (result.albums, result.artists)).map_err(|err| {
                metrics.record_upstream_error(&err.provider, &err.kind.to_string());
                AppError::Upstream(err)
            })
        },
        (Vec::new(), Vec::new()),
        "search_broad_supplement",
    )
    .await;

    if songs.is_empty() && albums.is_empty() && artists.is_empty() {
        return Err(all_providers_failed("search"));
    }

    let preferred_set: HashSet<String> = preferred_languages.iter().cloned().collect();
    if !preferred_set.is_empty() {
        let (mut in_preferred, others): (Vec<Song>, Vec<Song>) =
            songs.into_iter().partition(|song| preferred_set.contains(&song.language));
        in_preferred.extend(others);
        songs = in_preferred;
    }

    songs.truncate(limit);
    let top_result = songs.first().cloned();

    let mut related_languages: Vec<String> = Vec::new();
    for song in &songs {
        if !preferred_set.contains(&song.language) && !related_languages.contains(&song.language) {
            related_languages.push(song.language.clone());
        }
        if related_languages.len() >= 5 {
            break;
        }
    }

    let sections = language_song_sections(&songs);
    let album_language_sections = language_album_sections(&albums);

    Ok(Json(SearchResponse {
        success: true,
        data: SearchData {
            songs,
            albums,
            artists,
            top_result,
            related_languages,
            album_language_sections,
            sections,
        },
    }))
}

fn language_song_sections(songs: &[Song]) -> Vec<LanguageSongSection> {
    let mut order: Vec<String> = Vec::new();
    let mut buckets: std::collections::HashMap<String, Vec<Song>> = std::collections::HashMap::new();
    for song in songs {
        if !order.contains(&song.language) {
            order.push(song.language.clone());
        }
        buckets.entry(song.language.clone()).or_default().push(song.clone());
    }
    order
        .into_iter()
        .map(|language| {
            let songs = buckets.remove(&language).unwrap_or_default();
            LanguageSongSection { language, songs }
        })
        .collect()
}

fn language_album_sections(albums: &[Value]) -> Vec<LanguageAlbumSection> {
    let mut order: Vec<String> = Vec::new();
    let mut buckets: std::collections::HashMap<String, Vec<Value>> = std::collections::HashMap::new();
    for album in albums {
        let language = album
            .get("language")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_lowercase();
        if !order.contains(&language) {
            order.push(language.clone());
        }
        buckets.entry(language).or_default().push(album.clone());
    }
    order
        .into_iter()
        .map(|language| {
            let albums = buckets.remove(&language).unwrap_or_default();
            LanguageAlbumSection { language, albums }
        })
        .collect()
}
