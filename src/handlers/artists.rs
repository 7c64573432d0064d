//! `GET /api/artists/by-language` and `GET /api/artists/:id/albums` (§6).

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ByLanguageQuery {
    pub language: String,
}

#[derive(Debug, Serialize)]
pub struct ArtistsByLanguageResponse {
    pub success: bool,
    pub count: usize,
    pub data: Vec<Value>,
}

pub async fn by_language(
    State(state): State<AppState>,
    Query(params): Query<ByLanguageQuery>,
) -> Result<Json<ArtistsByLanguageResponse>> {
    let language = params.language.trim().to_lowercase();
    if language.is_empty() {
        return Err(AppError::InvalidInput("language is required".to_string()));
    }
    let data = state.catalog.artists_by_language(&language).await?;
    Ok(Json(ArtistsByLanguageResponse { success: true, count: data.len(), data }))
}

#[derive(Debug, Deserialize)]
pub struct ArtistAlbumsQuery {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ArtistAlbumsResponse {
    pub success: bool,
    pub data: Value,
}

pub async fn albums(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ArtistAlbumsQuery>,
) -> Result<Json<ArtistAlbumsResponse>> {
    let limit = params.limit.unwrap_or(20).clamp(1, 50);
    let page = params.page.unwrap_or(1).max(1);
    let data = state.catalog.artist_albums(&id, limit, page).await?;
    Ok(Json(ArtistAlbumsResponse { success: true, data }))
}
