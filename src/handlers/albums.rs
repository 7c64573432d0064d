//! `GET /api/albums` (§6): upstream passthrough by `id` or by `query`, mutually
//! exclusive — exactly one must be present.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AlbumsQuery {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AlbumsResponse {
    pub success: bool,
    pub data: Value,
}

pub async fn get_albums(
    State(state): State<AppState>,
    Query(params): Query<AlbumsQuery>,
) -> Result<Json<AlbumsResponse>> {
    let data = match (params.id.as_deref(), params.query.as_deref()) {
        (Some(id), None) => state.catalog.album_by_id(id).await?,
        (None, Some(query)) => state.catalog.albums_by_query(query).await?,
        (Some(_), Some(_)) => {
            return Err(AppError::InvalidInput("provide either id or query, not both".to_string()))
        }
        (None, None) => return Err(AppError::InvalidInput("id or query is required".to_string())),
    };

    Ok(Json(AlbumsResponse { success: true, data }))
}
