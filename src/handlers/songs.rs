//! `GET /api/songs/:id` (§6): an upstream passthrough for a single song record.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct SongResponse {
    pub success: bool,
    pub data: Value,
}

pub async fn get_song(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<SongResponse>> {
    let data = state.catalog.song_by_id(&id).await?;
    Ok(Json(SongResponse { success: true, data }))
}
