//! `POST /api/activity/:type` and `GET /api/activity/history` (§6): append-only
//! activity logging and its read path.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{AppError, Result};
use crate::models::{ActivityEvent, ActivityType, AuthenticatedUser};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RecordActivityBody {
    #[serde(default, rename = "songId")]
    pub song_id: Option<String>,
    #[serde(default, rename = "songName")]
    pub song_name: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default, rename = "skipTime")]
    pub skip_time: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ActivityResponse {
    pub success: bool,
    pub data: ActivityEvent,
}

pub async fn record_activity(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(kind): Path<String>,
    Json(body): Json<RecordActivityBody>,
) -> Result<Json<ActivityResponse>> {
    let kind = ActivityType::from_str(&kind)
        .map_err(|_| AppError::InvalidInput(format!("unknown activity type '{kind}'")))?;

    if matches!(kind, ActivityType::Play | ActivityType::Skip) && body.song_id.is_none() {
        return Err(AppError::InvalidInput("songId is required".to_string()));
    }

    let event = ActivityEvent {
        kind,
        timestamp: Utc::now(),
        song_id: body.song_id,
        song_name: body.song_name,
        artist: body.artist,
        language: body.language.map(|l| l.to_lowercase()),
        genre: body.genre,
        query: body.query,
        duration: body.duration,
        skip_time: body.skip_time,
    };

    state.profile_store.record_activity(&user.id, event.clone()).await?;

    Ok(Json(ActivityResponse { success: true, data: event }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub data: Vec<ActivityEvent>,
}

pub async fn history(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>> {
    let limit = crate::handlers::clamp_limit(params.limit, 50, 200);
    let data = state
        .profile_store
        .activity_history(&user.id, params.kind.as_deref(), limit)
        .await?;

    Ok(Json(HistoryResponse { success: true, data }))
}
