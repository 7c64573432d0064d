//! `GET /api/recommendations` and `POST /api/recommendations/next` (§6).

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{AuthenticatedUser, Song};
use crate::services::CurrentSong;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RecommendationsQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct RecommendationsResponse {
    pub success: bool,
    pub count: usize,
    pub data: Vec<Song>,
}

pub async fn recommendations(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<RecommendationsQuery>,
) -> Result<Json<RecommendationsResponse>> {
    let limit = crate::handlers::clamp_limit(params.limit, 50, 100);

    let prefs = state
        .profile_store
        .get_preferences(&user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("preferences".to_string()))?;

    let data = state.recommendations.generate_recommendations(&user.id, &prefs, limit).await?;

    Ok(Json(RecommendationsResponse { success: true, count: data.len(), data }))
}

#[derive(Debug, Deserialize)]
pub struct NextTrackBody {
    #[serde(rename = "currentSong")]
    pub current_song: CurrentSong,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct NextTrackResponse {
    pub success: bool,
    pub count: usize,
    pub data: Vec<Song>,
}

pub async fn next_track(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<NextTrackBody>,
) -> Result<Json<NextTrackResponse>> {
    let limit = crate::handlers::clamp_limit(body.limit, 10, 20);
    let data = state
        .recommendations
        .generate_next_track(&user.id, &body.current_song, limit)
        .await?;

    Ok(Json(NextTrackResponse { success: true, count: data.len(), data }))
}
