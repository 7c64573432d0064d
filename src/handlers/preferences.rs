//! `POST`/`GET /api/user/preferences` (§6): stored language and favorite-artist
//! preferences, merged rather than replaced on write.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{ArtistRef, AuthenticatedUser, UserPreferences};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PutPreferencesBody {
    #[serde(default)]
    pub languages: Option<Vec<String>>,
    #[serde(default, rename = "favoriteArtists")]
    pub favorite_artists: Option<Vec<ArtistRef>>,
}

#[derive(Debug, Serialize)]
pub struct PreferencesResponse {
    pub success: bool,
    pub message: Option<&'static str>,
    pub data: UserPreferences,
}

pub async fn put_preferences(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<PutPreferencesBody>,
) -> Result<Json<PreferencesResponse>> {
    if body.languages.is_none() && body.favorite_artists.is_none() {
        return Err(AppError::InvalidInput(
            "languages or favoriteArtists is required".to_string(),
        ));
    }

    let existing = state.profile_store.get_preferences(&user.id).await?;
    let now = Utc::now();

    let merged = match existing {
        Some(mut prefs) => {
            if let Some(languages) = body.languages {
                prefs.languages = languages.into_iter().map(|l| l.to_lowercase()).collect();
            }
            if let Some(favorite_artists) = body.favorite_artists {
                prefs.favorite_artists = favorite_artists;
            }
            prefs.updated_at = now;
            prefs
        }
        None => UserPreferences {
            uid: user.id.clone(),
            languages: body
                .languages
                .unwrap_or_default()
                .into_iter()
                .map(|l| l.to_lowercase())
                .collect(),
            favorite_artists: body.favorite_artists.unwrap_or_default(),
            display_name: None,
            email: user.email.clone(),
            created_at: now,
            updated_at: now,
        },
    };

    state.profile_store.put_preferences(merged.clone()).await?;

    Ok(Json(PreferencesResponse { success: true, message: Some("preferences saved"), data: merged }))
}

pub async fn get_preferences(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<PreferencesResponse>> {
    let prefs = state
        .profile_store
        .get_preferences(&user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("preferences".to_string()))?;

    Ok(Json(PreferencesResponse { success: true, message: None, data: prefs }))
}
