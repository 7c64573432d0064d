//! Preferences, activity log, and the derived `RealtimeProfile` (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::song::ArtistRef;

/// `users/{uid}` preferences + metadata (§3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPreferences {
    pub uid: String,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default, rename = "favoriteArtists")]
    pub favorite_artists: Vec<ArtistRef>,
    #[serde(default, rename = "displayName")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// The activity kinds a client may log (§3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Search,
    Play,
    Skip,
    SearchClick,
}

impl std::fmt::Display for ActivityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActivityType::Search => "search",
            ActivityType::Play => "play",
            ActivityType::Skip => "skip",
            ActivityType::SearchClick => "search_click",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ActivityType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "search" => Ok(ActivityType::Search),
            "play" => Ok(ActivityType::Play),
            "skip" => Ok(ActivityType::Skip),
            "search_click" => Ok(ActivityType::SearchClick),
            _ => Err(()),
        }
    }
}

/// A single push-only entry under `users/{uid}/activity/{pushId}` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub timestamp: DateTime<Utc>,
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

/// `user_activity/{uid}/{songId}` derived aggregate (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SongAggregate {
    pub play_count: u32,
    pub skip_count: u32,
    pub search_clicked: u32,
    pub last_played: Option<DateTime<Utc>>,
    pub affinity: f64,
}

impl SongAggregate {
    /// `affinity = play_count*2 + search_clicked*0.75 − skip_count*2.5` (§3).
    pub fn recompute_affinity(&mut self) {
        self.affinity = self.play_count as f64 * 2.0 + self.search_clicked as f64 * 0.75
            - self.skip_count as f64 * 2.5;
    }
}

/// A song interaction summary as carried inside `RealtimeProfile::song_interactions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongInteraction {
    pub play_count: u32,
    pub skip_count: u32,
    pub search_clicked: u32,
    pub affinity: f64,
    pub last_played: Option<DateTime<Utc>>,
    pub artist: Option<String>,
    pub language: Option<String>,
}

/// Built on demand by the Activity & Profile Store, cached by the reranker for 2
/// minutes (§3, §4.4).
#[derive(Debug, Clone, Default)]
pub struct RealtimeProfile {
    pub languages: Vec<String>,
    pub language_affinity: HashMap<String, f64>,
    pub favorite_artists: Vec<String>,
    pub artist_affinity: HashMap<String, f64>,
    /// Deduped, capped at 40 (§3).
    pub search_terms: Vec<String>,
    /// Keyed by song id, capped at 500 most-recent (§3).
    pub song_interactions: HashMap<String, SongInteraction>,
}

impl RealtimeProfile {
    pub const MAX_SEARCH_TERMS: usize = 40;
    pub const MAX_SONG_INTERACTIONS: usize = 500;

    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
            && self.favorite_artists.is_empty()
            && self.search_terms.is_empty()
            && self.song_interactions.is_empty()
    }
}
