//! Activity & Profile Store (§3, §4.4): interface only. The real backing store (a
//! remote key-value tree) is an external collaborator (§1); this module defines the
//! trait the rest of the core programs against, plus an in-memory implementation
//! used for local runs and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::AppError;
use crate::models::{ActivityEvent, RealtimeProfile, SongInteraction, UserPreferences};

/// Read preferences; read/append activity; build a `RealtimeProfile` from the
/// accumulated aggregates. All failures surface as `AppError::Store` per §7.
#[async_trait]
pub trait ActivityProfileStore: Send + Sync {
    async fn get_preferences(&self, uid: &str) -> Result<Option<UserPreferences>, AppError>;
    async fn put_preferences(&self, prefs: UserPreferences) -> Result<(), AppError>;

    /// Appends to the activity log (the durable anchor, §5) and updates derived
    /// aggregates. Aggregate-write failures are logged and swallowed; only a
    /// failure of the log append itself propagates (§7 `StoreError`).
    async fn record_activity(&self, uid: &str, event: ActivityEvent) -> Result<(), AppError>;

    async fn activity_history(&self, uid: &str, kind: Option<&str>, limit: usize) -> Result<Vec<ActivityEvent>, AppError>;

    async fn build_realtime_profile(&self, uid: &str) -> Result<RealtimeProfile, AppError>;
}

#[derive(Default)]
struct UserState {
    preferences: Option<UserPreferences>,
    activity: Vec<ActivityEvent>,
    song_interactions: HashMap<String, SongInteraction>,
    artist_affinity: HashMap<String, f64>,
    language_affinity: HashMap<String, f64>,
}

/// In-memory `ActivityProfileStore`, grounded in the same append-log-plus-derived-
/// aggregate shape as the real remote tree (§9: "treat the log as the source of
/// truth; treat derived paths as caches that can be rebuilt from it").
#[derive(Default)]
pub struct InMemoryProfileStore {
    users: RwLock<HashMap<String, UserState>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ActivityProfileStore for InMemoryProfileStore {
    async fn get_preferences(&self, uid: &str) -> Result<Option<UserPreferences>, AppError> {
        Ok(self.users.read().unwrap().get(uid).and_then(|s| s.preferences.clone()))
    }

    async fn put_preferences(&self, prefs: UserPreferences) -> Result<(), AppError> {
        let mut users = self.users.write().unwrap();
        let state = users.entry(prefs.uid.clone()).or_default();
        for lang in &prefs.languages {
            state.language_affinity.entry(lang.clone()).or_insert(0.0);
        }
        for artist in &prefs.favorite_artists {
            state.artist_affinity.entry(artist.name.clone()).or_insert(0.0);
        }
        state.preferences = Some(prefs);
        Ok(())
    }

    async fn record_activity(&self, uid: &str, event: ActivityEvent) -> Result<(), AppError> {
        use crate::models::ActivityType;

        let mut users = self.users.write().unwrap();
        let state = users.entry(uid.to_string()).or_default();

        if let (Some(song_id), ActivityType::Play | ActivityType::Skip | ActivityType::SearchClick) =
            (&event.song_id, event.kind)
        {
            let interaction = state.song_interactions.entry(song_id.clone()).or_insert(SongInteraction {
                play_count: 0,
                skip_count: 0,
                search_clicked: 0,
                affinity: 0.0,
                last_played: None,
                artist: event.artist.clone(),
                language: event.language.clone(),
            });

            match event.kind {
                ActivityType::Play => {
                    interaction.play_count += 1;
                    interaction.last_played = Some(event.timestamp);
                }
                ActivityType::Skip => interaction.skip_count += 1,
                ActivityType::SearchClick => interaction.search_clicked += 1,
                ActivityType::Search => unreachable!(),
            }

            interaction.affinity = interaction.play_count as f64 * 2.0
                + interaction.search_clicked as f64 * 0.75
                - interaction.skip_count as f64 * 2.5;

            if let Some(artist) = &event.artist {
                let bump = match event.kind {
                    ActivityType::Play => 2.0,
                    ActivityType::Skip => -2.5,
                    ActivityType::SearchClick => 0.75,
                    ActivityType::Search => 0.0,
                };
                *state.artist_affinity.entry(artist.clone()).or_insert(0.0) += bump;
            }
            if let Some(lang) = &event.language {
                let bump = match event.kind {
                    ActivityType::Play => 1.0,
                    ActivityType::Skip => -1.0,
                    _ => 0.0,
                };
                *state.language_affinity.entry(lang.clone()).or_insert(0.0) += bump;
            }
        }

        if state.song_interactions.len() > RealtimeProfile::MAX_SONG_INTERACTIONS {
            if let Some(oldest) = state
                .song_interactions
                .iter()
                .min_by_key(|(_, i)| i.last_played)
                .map(|(id, _)| id.clone())
            {
                state.song_interactions.remove(&oldest);
            }
        }

        state.activity.push(event);
        Ok(())
    }

    async fn activity_history(&self, uid: &str, kind: Option<&str>, limit: usize) -> Result<Vec<ActivityEvent>, AppError> {
        let users = self.users.read().unwrap();
        let Some(state) = users.get(uid) else {
            return Ok(Vec::new());
        };
        let filtered = state
            .activity
            .iter()
            .rev()
            .filter(|e| kind.map(|k| e.kind.to_string() == k).unwrap_or(true))
            .take(limit)
            .cloned()
            .collect();
        Ok(filtered)
    }

    async fn build_realtime_profile(&self, uid: &str) -> Result<RealtimeProfile, AppError> {
        let users = self.users.read().unwrap();
        let Some(state) = users.get(uid) else {
            return Ok(RealtimeProfile::default());
        };

        let languages = state.preferences.as_ref().map(|p| p.languages.clone()).unwrap_or_default();
        let favorite_artists = state
            .preferences
            .as_ref()
            .map(|p| p.favorite_artists.iter().map(|a| a.name.clone()).collect())
            .unwrap_or_default();

        let mut search_terms: Vec<String> = state
            .activity
            .iter()
            .rev()
            .filter_map(|e| e.query.clone())
            .collect();
        search_terms.dedup();
        search_terms.truncate(RealtimeProfile::MAX_SEARCH_TERMS);

        let mut song_interactions = state.song_interactions.clone();
        if song_interactions.len() > RealtimeProfile::MAX_SONG_INTERACTIONS {
            let mut entries: Vec<_> = song_interactions.into_iter().collect();
            entries.sort_by_key(|(_, i)| std::cmp::Reverse(i.last_played));
            entries.truncate(RealtimeProfile::MAX_SONG_INTERACTIONS);
            song_interactions = entries.into_iter().collect();
        }

        Ok(RealtimeProfile {
            languages,
            language_affinity: state.language_affinity.clone(),
            favorite_artists,
            artist_affinity: state.artist_affinity.clone(),
            search_terms,
            song_interactions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActivityType;
    use chrono::Utc;

    fn play_event(song_id: &str) -> ActivityEvent {
        ActivityEvent {
            kind: ActivityType::Play,
            timestamp: Utc::now(),
            song_id: Some(song_id.to_string()),
            song_name: None,
            artist: Some("Imagine Dragons".to_string()),
            language: Some("english".to_string()),
            genre: None,
            query: None,
            duration: None,
            skip_time: None,
        }
    }

    #[tokio::test]
    async fn repeated_play_doubles_aggregate_and_log() {
        let store = InMemoryProfileStore::new();
        store.record_activity("u1", play_event("s1")).await.unwrap();
        store.record_activity("u1", play_event("s1")).await.unwrap();

        let profile = store.build_realtime_profile("u1").await.unwrap();
        assert_eq!(profile.song_interactions["s1"].play_count, 2);

        let history = store.activity_history("u1", None, 10).await.unwrap();
        assert_eq!(history.len(), 2);
    }
}
