//! Recommendation Generator (§4.5): seed-query synthesis, candidate collection via
//! the Smart Search Engine, rule-based pre-scoring, then reranking. Includes a
//! "next track" mode with hard playback-continuity constraints.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use crate::error::AppError;
use crate::metrics::MetricsCollector;
use crate::models::{ActivityType, Song, UserPreferences};
use crate::services::profile_store::ActivityProfileStore;
use crate::services::reranker::{PersonalizedReranker, RerankContext};
use crate::services::smart_search::{SmartSearchEngine, SmartSearchOptions};

const DEFAULT_FALLBACK_LANGUAGE: &str = "hindi";

/// The current song passed to `/api/recommendations/next` (§6, §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentSong {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub artists: Vec<crate::models::ArtistRef>,
    #[serde(default)]
    pub album: crate::models::AlbumRef,
}

pub struct RecommendationGenerator {
    search: Arc<SmartSearchEngine>,
    reranker: Arc<PersonalizedReranker>,
    profile_store: Arc<dyn ActivityProfileStore>,
    metrics: Arc<MetricsCollector>,
}

impl RecommendationGenerator {
    pub fn new(
        search: Arc<SmartSearchEngine>,
        reranker: Arc<PersonalizedReranker>,
        profile_store: Arc<dyn ActivityProfileStore>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self { search, reranker, profile_store, metrics }
    }

    /// `generateRecommendations(prefs, uid)` (§4.5 general mode).
    pub async fn generate_recommendations(&self, uid: &str, prefs: &UserPreferences, limit: usize) -> Result<Vec<Song>, AppError> {
        let start = Instant::now();
        let profile = self.profile_store.build_realtime_profile(uid).await.unwrap_or_default();
        let recent_skips: HashSet<String> = self
            .profile_store
            .activity_history(uid, Some(&ActivityType::Skip.to_string()), 100)
            .await
            .unwrap_or_default()
            .into_iter()
            .filter_map(|e| e.song_id)
            .collect();

        let seeds = build_seed_queries(prefs, &profile);

        let search_futures = seeds.iter().map(|seed| {
            self.search.smart_search(
                seed,
                SmartSearchOptions { wait_for_fresh: false, preferred_languages: prefs.languages.clone() },
            )
        });
        let results = futures::future::join_all(search_futures).await;

        let mut merged: Vec<(Song, f64)> = Vec::new();
        let mut seen = HashSet::new();
        for songs in results {
            for song in songs {
                if !seen.insert(song.id.clone()) {
                    continue;
                }
                let mut rule_score = 10.0;
                if prefs.favorite_artists.iter().any(|f| song.artists.iter().any(|a| a.name.eq_ignore_ascii_case(&f.name))) {
                    rule_score += 30.0;
                }
                if let Some(play_count) = profile
                    .artist_affinity
                    .iter()
                    .find(|(artist, _)| song.artists.iter().any(|a| a.name.eq_ignore_ascii_case(artist)))
                    .map(|(_, affinity)| affinity.max(0.0))
                {
                    rule_score += 5.0 * play_count;
                }
                if recent_skips.contains(&song.id) {
                    rule_score -= 100.0;
                }
                if prefs.languages.iter().any(|l| l.eq_ignore_ascii_case(&song.language)) {
                    rule_score += 10.0;
                }
                merged.push((song, rule_score));
            }
        }

        merged.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

        let (mut in_preferred, others): (Vec<_>, Vec<_>) = if prefs.languages.is_empty() {
            (merged, Vec::new())
        } else {
            merged.into_iter().partition(|(song, _)| prefs.languages.iter().any(|l| l.eq_ignore_ascii_case(&song.language)))
        };
        in_preferred.extend(others);
        in_preferred.truncate(100);

        let candidates: Vec<Song> = in_preferred.iter().map(|(s, _)| s.clone()).collect();
        let rule_scores: Vec<f64> = in_preferred.iter().map(|(_, r)| *r).collect();

        let reranked = self
            .reranker
            .rerank(Some(uid), candidates, &RerankContext { query: String::new(), preferred_languages: prefs.languages.clone() })
            .await;

        let mut blended: Vec<(Song, f64)> = reranked
            .into_iter()
            .map(|song| {
                let model_score = song.ranking.as_ref().map(|r| r.final_score).unwrap_or(0.0);
                let rule_score = rule_scores
                    .get(
                        in_preferred
                            .iter()
                            .position(|(s, _)| s.id == song.id)
                            .unwrap_or(0),
                    )
                    .copied()
                    .unwrap_or(10.0);
                let final_score = ((rule_score * 0.6 + model_score * 100.0 * 0.4) * 100.0).round() / 100.0;
                (song, final_score)
            })
            .collect();
        blended.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        blended.truncate(limit.min(100));

        self.metrics.record_recommendation_latency("general", start.elapsed());
        Ok(blended.into_iter().map(|(s, _)| s).collect())
    }

    /// `generateNextTrack(uid, currentSong, limit)` (§4.5 next-track mode).
    pub async fn generate_next_track(&self, uid: &str, current: &CurrentSong, limit: usize) -> Result<Vec<Song>, AppError> {
        let start = Instant::now();
        let language = current.language.clone().unwrap_or_default().to_lowercase();
        let genre = current.genre.clone().unwrap_or_default().to_lowercase();

        let mut exclusion: HashSet<String> = self
            .profile_store
            .activity_history(uid, Some(&ActivityType::Play.to_string()), 40)
            .await
            .unwrap_or_default()
            .into_iter()
            .filter_map(|e| e.song_id)
            .collect();
        exclusion.extend(
            self.profile_store
                .activity_history(uid, Some(&ActivityType::Skip.to_string()), 40)
                .await
                .unwrap_or_default()
                .into_iter()
                .filter_map(|e| e.song_id),
        );
        exclusion.insert(current.id.clone());

        let seeds = build_next_track_seeds(&language, &genre, &current.name);

        let search_futures = seeds.iter().map(|seed| {
            self.search.smart_search(
                seed,
                SmartSearchOptions {
                    wait_for_fresh: false,
                    preferred_languages: if language.is_empty() { Vec::new() } else { vec![language.clone()] },
                },
            )
        });
        let results = futures::future::join_all(search_futures).await;

        let current_artist_ids: HashSet<String> = current.artists.iter().map(|a| a.id.clone()).collect();
        let current_artist_names: HashSet<String> = current.artists.iter().map(|a| a.name.to_lowercase()).collect();
        let current_title = canonical_title(&current.name);

        let mut seen = HashSet::new();
        let mut candidates: Vec<(Song, f64)> = Vec::new();
        for songs in results {
            for song in songs {
                if !seen.insert(song.id.clone()) {
                    continue;
                }
                if !passes_hard_filters(
                    &song,
                    &language,
                    &exclusion,
                    &current_artist_ids,
                    &current_artist_names,
                    &current.album,
                    &current_title,
                ) {
                    continue;
                }

                let mut rule_score = 0.0;
                if !language.is_empty() && song.language == language {
                    rule_score += 120.0;
                }
                if !genre.is_empty() {
                    rule_score += 50.0; // genre is not tracked on Song; treat a genre-seeded hit as a full match
                }
                rule_score += 40.0 * song.popularity.unwrap_or(0.0);
                if let Some(year) = song.year {
                    rule_score += if year >= 2020 { 8.0 } else if year >= 2015 { 4.0 } else { 0.0 };
                }
                candidates.push((song, rule_score));
            }
        }

        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        let top_n = (4 * limit).max(limit);
        candidates.truncate(top_n);

        let pool: Vec<Song> = candidates.iter().map(|(s, _)| s.clone()).collect();
        let mut reranked = self
            .reranker
            .rerank(Some(uid), pool, &RerankContext { query: current.name.clone(), preferred_languages: vec![language.clone()] })
            .await;
        reranked.truncate(limit);

        for song in &mut reranked {
            song.next_reason = Some(format!("similar to {}", current.name));
        }

        self.metrics.record_recommendation_latency("next_track", start.elapsed());
        Ok(reranked)
    }
}

fn build_seed_queries(prefs: &UserPreferences, profile: &crate::models::RealtimeProfile) -> Vec<String> {
    let mut seeds = Vec::new();

    for artist in prefs.favorite_artists.iter().take(5) {
        seeds.push(artist.name.clone());
    }

    let mut top_played: Vec<(&String, &f64)> = profile.artist_affinity.iter().collect();
    top_played.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap());
    for (artist, _) in top_played.into_iter().take(5) {
        if !seeds.contains(artist) {
            seeds.push(artist.clone());
        }
    }

    for term in profile.search_terms.iter().take(5) {
        if !seeds.contains(term) {
            seeds.push(term.clone());
        }
    }

    if seeds.len() < 3 {
        for (song_id, interaction) in profile.song_interactions.iter() {
            let _ = song_id;
            if let Some(artist) = &interaction.artist {
                if !seeds.contains(artist) {
                    seeds.push(artist.clone());
                }
            }
            if seeds.len() >= 3 {
                break;
            }
        }
    }

    if seeds.is_empty() {
        for lang in prefs.languages.iter().take(3) {
            seeds.push(format!("Top {lang} songs"));
        }
    }

    if seeds.is_empty() {
        seeds.push(format!("Top {DEFAULT_FALLBACK_LANGUAGE} songs"));
    }

    seeds.truncate(15);
    seeds
}

fn build_next_track_seeds(language: &str, genre: &str, title: &str) -> Vec<String> {
    let mut seeds = Vec::new();
    if !language.is_empty() && !genre.is_empty() {
        seeds.push(format!("Top {language} {genre}"));
        seeds.push(format!("{language} {genre}"));
    }
    if !language.is_empty() {
        seeds.push(format!("Top {language}"));
        seeds.push(format!("Latest {language}"));
        seeds.push(language.to_string());
    }
    if !genre.is_empty() {
        seeds.push(format!("Top {genre}"));
    }
    seeds.push(title.to_string());

    if seeds.is_empty() {
        seeds.push(format!("Top {DEFAULT_FALLBACK_LANGUAGE} songs"));
    }
    seeds.truncate(6);
    seeds
}

const TITLE_DECORATOR_KEYWORDS: &[&str] =
    &["remix", "version", "live", "slowed", "reverb", "karaoke", "instrumental", "lofi", "cover"];

/// Strips parentheses/brackets and version-decorator keywords for duplicate
/// detection (§4.5).
fn canonical_title(title: &str) -> String {
    let mut cleaned = String::new();
    let mut depth = 0i32;
    for ch in title.chars() {
        match ch {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = (depth - 1).max(0),
            _ if depth == 0 => cleaned.push(ch),
            _ => {}
        }
    }

    let words: Vec<String> = cleaned
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|w| !TITLE_DECORATOR_KEYWORDS.contains(&w.as_str()))
        .collect();
    words.join(" ")
}

fn passes_hard_filters(
    song: &Song,
    language: &str,
    exclusion: &HashSet<String>,
    current_artist_ids: &HashSet<String>,
    current_artist_names: &HashSet<String>,
    current_album: &crate::models::AlbumRef,
    current_title: &str,
) -> bool {
    if !language.is_empty() && song.language != language {
        return false;
    }
    if exclusion.contains(&song.id) {
        return false;
    }
    let shares_artist = song.artists.iter().any(|a| {
        current_artist_ids.contains(&a.id) || current_artist_names.contains(&a.name.to_lowercase())
    });
    if shares_artist {
        return false;
    }
    if let Some(id) = &current_album.id {
        if song.album.id.as_deref() == Some(id.as_str()) {
            return false;
        }
    }
    if let Some(name) = &current_album.name {
        if song.album.name.as_deref().map(|n| n.eq_ignore_ascii_case(name)).unwrap_or(false) {
            return false;
        }
    }
    let song_title = canonical_title(&song.name);
    if song_title == current_title || song_title.contains(current_title) && !current_title.is_empty() {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_title_strips_decorators_and_brackets() {
        assert_eq!(canonical_title("Believer (Live Version)"), "believer");
        assert_eq!(canonical_title("Tum Hi Ho [Reverb]"), "tum hi ho");
    }

    #[test]
    fn seed_fallback_is_top_hindi_songs_when_nothing_else() {
        let prefs = UserPreferences {
            uid: "u1".to_string(),
            languages: vec![],
            favorite_artists: vec![],
            display_name: None,
            email: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let profile = crate::models::RealtimeProfile::default();
        let seeds = build_seed_queries(&prefs, &profile);
        assert_eq!(seeds, vec!["Top hindi songs".to_string()]);
    }
}
