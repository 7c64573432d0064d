//! Personalized Reranker (§4.4): a 16-dim deterministic hashed embedding space, 8
//! clamped per-song features, and a tiny fixed-weight feed-forward scorer, blended
//! with the upstream ordering to reorder a candidate set for one user.

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::metrics::MetricsCollector;
use crate::models::cache::{CacheEntry, Freshness};
use crate::models::{RankingAnnotation, RealtimeProfile, Song};
use crate::services::profile_store::ActivityProfileStore;

const EMBEDDING_DIM: usize = 16;

/// Fixed-weight 8x6 dense layer, ReLU, 6x1 dense, sigmoid(output/3.2) (§4.4). These
/// are not learned; the reference implementation hardcodes them and implementations
/// must use them verbatim.
const LAYER1_WEIGHTS: [[f64; 6]; 8] = [
    [0.42, -0.18, 0.31, 0.07, -0.25, 0.16],
    [-0.11, 0.29, -0.08, 0.33, 0.05, -0.21],
    [0.27, 0.14, -0.33, 0.02, 0.19, -0.07],
    [0.08, -0.26, 0.22, 0.15, -0.12, 0.30],
    [-0.19, 0.21, 0.09, -0.28, 0.24, 0.06],
    [0.35, -0.05, -0.14, 0.27, 0.03, -0.22],
    [-0.09, 0.18, 0.25, -0.11, 0.29, 0.13],
    [0.12, -0.23, 0.06, 0.20, -0.17, 0.28],
];

const LAYER1_BIAS: [f64; 6] = [0.05, -0.03, 0.02, 0.04, -0.06, 0.01];

const LAYER2_WEIGHTS: [f64; 6] = [0.38, -0.22, 0.27, 0.15, -0.19, 0.31];
const OUTPUT_BIAS: f64 = 0.02;

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// `signedHash("t#i") / 97` (§4.4): a deterministic, evenly-distributed per-
/// dimension projection of a contributing token, independent of hashmap iteration
/// order or process restarts.
fn signed_hash(token: &str) -> f64 {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = hasher.finalize();
    let raw = i32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    (raw % 97) as f64
}

fn accumulate(vec: &mut [f64; EMBEDDING_DIM], token: &str, weight: f64) {
    for (i, slot) in vec.iter_mut().enumerate() {
        *slot += (signed_hash(&format!("{token}#{i}")) / 97.0) * weight;
    }
}

fn l2_normalize(vec: &mut [f64; EMBEDDING_DIM]) {
    let norm = vec.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}

fn cosine_similarity(a: &[f64; EMBEDDING_DIM], b: &[f64; EMBEDDING_DIM]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    clamp01((dot + 1.0) / 2.0)
}

fn tokenize(s: &str) -> Vec<String> {
    s.to_lowercase().split_whitespace().map(str::to_string).collect()
}

/// Builds the user embedding from a `RealtimeProfile` (§4.4).
fn build_user_embedding(profile: &RealtimeProfile) -> [f64; EMBEDDING_DIM] {
    let mut vec = [0.0; EMBEDDING_DIM];

    for artist in &profile.favorite_artists {
        accumulate(&mut vec, &format!("fav_artist:{}", artist.to_lowercase()), 2.4);
    }
    for (lang, affinity) in &profile.language_affinity {
        let weight = 0.9 + affinity.clamp(-2.0, 8.0) * 0.08;
        accumulate(&mut vec, &format!("language:{}", lang.to_lowercase()), weight);
    }
    for (artist, affinity) in &profile.artist_affinity {
        let weight = affinity.clamp(-4.0, 10.0) * 0.25;
        accumulate(&mut vec, &format!("artist:{}", artist.to_lowercase()), weight);
    }
    for (i, term) in profile.search_terms.iter().take(20).enumerate() {
        let weight = 1.0 / (1.0 + i as f64 * 0.45);
        for token in tokenize(term) {
            accumulate(&mut vec, &token, weight);
        }
    }

    let mut recent: Vec<_> = profile.song_interactions.iter().collect();
    recent.sort_by_key(|(_, i)| std::cmp::Reverse(i.last_played));
    for (song_id, interaction) in recent.into_iter().take(200) {
        accumulate(&mut vec, &format!("song:{song_id}"), interaction.affinity * 0.15);
        if let Some(artist) = &interaction.artist {
            accumulate(&mut vec, &format!("artist:{}", artist.to_lowercase()), interaction.affinity * 0.08);
        }
        if let Some(lang) = &interaction.language {
            accumulate(&mut vec, &format!("language:{}", lang.to_lowercase()), interaction.affinity * 0.06);
        }
    }

    l2_normalize(&mut vec);
    vec
}

/// Builds a song's embedding from the same contributing fields (§4.4: "Song
/// embedding is built identically from its extracted fields").
fn build_song_embedding(song: &Song) -> [f64; EMBEDDING_DIM] {
    let mut vec = [0.0; EMBEDDING_DIM];
    for artist in &song.artists {
        accumulate(&mut vec, &format!("fav_artist:{}", artist.name.to_lowercase()), 1.0);
        accumulate(&mut vec, &format!("artist:{}", artist.name.to_lowercase()), 1.0);
    }
    accumulate(&mut vec, &format!("language:{}", song.language), 1.0);
    for token in tokenize(&song.name) {
        accumulate(&mut vec, &token, 1.0);
    }
    l2_normalize(&mut vec);
    vec
}

struct Features {
    text_rank: f64,
    embedding_similarity: f64,
    language: f64,
    artist: f64,
    popularity: f64,
    interaction: f64,
    #[allow(dead_code)]
    skip_risk: f64,
    #[allow(dead_code)]
    query_intent: f64,
}

fn compute_features(
    song: &Song,
    index: usize,
    total: usize,
    profile: &RealtimeProfile,
    user_embedding: &[f64; EMBEDDING_DIM],
    preferred_languages: &[String],
    query: &str,
) -> Features {
    let text_rank = if total > 1 { 1.0 - index as f64 / (total - 1) as f64 } else { 1.0 };

    let song_embedding = build_song_embedding(song);
    let embedding_similarity = cosine_similarity(user_embedding, &song_embedding);

    let lang_affinity = profile.language_affinity.get(&song.language).copied().unwrap_or(0.0);
    let preferred = preferred_languages.iter().any(|l| l.eq_ignore_ascii_case(&song.language));
    let language = {
        let base = if preferred { 1.0 } else { 0.25 };
        let adjust = (lang_affinity.abs() / if preferred { 12.0 } else { 10.0}).min(0.35);
        clamp01(if lang_affinity >= 0.0 { base + adjust } else { base - adjust })
    };

    let is_favorite = song
        .artists
        .iter()
        .any(|a| profile.favorite_artists.iter().any(|f| f.eq_ignore_ascii_case(&a.name)));
    let artist_affinity = song
        .artists
        .iter()
        .filter_map(|a| profile.artist_affinity.get(&a.name))
        .cloned()
        .fold(0.0, |acc, v| acc + v);
    let artist = {
        let base = 0.1 + if is_favorite { 0.45 } else { 0.0 };
        let adjust = (artist_affinity.abs() / if is_favorite { 14.0 } else { 12.0 }).min(0.35);
        clamp01(if artist_affinity >= 0.0 { base + adjust } else { base - adjust })
    };

    let popularity = song
        .popularity
        .map(|p| clamp01((p + 1.0).log10() / 3.2))
        .unwrap_or(0.45);

    let (plays, skips, affinity_sum) = match profile.song_interactions.get(&song.id) {
        Some(interaction) => (interaction.play_count, interaction.skip_count, interaction.affinity),
        None => (0, 0, 0.0),
    };
    let interaction_score = if plays + skips == 0 { 0.35 } else { clamp01(sigmoid(affinity_sum * 0.35)) };
    let skip_risk = if plays + skips == 0 { 0.2 } else { skips as f64 / (plays + skips) as f64 };

    let query_tokens = tokenize(query);
    let title_and_artist = format!("{} {}", song.name, artists_string(song)).to_lowercase();
    let query_intent = if query_tokens.is_empty() {
        0.0
    } else {
        let matched = query_tokens.iter().filter(|t| title_and_artist.contains(t.as_str())).count();
        matched as f64 / query_tokens.len() as f64
    };

    Features {
        text_rank: clamp01(text_rank),
        embedding_similarity,
        language,
        artist,
        popularity,
        interaction: interaction_score,
        skip_risk: clamp01(skip_risk),
        query_intent: clamp01(query_intent),
    }
}

fn artists_string(song: &Song) -> String {
    song.artists.iter().map(|a| a.name.as_str()).collect::<Vec<_>>().join(" ")
}

/// Runs the fixed-weight neural head on the 8 clamped features (§4.4).
fn neural_score(features: &Features) -> f64 {
    let input = [
        features.text_rank,
        features.embedding_similarity,
        features.language,
        features.artist,
        features.popularity,
        features.interaction,
        features.skip_risk,
        features.query_intent,
    ];

    let mut hidden = [0.0; 6];
    for (j, h) in hidden.iter_mut().enumerate() {
        let mut sum = LAYER1_BIAS[j];
        for (i, x) in input.iter().enumerate() {
            sum += x * LAYER1_WEIGHTS[i][j];
        }
        *h = sum.max(0.0);
    }

    let mut output = OUTPUT_BIAS;
    for (h, w) in hidden.iter().zip(LAYER2_WEIGHTS.iter()) {
        output += h * w;
    }

    sigmoid(output / 3.2)
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

/// Parameters accepted by `rerank` (§4.4).
#[derive(Debug, Clone, Default)]
pub struct RerankContext {
    pub query: String,
    pub preferred_languages: Vec<String>,
}

/// The Personalized Reranker: owns the per-uid profile cache (§4.4) and the
/// embedding/feature/blend pipeline.
pub struct PersonalizedReranker {
    profile_store: Arc<dyn ActivityProfileStore>,
    profile_cache: DashMap<String, CacheEntry<RealtimeProfile>>,
    cache_cap: u64,
    cache_ttl: Duration,
    metrics: Arc<MetricsCollector>,
}

impl PersonalizedReranker {
    pub fn new(profile_store: Arc<dyn ActivityProfileStore>, cache_cap: u64, cache_ttl: Duration, metrics: Arc<MetricsCollector>) -> Self {
        Self { profile_store, profile_cache: DashMap::new(), cache_cap, cache_ttl, metrics }
    }

    async fn get_realtime_profile(&self, uid: &str) -> RealtimeProfile {
        if let Some(mut entry) = self.profile_cache.get_mut(uid) {
            if entry.freshness(self.cache_ttl, self.cache_ttl) == Freshness::Fresh {
                entry.touch();
                self.metrics.record_profile_cache_hit();
                return entry.data.clone();
            }
        }

        self.metrics.record_profile_cache_miss();
        let profile = self
            .profile_store
            .build_realtime_profile(uid)
            .await
            .unwrap_or_default();

        if self.profile_cache.len() as u64 >= self.cache_cap {
            if let Some(victim) = self
                .profile_cache
                .iter()
                .min_by_key(|e| e.last_access_at)
                .map(|e| e.key().clone())
            {
                self.profile_cache.remove(&victim);
            }
        }
        self.profile_cache.insert(uid.to_string(), CacheEntry::new(profile.clone()));
        profile
    }

    /// `rerank(uid, songs, {query, preferredLanguages, mode})` (§4.4). Pass-through
    /// when `uid` is empty or `songs` is empty.
    pub async fn rerank(&self, uid: Option<&str>, mut songs: Vec<Song>, ctx: &RerankContext) -> Vec<Song> {
        let Some(uid) = uid.filter(|u| !u.is_empty()) else {
            return songs;
        };
        if songs.is_empty() {
            return songs;
        }

        let start = Instant::now();
        let profile = self.get_realtime_profile(uid).await;
        let user_embedding = build_user_embedding(&profile);
        let total = songs.len();

        let mut scored: Vec<(Song, f64)> = songs
            .drain(..)
            .enumerate()
            .map(|(index, song)| {
                let features = compute_features(
                    &song,
                    index,
                    total,
                    &profile,
                    &user_embedding,
                    &ctx.preferred_languages,
                    &ctx.query,
                );
                let nn = neural_score(&features);
                let rule = clamp01(
                    0.4 * features.text_rank
                        + 0.3 * ((features.embedding_similarity + features.language + features.artist) / 3.0)
                        + 0.2 * features.popularity
                        + 0.1 * features.interaction,
                );
                let final_score = rule * 0.65 + nn * 0.35;

                let mut song = song;
                song.ranking = Some(RankingAnnotation {
                    final_score: round4(final_score),
                    text_rank_score: round4(features.text_rank),
                    preference_match: round4((features.embedding_similarity + features.language + features.artist) / 3.0),
                    popularity_score: round4(features.popularity),
                    interaction_score: round4(features.interaction),
                    neural_score: round4(nn),
                });
                (song, final_score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        self.metrics.record_rerank_latency(start.elapsed());
        scored.into_iter().map(|(song, _)| song).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neural_weight_shapes_are_consistent() {
        assert_eq!(LAYER1_WEIGHTS.len(), 8);
        assert_eq!(LAYER1_WEIGHTS[0].len(), 6);
        assert_eq!(LAYER2_WEIGHTS.len(), 6);
    }

    #[test]
    fn signed_hash_is_deterministic() {
        assert_eq!(signed_hash("fav_artist:imagine dragons#0"), signed_hash("fav_artist:imagine dragons#0"));
    }
}
