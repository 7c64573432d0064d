//! Smart Search Engine (§4.3): query normalization, multi-variant upstream fan-out,
//! local-index fast path, tiered lexical+fuzzy scoring, two-tier caching with
//! stale-while-revalidate and single-flight coalescing.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

use crate::config::SearchTuning;
use crate::metrics::MetricsCollector;
use crate::models::cache::{CacheEntry, Freshness};
use crate::models::{MatchTier, Song};
use crate::services::catalog_adapter::CatalogAdapter;
use crate::services::local_index::LocalSongIndex;

const DOMAIN_NOISE_WORDS: &[&str] = &[
    "song", "songs", "movie", "album", "lyrics", "official", "audio", "music", "theme", "bgm", "ost",
];

const KNOWN_LANGUAGES: &[&str] = &[
    "english", "hindi", "punjabi", "tamil", "telugu", "kannada", "malayalam", "bengali", "marathi",
    "gujarati", "urdu", "bhojpuri", "haryanvi", "rajasthani", "odia", "assamese",
];

/// Per-source weight added to a scored match (§4.3 bonuses).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSource {
    LocalIndex,
    Primary,
    Broad,
    Fallback,
}

impl MatchSource {
    fn weight(self) -> f64 {
        match self {
            MatchSource::LocalIndex => 20.0,
            MatchSource::Primary => 15.0,
            MatchSource::Broad => 8.0,
            MatchSource::Fallback => 5.0,
        }
    }
}

/// A single dedupe-and-rank unit carried through `addRankedSongs`.
#[derive(Debug, Clone)]
struct RankedSong {
    song: Song,
    tier: MatchTier,
    score: f64,
}

/// Options accepted by `smartSearch` (§4.3).
#[derive(Debug, Clone, Default)]
pub struct SmartSearchOptions {
    pub wait_for_fresh: bool,
    pub preferred_languages: Vec<String>,
}

fn normalize(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ").trim().to_lowercase()
}

fn compact(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric()).collect()
}

fn tokenize(s: &str) -> Vec<String> {
    s.split_whitespace().map(str::to_string).collect()
}

fn is_noise(token: &str) -> bool {
    DOMAIN_NOISE_WORDS.contains(&token) || KNOWN_LANGUAGES.contains(&token)
}

/// `maxDist(len)` from §4.3: the allowed compact edit distance for a FUZZY match.
fn max_edit_distance(len: usize) -> usize {
    if len < 6 {
        1
    } else if len < 10 {
        2
    } else {
        3
    }
}

/// Ordered, deduped, capped-at-4 query rewrites (§4.3 step 2).
fn generate_variants(normalized: &str) -> Vec<String> {
    let mut variants = Vec::new();
    let mut push = |v: String| {
        let v = v.trim().to_string();
        if !v.is_empty() && !variants.contains(&v) {
            variants.push(v);
        }
    };

    push(normalized.to_string());

    let tokens = tokenize(normalized);
    let stripped: Vec<String> = tokens.iter().filter(|t| !is_noise(t)).cloned().collect();
    push(stripped.join(" "));

    if tokens.len() > 1 {
        push(tokens[..tokens.len() - 1].join(" "));
    }
    if tokens.len() > 2 {
        push(tokens[..2].join(" "));
    }
    if let Some(first) = tokens.first() {
        push(first.clone());
    }

    for i in 0..tokens.len() {
        let mut rest = tokens.clone();
        rest.remove(i);
        push(rest.join(" "));
    }

    for token in &tokens {
        if token.chars().count() >= 6 {
            let shortened: String = token.chars().take(token.chars().count() - 1).collect();
            let mut rewritten = tokens.clone();
            if let Some(pos) = rewritten.iter().position(|t| t == token) {
                rewritten[pos] = shortened;
            }
            push(rewritten.join(" "));
        }
    }

    variants.truncate(4);
    variants
}

struct QueryContext {
    query: String,
    compact_query: String,
    tokens: Vec<String>,
    effective_terms: usize,
    preferred_languages: Vec<String>,
}

impl QueryContext {
    fn new(query: &str, preferred_languages: &[String]) -> Self {
        let tokens = tokenize(query);
        let effective_terms = tokens.iter().filter(|t| !is_noise(t)).count().max(1);
        Self {
            query: query.to_string(),
            compact_query: compact(query),
            tokens,
            effective_terms,
            preferred_languages: preferred_languages.iter().map(|l| l.to_lowercase()).collect(),
        }
    }
}

/// `scoreSongMatch` (§4.3): assigns a discrete tier and numeric score, or rejects
/// the candidate entirely (`None`).
fn score_song_match(
    name: &str,
    compact_name: &str,
    haystack: &str,
    compact_haystack: &str,
    artists: &str,
    album: &str,
    language: &str,
    ctx: &QueryContext,
    source: MatchSource,
    variant_index: usize,
) -> Option<(MatchTier, f64)> {
    let mut matched_terms = 0usize;
    for token in &ctx.tokens {
        if haystack.contains(token.as_str()) {
            matched_terms += 1;
        }
    }

    let tier = if name == ctx.query || compact_name == ctx.compact_query {
        MatchTier::Exact
    } else if name.starts_with(&ctx.query) || compact_name.starts_with(&ctx.compact_query) {
        MatchTier::StartsWith
    } else if name.contains(&ctx.query) || haystack.contains(&ctx.query) || compact_haystack.contains(&ctx.compact_query) {
        MatchTier::Contains
    } else {
        let len = ctx.compact_query.chars().count();
        let max_dist = max_edit_distance(len);
        let edit_distance = levenshtein::levenshtein(compact_name, &ctx.compact_query);
        let coverage_met = matched_terms >= ctx.effective_terms.saturating_sub(1).max(1);
        if coverage_met || edit_distance <= max_dist {
            MatchTier::Fuzzy
        } else {
            return None;
        }
    };

    if ctx.effective_terms >= 2 && matched_terms == 0 && tier > MatchTier::Contains {
        return None;
    }

    let mut score = match tier {
        MatchTier::Exact => 260.0,
        MatchTier::StartsWith => 200.0,
        MatchTier::Contains => 140.0,
        MatchTier::Fuzzy => 80.0,
    };

    for token in &ctx.tokens {
        if name.contains(token.as_str()) {
            score += 20.0;
        }
        if artists.contains(token.as_str()) {
            score += 13.0;
        }
        if album.contains(token.as_str()) {
            score += 10.0;
        }
        if tier == MatchTier::Fuzzy {
            if let Some(first) = token.chars().next() {
                let delta = (token.chars().count() as i64 - compact_name.chars().count() as i64).unsigned_abs() as usize;
                if compact_name.starts_with(first) && delta <= max_edit_distance(token.chars().count()) {
                    score += 6.0;
                }
            }
        }
    }

    let language_hint = ctx.tokens.iter().any(|t| KNOWN_LANGUAGES.contains(&t.as_str()));
    if language_hint {
        let matches_hint = ctx.tokens.iter().any(|t| t == language);
        score += if matches_hint { 18.0 } else { -4.0 };
    }

    if !ctx.preferred_languages.is_empty() {
        let preferred_match = ctx.preferred_languages.iter().any(|l| l == language);
        score += if preferred_match { 28.0 } else { -2.0 };
    }

    score += source.weight();
    score -= variant_index as f64 * 10.0;
    if tier == MatchTier::Fuzzy {
        score -= 10.0;
    }

    Some((tier, score))
}

/// Dedup rule for §4.3: on a duplicate id, keep the entry with the better
/// `(matchTier, score)`.
fn add_ranked_songs(ranked: &mut Vec<RankedSong>, incoming: Vec<RankedSong>) {
    for candidate in incoming {
        if let Some(existing) = ranked.iter_mut().find(|r| r.song.id == candidate.song.id) {
            let better = (candidate.tier, std::cmp::Reverse(ordered_float(candidate.score)))
                < (existing.tier, std::cmp::Reverse(ordered_float(existing.score)));
            if better {
                *existing = candidate;
            }
        } else {
            ranked.push(candidate);
        }
    }
}

fn ordered_float(f: f64) -> i64 {
    (f * 1000.0).round() as i64
}

/// The Smart Search Engine: cache + single-flight + the ranking algorithm (§4.3).
pub struct SmartSearchEngine {
    adapter: Arc<dyn CatalogAdapter>,
    index: Arc<LocalSongIndex>,
    metrics: Arc<MetricsCollector>,
    tuning: SearchTuning,
    cache: Arc<DashMap<String, CacheEntry<Vec<Song>>>>,
    in_flight: Arc<DashMap<String, Arc<Notify>>>,
    in_flight_count: AtomicUsize,
}

impl SmartSearchEngine {
    pub fn new(
        adapter: Arc<dyn CatalogAdapter>,
        index: Arc<LocalSongIndex>,
        metrics: Arc<MetricsCollector>,
        tuning: SearchTuning,
    ) -> Self {
        Self {
            adapter,
            index,
            metrics,
            tuning,
            cache: Arc::new(DashMap::new()),
            in_flight: Arc::new(DashMap::new()),
            in_flight_count: AtomicUsize::new(0),
        }
    }

    fn cache_key(normalized_query: &str, preferred_languages: &[String]) -> String {
        if preferred_languages.is_empty() {
            format!("{normalized_query}|_")
        } else {
            let mut langs: Vec<String> = preferred_languages.iter().map(|l| l.to_lowercase()).collect();
            langs.sort();
            format!("{normalized_query}|{}", langs.join(","))
        }
    }

    /// `smartSearch(query, options)` (§4.3).
    pub async fn smart_search(&self, query: &str, options: SmartSearchOptions) -> Vec<Song> {
        let start = Instant::now();
        let normalized = normalize(query);
        if normalized.is_empty() {
            return Vec::new();
        }

        let key = Self::cache_key(&normalized, &options.preferred_languages);

        if let Some(mut entry) = self.cache.get_mut(&key) {
            match entry.freshness(self.tuning.fresh_ttl, self.tuning.stale_ttl) {
                Freshness::Fresh => {
                    entry.touch();
                    self.metrics.record_cache_hit("fresh");
                    return entry.data.clone();
                }
                Freshness::Stale if !options.wait_for_fresh => {
                    entry.touch();
                    self.metrics.record_cache_hit("stale");
                    let data = entry.data.clone();
                    drop(entry);
                    self.spawn_background_refresh(key, normalized, options.preferred_languages.clone());
                    return data;
                }
                _ => {}
            }
        }

        self.metrics.record_cache_miss("compute");
        let result = self.compute_with_single_flight(key, normalized, options.preferred_languages).await;
        self.metrics.record_search_latency(start.elapsed());
        result
    }

    fn spawn_background_refresh(&self, key: String, normalized: String, preferred_languages: Vec<String>) {
        if self.in_flight.contains_key(&key) {
            return;
        }
        // Fire-and-forget: the originating request does not await this task, so it
        // must hold its own clones of everything it touches.
        let adapter = self.adapter.clone();
        let index = self.index.clone();
        let metrics = self.metrics.clone();
        let tuning = self.tuning;
        let cache = self.cache.clone();
        let in_flight = self.in_flight.clone();

        let notify = Arc::new(Notify::new());
        self.in_flight.insert(key.clone(), notify.clone());

        tokio::spawn(async move {
            let result = compute(&adapter, &index, &metrics, &tuning, &normalized, &preferred_languages).await;
            cache.insert(key.clone(), CacheEntry::new(result));
            in_flight.remove(&key);
            notify.notify_waiters();
        });
    }

    async fn compute_with_single_flight(
        &self,
        key: String,
        normalized: String,
        preferred_languages: Vec<String>,
    ) -> Vec<Song> {
        loop {
            if let Some(existing) = self.in_flight.get(&key) {
                let notify = existing.clone();
                drop(existing);
                self.metrics.set_inflight_keys(self.in_flight.len() as i64);
                notify.notified().await;
                if let Some(entry) = self.cache.get(&key) {
                    return entry.data.clone();
                }
                continue;
            }

            let notify = Arc::new(Notify::new());
            self.in_flight.insert(key.clone(), notify.clone());
            self.in_flight_count.fetch_add(1, Ordering::Relaxed);

            let result = compute(
                &self.adapter,
                &self.index,
                &self.metrics,
                &self.tuning,
                &normalized,
                &preferred_languages,
            )
            .await;

            self.cache.insert(key.clone(), CacheEntry::new(result.clone()));
            self.in_flight.remove(&key);
            self.in_flight_count.fetch_sub(1, Ordering::Relaxed);
            notify.notify_waiters();
            return result;
        }
    }
}

/// The core computation algorithm (§4.3 steps 1-7), free of any cache/single-flight
/// concerns so it can run both synchronously and as a background refresh.
async fn compute(
    adapter: &Arc<dyn CatalogAdapter>,
    index: &Arc<LocalSongIndex>,
    metrics: &Arc<MetricsCollector>,
    tuning: &SearchTuning,
    normalized: &str,
    preferred_languages: &[String],
) -> Vec<Song> {
    let start = Instant::now();
    let ctx = QueryContext::new(normalized, preferred_languages);

    let local_matches = index.search_local(&ctx.query, &ctx.compact_query);
    let strong_local = local_matches
        .iter()
        .filter(|m| m.tier <= MatchTier::Contains)
        .count();

    let mut ranked: Vec<RankedSong> = Vec::new();
    for m in &local_matches {
        if let Some((tier, score)) = score_song_match(
            &m.song.name.to_lowercase(),
            &compact(&m.song.name.to_lowercase()),
            &format!("{} {}", m.song.name, artists_string(&m.song)).to_lowercase(),
            &compact(&format!("{} {}", m.song.name, artists_string(&m.song)).to_lowercase()),
            &artists_string(&m.song).to_lowercase(),
            &m.song.album.name.clone().unwrap_or_default().to_lowercase(),
            &m.song.language,
            &ctx,
            MatchSource::LocalIndex,
            0,
        ) {
            ranked.push(RankedSong { song: m.song.clone(), tier, score });
        }
    }

    if strong_local >= tuning.smart_min_results {
        return finalize(ranked, tuning.max_smart_results);
    }

    let variants = generate_variants(normalized);
    let mut has_exact = ranked.iter().any(|r| r.tier == MatchTier::Exact);

    for (variant_index, variant) in variants.iter().enumerate() {
        if ranked.len() >= tuning.smart_min_results {
            break;
        }
        if start.elapsed() >= tuning.smart_max_latency && !ranked.is_empty() {
            break;
        }

        let variant_ctx = QueryContext::new(variant, preferred_languages);
        let need_broad = variant_index < 2 || ranked.len() < tuning.smart_min_results;
        let need_fallback = variant_index == 0 || ranked.len() < tuning.smart_min_results / 2;

        let primary_fut = adapter.primary_songs(variant, 1);
        let broad_fut = async {
            if need_broad {
                adapter.broad_search(variant, 1).await.ok()
            } else {
                None
            }
        };
        let fallback_fut = async {
            if need_fallback {
                Some(adapter.fallback_songs(variant).await)
            } else {
                None
            }
        };

        let (primary, broad, fallback) = tokio::join!(primary_fut, broad_fut, fallback_fut);

        let mut incoming = Vec::new();
        match primary {
            Ok(page) => {
                for song in page.results {
                    index.upsert(song.clone());
                    if let Some((tier, score)) = score_song(&song, &variant_ctx, MatchSource::Primary, variant_index) {
                        incoming.push(RankedSong { song, tier, score });
                    }
                }
            }
            Err(err) => metrics.record_upstream_error(&err.provider, &err.kind.to_string()),
        }

        if let Some(broad_result) = broad {
            for song in broad_result.songs {
                index.upsert(song.clone());
                if let Some((tier, score)) = score_song(&song, &variant_ctx, MatchSource::Broad, variant_index) {
                    incoming.push(RankedSong { song, tier, score });
                }
            }
        }

        if let Some(fallback_songs) = fallback {
            for song in fallback_songs {
                index.upsert(song.clone());
                if let Some((tier, score)) = score_song(&song, &variant_ctx, MatchSource::Fallback, variant_index) {
                    incoming.push(RankedSong { song, tier, score });
                }
            }
        }

        add_ranked_songs(&mut ranked, incoming);
        has_exact = ranked.iter().any(|r| r.tier == MatchTier::Exact);
    }

    if !has_exact {
        let broad = adapter.broad_search(normalized, 1).await.ok();
        let fallback = adapter.fallback_songs(normalized).await;
        let mut incoming = Vec::new();
        if let Some(broad_result) = broad {
            for song in broad_result.songs {
                index.upsert(song.clone());
                if let Some((tier, score)) = score_song(&song, &ctx, MatchSource::Broad, variants.len()) {
                    incoming.push(RankedSong { song, tier, score });
                }
            }
        }
        for song in fallback {
            index.upsert(song.clone());
            if let Some((tier, score)) = score_song(&song, &ctx, MatchSource::Fallback, variants.len()) {
                incoming.push(RankedSong { song, tier, score });
            }
        }
        add_ranked_songs(&mut ranked, incoming);
    }

    metrics.set_local_index_size(index.len() as i64);
    finalize(ranked, tuning.max_smart_results)
}

fn artists_string(song: &Song) -> String {
    song.artists.iter().map(|a| a.name.as_str()).collect::<Vec<_>>().join(" ")
}

fn score_song(song: &Song, ctx: &QueryContext, source: MatchSource, variant_index: usize) -> Option<(MatchTier, f64)> {
    let name = song.name.to_lowercase();
    let artists = artists_string(song).to_lowercase();
    let album = song.album.name.clone().unwrap_or_default().to_lowercase();
    let haystack = format!("{name} {artists} {album}");
    score_song_match(
        &name,
        &compact(&name),
        &haystack,
        &compact(&haystack),
        &artists,
        &album,
        &song.language,
        ctx,
        source,
        variant_index,
    )
}

/// Sort by `(matchTier asc, score desc)` and truncate to `max_smart_results` (§4.3 step 7).
fn finalize(mut ranked: Vec<RankedSong>, cap: usize) -> Vec<Song> {
    ranked.sort_by(|a, b| a.tier.cmp(&b.tier).then(b.score.partial_cmp(&a.score).unwrap()));
    ranked.truncate(cap);
    ranked.into_iter().map(|r| r.song).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_are_deduped_and_capped() {
        let variants = generate_variants("imagine dragons believer official audio");
        assert!(variants.len() <= 4);
        assert_eq!(variants[0], "imagine dragons believer official audio");
    }

    #[test]
    fn empty_query_normalizes_to_empty() {
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn dedup_keeps_better_tier_and_score() {
        let song = Song {
            id: "1".to_string(),
            name: "Believer".to_string(),
            language: "english".to_string(),
            album: Default::default(),
            artists: vec![],
            image_urls: vec![],
            download_urls: vec![],
            year: None,
            duration_sec: None,
            popularity: None,
            ranking: None,
            next_reason: None,
        };
        let mut ranked = vec![RankedSong { song: song.clone(), tier: MatchTier::Fuzzy, score: 50.0 }];
        add_ranked_songs(
            &mut ranked,
            vec![RankedSong { song, tier: MatchTier::Exact, score: 10.0 }],
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].tier, MatchTier::Exact);
    }
}
