//! Local Song Index (§4.2): a bounded in-memory map of every Song seen in any
//! upstream response, keyed by id, with precomputed searchable fields and LRU
//! eviction by `last_access_at`.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::models::{LocalIndexEntry, MatchTier, Song};

/// Bounded LRU map from `song.id` to `LocalIndexEntry` (§4.2, §5). Reads/writes are
/// independently serialized per-key by `DashMap`'s sharded locking; eviction takes a
/// coarse pass over all entries, matching the spec's "LRU-trim traversals may hold
/// the coarse lock briefly" allowance.
pub struct LocalSongIndex {
    entries: DashMap<String, LocalIndexEntry>,
    cap: usize,
    search_cap: usize,
    len_hint: AtomicUsize,
}

/// A candidate surfaced by a local-index pass, carrying enough to be merged via
/// `addRankedSongs` without re-deriving the match.
#[derive(Debug, Clone)]
pub struct LocalMatch {
    pub song: Song,
    pub tier: MatchTier,
}

impl LocalSongIndex {
    pub fn new(cap: usize, search_cap: usize) -> Self {
        Self { entries: DashMap::new(), cap, search_cap, len_hint: AtomicUsize::new(0) }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Insert or refresh a Song. Precomputes searchable fields at insertion time
    /// (§3) so `search_local` does no allocation beyond the scoring itself.
    pub fn upsert(&self, song: Song) {
        let id = song.id.clone();
        match self.entries.get_mut(&id) {
            Some(mut existing) => {
                *existing = LocalIndexEntry::new(song);
            }
            None => {
                self.entries.insert(id, LocalIndexEntry::new(song));
                self.len_hint.store(self.entries.len(), Ordering::Relaxed);
                self.maybe_evict();
            }
        }
    }

    pub fn upsert_many(&self, songs: impl IntoIterator<Item = Song>) {
        for song in songs {
            self.upsert(song);
        }
    }

    fn maybe_evict(&self) {
        if self.entries.len() <= self.cap {
            return;
        }
        // Smallest last_access_at loses; a coarse scan, bounded by `cap`.
        let victim = self
            .entries
            .iter()
            .min_by_key(|entry| entry.last_access_at)
            .map(|entry| entry.key().clone());

        if let Some(id) = victim {
            self.entries.remove(&id);
        }
    }

    /// `searchLocal(query)` (§4.2): zero-I/O first pass over precomputed fields,
    /// using the same tiered match rules as `scoreSongMatch`. Capped at
    /// `local_index_search_cap` (120) results.
    pub fn search_local(&self, query: &str, compact_query: &str) -> Vec<LocalMatch> {
        let mut matches = Vec::new();

        for mut entry in self.entries.iter_mut() {
            let tier = if entry.name == query || entry.compact_name == compact_query {
                Some(MatchTier::Exact)
            } else if entry.name.starts_with(query) || entry.compact_name.starts_with(compact_query) {
                Some(MatchTier::StartsWith)
            } else if entry.haystack.contains(query) || entry.compact_haystack.contains(compact_query) {
                Some(MatchTier::Contains)
            } else {
                None
            };

            if let Some(tier) = tier {
                entry.touch();
                matches.push(LocalMatch { song: entry.song.clone(), tier });
                if matches.len() >= self.search_cap {
                    break;
                }
            }
        }

        matches
    }

    /// Count of local matches at tier `Exact|StartsWith|Contains`, used to decide
    /// whether the local pass can short-circuit the upstream loop (§4.3 step 3).
    pub fn strong_match_count(&self, query: &str, compact_query: &str) -> usize {
        self.entries
            .iter()
            .filter(|entry| {
                entry.name == query
                    || entry.compact_name == compact_query
                    || entry.name.starts_with(query)
                    || entry.compact_name.starts_with(compact_query)
                    || entry.haystack.contains(query)
                    || entry.compact_haystack.contains(compact_query)
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlbumRef, ArtistRef};

    fn song(id: &str, name: &str) -> Song {
        Song {
            id: id.to_string(),
            name: name.to_string(),
            language: "english".to_string(),
            album: AlbumRef::default(),
            artists: vec![ArtistRef { id: "a1".to_string(), name: "Imagine Dragons".to_string() }],
            image_urls: vec![],
            download_urls: vec![],
            year: None,
            duration_sec: None,
            popularity: None,
            ranking: None,
            next_reason: None,
        }
    }

    #[test]
    fn evicts_least_recently_accessed_when_over_cap() {
        let index = LocalSongIndex::new(2, 120);
        index.upsert(song("1", "Believer"));
        index.upsert(song("2", "Thunder"));
        index.upsert(song("3", "Radioactive"));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn search_local_matches_by_tier() {
        let index = LocalSongIndex::new(100, 120);
        index.upsert(song("1", "Believer"));
        let matches = index.search_local("believer", "believer");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].tier, MatchTier::Exact);
    }
}
