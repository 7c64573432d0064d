//! Precomputed, search-ready record held by the Local Song Index (§3, §4.2).

use super::song::Song;
use std::time::Instant;

/// A song plus everything needed to score it against a query without any further
/// allocation: `haystack`/`compact_name`/`haystack_tokens` are computed once at
/// insertion time.
#[derive(Debug, Clone)]
pub struct LocalIndexEntry {
    pub song: Song,
    pub name: String,
    pub artists: String,
    pub album: String,
    pub haystack: String,
    pub compact_name: String,
    pub compact_haystack: String,
    pub haystack_tokens: Vec<String>,
    pub updated_at: Instant,
    pub last_access_at: Instant,
}

impl LocalIndexEntry {
    pub fn new(song: Song) -> Self {
        let name = collapse_whitespace(&song.name.to_lowercase());
        let artists = song
            .artists
            .iter()
            .map(|a| a.name.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");
        let album = song
            .album
            .name
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();

        let haystack = collapse_whitespace(&format!("{name} {artists} {album}"));
        let compact_name = compact(&name);
        let compact_haystack = compact(&haystack);
        let haystack_tokens = haystack
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let now = Instant::now();
        Self {
            song,
            name,
            artists,
            album,
            haystack,
            compact_name,
            compact_haystack,
            haystack_tokens,
            updated_at: now,
            last_access_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_access_at = Instant::now();
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").trim().to_string()
}

/// All non-alphanumeric characters stripped, unicode letters/digits only (§4.2).
pub fn compact(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::song::{AlbumRef, ArtistRef};

    fn sample_song() -> Song {
        Song {
            id: "1".to_string(),
            name: "  Believer  ".to_string(),
            language: "english".to_string(),
            album: AlbumRef { id: Some("a1".to_string()), name: Some("Evolve".to_string()) },
            artists: vec![ArtistRef { id: "ar1".to_string(), name: "Imagine Dragons".to_string() }],
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
    fn precomputes_searchable_fields() {
        let entry = LocalIndexEntry::new(sample_song());
        assert_eq!(entry.name, "believer");
        assert_eq!(entry.compact_name, "believer");
        assert!(entry.haystack.contains("imagine dragons"));
        assert!(entry.haystack_tokens.contains(&"evolve".to_string()));
    }
}
