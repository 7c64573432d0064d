//! The normalized, provider-agnostic Song record (§3).

use serde::{Deserialize, Serialize};

/// A reference to an artist as embedded on a `Song`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistRef {
    pub id: String,
    pub name: String,
}

/// The album a song belongs to. Either field may be absent depending on the
/// upstream that produced the record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A URL tagged with a quality bucket (e.g. `"150x150"`, `"320kbps"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedUrl {
    pub quality: String,
    pub url: String,
}

/// The discrete match-quality bucket assigned by `scoreSongMatch` (§4.3). Ordering
/// matters: `Ord` is derived in declaration order so `EXACT < STARTS_WITH < CONTAINS
/// < FUZZY`, which is exactly the tier-monotonicity invariant from §8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchTier {
    Exact = 0,
    StartsWith = 1,
    Contains = 2,
    Fuzzy = 3,
}

/// Annotation attached by the Personalized Reranker on output only (§4.4, §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingAnnotation {
    pub final_score: f64,
    pub text_rank_score: f64,
    pub preference_match: f64,
    pub popularity_score: f64,
    pub interaction_score: f64,
    pub neural_score: f64,
}

/// The normalized Song record shared across the whole core. Upstream shapes vary
/// wildly (primary nests `artists.primary[]`; fallback has a single comma-joined
/// `primary_artists` string); both are folded into this one record via
/// `from_primary`/`from_fallback` so the rest of the system never sees a raw
/// provider payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: String,
    pub name: String,
    pub language: String,
    #[serde(default)]
    pub album: AlbumRef,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub image_urls: Vec<TaggedUrl>,
    #[serde(default)]
    pub download_urls: Vec<TaggedUrl>,
    pub year: Option<i32>,
    pub duration_sec: Option<i32>,
    pub popularity: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none", rename = "_ranking")]
    pub ranking: Option<RankingAnnotation>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "_nextReason")]
    pub next_reason: Option<String>,
}

impl Song {
    /// Construct a Song from the primary provider's JSON shape. Returns `None` if
    /// the record is missing `id` or a non-empty name — such records never enter
    /// any ranked set (§3 invariant).
    pub fn from_primary(raw: &serde_json::Value) -> Option<Song> {
        let id = raw.get("id").and_then(|v| v.as_str())?.to_string();
        let name = raw
            .get("name")
            .or_else(|| raw.get("title"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())?
            .to_string();
        if id.is_empty() {
            return None;
        }

        let language = raw
            .get("language")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_lowercase();

        let album = raw
            .get("album")
            .map(|a| AlbumRef {
                id: a.get("id").and_then(|v| v.as_str()).map(str::to_string),
                name: a.get("name").and_then(|v| v.as_str()).map(str::to_string),
            })
            .unwrap_or_default();

        let artists = raw
            .get("artists")
            .and_then(|a| a.get("primary"))
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|a| {
                        let id = a.get("id").and_then(|v| v.as_str())?.to_string();
                        let name = a.get("name").and_then(|v| v.as_str())?.to_string();
                        Some(ArtistRef { id, name })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let image_urls = extract_tagged_urls(raw.get("imageUrls"));
        let download_urls = extract_tagged_urls(raw.get("downloadUrls"));

        let year = raw.get("year").and_then(|v| v.as_i64()).map(|y| y as i32);
        let duration_sec = raw
            .get("duration")
            .or_else(|| raw.get("duration_sec"))
            .and_then(|v| v.as_i64())
            .map(|d| d as i32);
        let popularity = raw.get("popularity").and_then(|v| v.as_f64());

        Some(Song {
            id,
            name,
            language,
            album,
            artists,
            image_urls,
            download_urls,
            year,
            duration_sec,
            popularity,
            ranking: None,
            next_reason: None,
        })
    }

    /// Construct a Song from the fallback provider's flat-array shape (§4.1). A
    /// record missing `id` or `song` (its name field) is dropped silently.
    pub fn from_fallback(raw: &serde_json::Value) -> Option<Song> {
        let id = raw.get("id").and_then(|v| v.as_str())?.to_string();
        let name = raw
            .get("song")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())?
            .to_string();
        if id.is_empty() {
            return None;
        }

        let language = raw
            .get("language")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_lowercase();

        let album = AlbumRef {
            id: raw.get("albumid").and_then(|v| v.as_str()).map(str::to_string),
            name: raw.get("album").and_then(|v| v.as_str()).map(str::to_string),
        };

        let artists = raw
            .get("primary_artists")
            .and_then(|v| v.as_str())
            .map(|joined| {
                joined
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|name| ArtistRef {
                        id: name.to_lowercase().replace(' ', "_"),
                        name: name.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        // Single stream/image url -> synthesize the tagged-quality shape the rest
        // of the system expects.
        let image_urls = raw
            .get("image")
            .and_then(|v| v.as_str())
            .map(|url| {
                ["50x50", "150x150", "500x500"]
                    .iter()
                    .map(|q| TaggedUrl { quality: q.to_string(), url: url.to_string() })
                    .collect()
            })
            .unwrap_or_default();

        let download_urls = raw
            .get("media_url")
            .and_then(|v| v.as_str())
            .map(|url| vec![TaggedUrl { quality: "320kbps".to_string(), url: url.to_string() }])
            .unwrap_or_default();

        let year = raw
            .get("year")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<i32>().ok())
            .or_else(|| raw.get("year").and_then(|v| v.as_i64()).map(|y| y as i32));
        let duration_sec = raw
            .get("duration")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<i32>().ok())
            .or_else(|| raw.get("duration").and_then(|v| v.as_i64()).map(|d| d as i32));
        let popularity = raw.get("popularity").and_then(|v| v.as_f64());

        Some(Song {
            id,
            name,
            language,
            album,
            artists,
            image_urls,
            download_urls,
            year,
            duration_sec,
            popularity,
            ranking: None,
            next_reason: None,
        })
    }
}

fn extract_tagged_urls(value: Option<&serde_json::Value>) -> Vec<TaggedUrl> {
    value
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|entry| {
                    let quality = entry.get("quality").and_then(|v| v.as_str())?.to_string();
                    let url = entry.get("url").and_then(|v| v.as_str())?.to_string();
                    Some(TaggedUrl { quality, url })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_primary_rejects_missing_name() {
        let raw = json!({ "id": "s1" });
        assert!(Song::from_primary(&raw).is_none());
    }

    #[test]
    fn from_fallback_maps_flat_shape() {
        let raw = json!({
            "id": "f1",
            "song": "Believer",
            "primary_artists": "Imagine Dragons, Someone Else",
            "media_url": "https://example.com/stream.mp3",
            "image": "https://example.com/art.jpg",
            "albumid": "alb1",
            "language": "English",
        });
        let song = Song::from_fallback(&raw).expect("song");
        assert_eq!(song.name, "Believer");
        assert_eq!(song.artists.len(), 2);
        assert_eq!(song.language, "english");
        assert_eq!(song.image_urls.len(), 3);
        assert_eq!(song.download_urls[0].quality, "320kbps");
        assert_eq!(song.album.id.as_deref(), Some("alb1"));
    }

    #[test]
    fn from_fallback_drops_record_missing_id() {
        let raw = json!({ "song": "Believer" });
        assert!(Song::from_fallback(&raw).is_none());
    }
}
