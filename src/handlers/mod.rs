//! Thin HTTP surface (§2, §6): input validation, language resolution, limit
//! clamps, and JSON encoding. All ranking/search/personalization logic lives in
//! `services`; handlers only translate HTTP <-> service calls.

pub mod activity;
pub mod albums;
pub mod artists;
pub mod preferences;
pub mod recommendations;
pub mod search;
pub mod songs;

pub(crate) fn clamp_limit(limit: Option<usize>, default: usize, max: usize) -> usize {
    limit.unwrap_or(default).min(max).max(1)
}

pub(crate) fn split_csv(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_lowercase).collect())
        .unwrap_or_default()
}
