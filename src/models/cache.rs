//! Generic cache entry wrapper with fresh/stale/evicted age derivation (§3).

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Evicted,
}

/// `{ data, updated_at, last_access_at }` from §3. Freshness is derived from age at
/// read time rather than stored, so a single entry can answer `fresh`/`stale`/`evicted`
/// for any caller regardless of when it was inserted.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub updated_at: Instant,
    pub last_access_at: Instant,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T) -> Self {
        let now = Instant::now();
        Self { data, updated_at: now, last_access_at: now }
    }

    pub fn touch(&mut self) {
        self.last_access_at = Instant::now();
    }

    pub fn refresh(&mut self, data: T) {
        self.data = data;
        self.updated_at = Instant::now();
        self.last_access_at = self.updated_at;
    }

    pub fn freshness(&self, fresh_ttl: Duration, stale_ttl: Duration) -> Freshness {
        let age = self.updated_at.elapsed();
        if age <= fresh_ttl {
            Freshness::Fresh
        } else if age <= stale_ttl {
            Freshness::Stale
        } else {
            Freshness::Evicted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn freshness_thresholds() {
        let entry = CacheEntry::new(42);
        assert_eq!(
            entry.freshness(Duration::from_secs(60), Duration::from_secs(120)),
            Freshness::Fresh
        );
        sleep(Duration::from_millis(5));
        assert_eq!(
            entry.freshness(Duration::from_millis(1), Duration::from_secs(120)),
            Freshness::Stale
        );
        assert_eq!(
            entry.freshness(Duration::from_millis(1), Duration::from_millis(2)),
            Freshness::Evicted
        );
    }
}
