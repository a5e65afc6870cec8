//! TTL cache in front of the liveness prober.
//!
//! Entries are written through after a live probe and never refreshed from
//! a read, so a verdict can only live for one TTL window.

use crate::domain::LivenessCacheEntry;
use crate::store::CacheDocument;
use chrono::{DateTime, Duration, Utc};

pub struct LivenessCache {
    doc: CacheDocument,
    ttl: Duration,
}

impl LivenessCache {
    pub fn new(doc: CacheDocument, ttl: Duration) -> Self {
        Self { doc, ttl }
    }

    /// Returns a cached verdict only while it is fresher than the TTL.
    ///
    /// Legacy entries without a timestamp are honoured once, when they carry
    /// the current session ordinal; they age out as soon as any probe
    /// rewrites them with a timestamp.
    pub fn lookup(
        &self,
        platform: &str,
        now: DateTime<Utc>,
        session: u64,
    ) -> Option<&LivenessCacheEntry> {
        let entry = self.doc.entries.get(platform)?;
        match entry.checked_at {
            Some(checked_at) => {
                if now.signed_duration_since(checked_at) < self.ttl {
                    Some(entry)
                } else {
                    None
                }
            }
            None => {
                if entry.session == Some(session) {
                    Some(entry)
                } else {
                    None
                }
            }
        }
    }

    /// True when a fresh cache entry says the platform did not answer.
    pub fn flagged_unreachable(&self, platform: &str, now: DateTime<Utc>, session: u64) -> bool {
        self.lookup(platform, now, session)
            .map(|entry| !entry.reachable)
            .unwrap_or(false)
    }

    pub fn record(
        &mut self,
        platform: &str,
        reachable: bool,
        healthy: bool,
        status_code: Option<u16>,
        session: u64,
        now: DateTime<Utc>,
    ) {
        self.doc.entries.insert(
            platform.to_string(),
            LivenessCacheEntry {
                platform: platform.to_string(),
                checked_at: Some(now),
                reachable,
                healthy,
                status_code,
                session: Some(session),
            },
        );
        self.doc.last_session = Some(session);
    }

    pub fn document(&self) -> &CacheDocument {
        &self.doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(platform: &str, checked_at: Option<DateTime<Utc>>, reachable: bool) -> LivenessCacheEntry {
        LivenessCacheEntry {
            platform: platform.to_string(),
            checked_at,
            reachable,
            healthy: reachable,
            status_code: reachable.then_some(200),
            session: Some(41),
        }
    }

    fn cache_with(entries: Vec<LivenessCacheEntry>) -> LivenessCache {
        let mut doc = CacheDocument::default();
        for e in entries {
            doc.entries.insert(e.platform.clone(), e);
        }
        LivenessCache::new(doc, Duration::hours(2))
    }

    #[test]
    fn fresh_entry_is_served() {
        let now = Utc::now();
        let cache = cache_with(vec![entry("chatr", Some(now - Duration::minutes(30)), true)]);
        assert!(cache.lookup("chatr", now, 42).is_some());
    }

    #[test]
    fn entry_at_or_past_ttl_is_a_miss() {
        let now = Utc::now();
        let cache = cache_with(vec![
            entry("chatr", Some(now - Duration::hours(2)), true),
            entry("bluesky", Some(now - Duration::hours(3)), true),
        ]);
        assert!(cache.lookup("chatr", now, 42).is_none());
        assert!(cache.lookup("bluesky", now, 42).is_none());
    }

    #[test]
    fn legacy_entry_honoured_only_for_matching_session() {
        let now = Utc::now();
        let cache = cache_with(vec![entry("grove", None, true)]);
        assert!(cache.lookup("grove", now, 41).is_some());
        assert!(cache.lookup("grove", now, 42).is_none());
    }

    #[test]
    fn unknown_platform_is_a_miss() {
        let cache = cache_with(vec![]);
        assert!(cache.lookup("4claw", Utc::now(), 1).is_none());
    }

    #[test]
    fn flagged_unreachable_requires_fresh_negative_entry() {
        let now = Utc::now();
        let cache = cache_with(vec![
            entry("down", Some(now - Duration::minutes(5)), false),
            entry("stale-down", Some(now - Duration::hours(5)), false),
        ]);
        assert!(cache.flagged_unreachable("down", now, 42));
        assert!(!cache.flagged_unreachable("stale-down", now, 42));
        assert!(!cache.flagged_unreachable("absent", now, 42));
    }

    #[test]
    fn record_overwrites_with_timestamp() {
        let now = Utc::now();
        let mut cache = cache_with(vec![entry("grove", None, true)]);
        cache.record("grove", false, false, None, 42, now);

        let stored = cache.document().entries.get("grove").unwrap();
        assert_eq!(stored.checked_at, Some(now));
        assert!(!stored.reachable);
        assert_eq!(cache.document().last_session, Some(42));
    }
}
