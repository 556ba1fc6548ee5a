// Fingerprint-keyed result cache with per-tier TTLs

//! # Result Cache
//!
//! Results are keyed by a SHA-256 fingerprint over `(normalized_text,
//! scope_key, tier_policy_version)`. Folding the scope key in means two
//! users with different data visibility can never share an answer; folding
//! the policy version in means bumping the version invalidates every cached
//! answer at once after a routing-policy change, with no flush needed.
//!
//! Expiry is lazy (checked on read) plus an explicit [`purge_expired`]
//! sweep for the admin maintenance endpoint. TTLs are per tier: direct
//! answers go stale fast, template answers last minutes, fallback answers
//! (the expensive ones) last an hour.
//!
//! [`purge_expired`]: ResultCache::purge_expired

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::models::{Query, ResultSet};

/// One cached answer with its expiry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub result: ResultSet,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn is_expired(&self) -> bool {
        self.stored_at.elapsed() >= self.ttl
    }
}

/// Concurrent fingerprint -> result map.
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: DashMap<String, CacheEntry>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache key for one query under one policy version.
    pub fn fingerprint(query: &Query, tier_policy_version: u32) -> String {
        let mut hasher = Sha256::new();
        hasher.update(query.normalized_text.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(query.context.scope_key().as_bytes());
        hasher.update(b"\x1f");
        hasher.update(tier_policy_version.to_be_bytes());
        hex(&hasher.finalize())
    }

    /// Fetch a live entry; expired entries are removed on the way out.
    pub fn get(&self, fingerprint: &str) -> Option<ResultSet> {
        let expired = match self.entries.get(fingerprint) {
            None => return None,
            Some(entry) if entry.is_expired() => true,
            Some(entry) => return Some(entry.result.clone()),
        };
        if expired {
            self.entries.remove(fingerprint);
        }
        None
    }

    pub fn put(&self, fingerprint: String, result: ResultSet, ttl: Duration) {
        debug!(fingerprint = %&fingerprint[..12], ttl_secs = ttl.as_secs(), "caching result");
        self.entries.insert(
            fingerprint,
            CacheEntry {
                result,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Drop entries whose cached result matches the predicate; returns how
    /// many were removed. Used for targeted invalidation after data changes
    /// (e.g. everything a given tier produced).
    pub fn invalidate_where(&self, predicate: impl Fn(&ResultSet) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !predicate(&entry.result));
        before - self.entries.len()
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before - self.entries.len()
    }

    /// Drop everything; returns how many entries were removed.
    pub fn clear(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QueryContext, Tier};

    fn query(text: &str, user_id: i64, role: &str) -> Query {
        Query::new(text, QueryContext::new(user_id, role)).unwrap()
    }

    #[test]
    fn test_fingerprint_ignores_surface_form() {
        let a = ResultCache::fingerprint(&query("统计 学生！", 1, "admin"), 1);
        let b = ResultCache::fingerprint(&query("统计学生", 1, "admin"), 1);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_separates_scopes() {
        let admin = ResultCache::fingerprint(&query("统计学生", 1, "admin"), 1);
        let teacher = ResultCache::fingerprint(&query("统计学生", 1, "teacher"), 1);
        let other_user = ResultCache::fingerprint(&query("统计学生", 2, "admin"), 1);
        assert_ne!(admin, teacher);
        assert_ne!(admin, other_user);
    }

    #[test]
    fn test_policy_version_bump_invalidates() {
        let v1 = ResultCache::fingerprint(&query("统计学生", 1, "admin"), 1);
        let v2 = ResultCache::fingerprint(&query("统计学生", 1, "admin"), 2);
        assert_ne!(v1, v2);
    }

    #[test]
    fn test_round_trip_and_clear() {
        let cache = ResultCache::new();
        let result = ResultSet::message("共 42 名学生", Tier::Direct);
        cache.put("k1".to_string(), result, Duration::from_secs(60));
        assert_eq!(cache.get("k1").unwrap().summary_text.as_deref(), Some("共 42 名学生"));
        assert_eq!(cache.clear(), 1);
        assert!(cache.get("k1").is_none());
    }

    #[test]
    fn test_expired_entry_is_dropped_on_read() {
        let cache = ResultCache::new();
        cache.put(
            "k1".to_string(),
            ResultSet::message("stale", Tier::Template),
            Duration::from_millis(0),
        );
        assert!(cache.get("k1").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_where_is_selective() {
        let cache = ResultCache::new();
        cache.put(
            "a".to_string(),
            ResultSet::message("x", Tier::Direct),
            Duration::from_secs(60),
        );
        cache.put(
            "b".to_string(),
            ResultSet::message("y", Tier::Fallback),
            Duration::from_secs(60),
        );
        assert_eq!(cache.invalidate_where(|r| r.tier == Tier::Fallback), 1);
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn test_purge_expired_keeps_live_entries() {
        let cache = ResultCache::new();
        cache.put(
            "dead".to_string(),
            ResultSet::message("stale", Tier::Direct),
            Duration::from_millis(0),
        );
        cache.put(
            "live".to_string(),
            ResultSet::message("fresh", Tier::Direct),
            Duration::from_secs(60),
        );
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.get("live").is_some());
    }
}
