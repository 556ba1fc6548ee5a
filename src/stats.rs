// Non-blocking routing statistics

//! # Stats Recorder
//!
//! Counters are plain atomics and recording must never slow a query down:
//! the rolling latency window sits behind a `try_lock`, and a contended
//! sample is simply dropped. Cache hits are counted separately from tier
//! hits, so the tier counters always describe where answers were actually
//! computed.
//!
//! The headline number is `llm_bypass_rate`: the share of queries answered
//! without touching the fallback tier, which is the whole point of the
//! tiered design.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::models::{RouteResult, Tier};

/// Rolling latency window size.
const LATENCY_WINDOW: usize = 1024;

/// Lock-free counters plus a best-effort latency window.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    total: AtomicU64,
    direct_hits: AtomicU64,
    template_hits: AtomicU64,
    fallback_hits: AtomicU64,
    cache_hits: AtomicU64,
    failures: AtomicU64,
    estimated_tokens: AtomicU64,
    latencies_ms: Mutex<VecDeque<u64>>,
}

/// Point-in-time view of the counters, for the stats endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total: u64,
    pub direct_hits: u64,
    pub template_hits: u64,
    pub fallback_hits: u64,
    pub cache_hits: u64,
    pub failures: u64,
    pub estimated_tokens: u64,
    /// Share of queries answered from the cache, in `[0, 1]`.
    pub cache_hit_ratio: f64,
    /// Share of queries answered without the fallback tier, in `[0, 1]`.
    pub llm_bypass_rate: f64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed route. Never blocks.
    pub fn record(&self, result: &RouteResult) {
        self.total.fetch_add(1, Ordering::Relaxed);

        if !result.outcome.is_done() {
            self.failures.fetch_add(1, Ordering::Relaxed);
        } else if result.decision.cache_hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            match result.decision.tier {
                Tier::Direct => self.direct_hits.fetch_add(1, Ordering::Relaxed),
                Tier::Template => self.template_hits.fetch_add(1, Ordering::Relaxed),
                Tier::Fallback => self.fallback_hits.fetch_add(1, Ordering::Relaxed),
            };
        }

        if let crate::models::RouteOutcome::Done { result: set } = &result.outcome {
            self.estimated_tokens
                .fetch_add(set.estimated_tokens as u64, Ordering::Relaxed);
        }

        // Contended window means this sample is dropped, not waited for
        if let Ok(mut window) = self.latencies_ms.try_lock() {
            if window.len() == LATENCY_WINDOW {
                window.pop_front();
            }
            window.push_back(result.latency_ms);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let total = self.total.load(Ordering::Relaxed);
        let fallback_hits = self.fallback_hits.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let ratio = |part: u64| if total == 0 { 0.0 } else { part as f64 / total as f64 };
        let (p50, p95) = self.percentiles();
        StatsSnapshot {
            total,
            direct_hits: self.direct_hits.load(Ordering::Relaxed),
            template_hits: self.template_hits.load(Ordering::Relaxed),
            fallback_hits,
            cache_hits,
            failures: self.failures.load(Ordering::Relaxed),
            estimated_tokens: self.estimated_tokens.load(Ordering::Relaxed),
            cache_hit_ratio: ratio(cache_hits),
            llm_bypass_rate: ratio(total - fallback_hits),
            p50_latency_ms: p50,
            p95_latency_ms: p95,
        }
    }

    fn percentiles(&self) -> (u64, u64) {
        let window = match self.latencies_ms.try_lock() {
            Ok(window) => window,
            Err(_) => return (0, 0),
        };
        if window.is_empty() {
            return (0, 0);
        }
        let mut sorted: Vec<u64> = window.iter().copied().collect();
        sorted.sort_unstable();
        let at = |p: f64| {
            let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
            sorted[idx]
        };
        (at(0.50), at(0.95))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FailureCode, ResultSet, RouteDecision, RouteOutcome};

    fn done(tier: Tier, cache_hit: bool, latency_ms: u64, tokens: u32) -> RouteResult {
        let mut decision = RouteDecision::new(tier);
        decision.cache_hit = cache_hit;
        RouteResult {
            outcome: RouteOutcome::Done {
                result: ResultSet::message("ok", tier).with_estimated_tokens(tokens),
            },
            decision,
            latency_ms,
        }
    }

    fn failed(tier: Tier) -> RouteResult {
        RouteResult {
            outcome: RouteOutcome::Failed {
                code: FailureCode::ExecutionFailed,
                message: "boom".to_string(),
            },
            decision: RouteDecision::new(tier),
            latency_ms: 5,
        }
    }

    #[test]
    fn test_tier_counters_and_bypass_rate() {
        let stats = StatsRecorder::new();
        stats.record(&done(Tier::Direct, false, 2, 0));
        stats.record(&done(Tier::Direct, false, 3, 0));
        stats.record(&done(Tier::Template, false, 8, 120));
        stats.record(&done(Tier::Fallback, false, 900, 800));
        let snap = stats.snapshot();
        assert_eq!(snap.total, 4);
        assert_eq!(snap.direct_hits, 2);
        assert_eq!(snap.template_hits, 1);
        assert_eq!(snap.fallback_hits, 1);
        assert_eq!(snap.estimated_tokens, 920);
        assert!((snap.llm_bypass_rate - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_cache_hits_counted_separately_from_tiers() {
        let stats = StatsRecorder::new();
        stats.record(&done(Tier::Fallback, false, 900, 800));
        stats.record(&done(Tier::Fallback, true, 1, 800));
        let snap = stats.snapshot();
        assert_eq!(snap.fallback_hits, 1);
        assert_eq!(snap.cache_hits, 1);
        assert!((snap.cache_hit_ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_failures_counted() {
        let stats = StatsRecorder::new();
        stats.record(&failed(Tier::Fallback));
        let snap = stats.snapshot();
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.fallback_hits, 0);
    }

    #[test]
    fn test_latency_percentiles() {
        let stats = StatsRecorder::new();
        for ms in 1..=100u64 {
            stats.record(&done(Tier::Direct, false, ms, 0));
        }
        let snap = stats.snapshot();
        assert!((45..=55).contains(&snap.p50_latency_ms), "p50 {}", snap.p50_latency_ms);
        assert!((90..=100).contains(&snap.p95_latency_ms), "p95 {}", snap.p95_latency_ms);
    }

    #[test]
    fn test_empty_snapshot_is_zeroed() {
        let snap = StatsRecorder::new().snapshot();
        assert_eq!(snap.total, 0);
        assert_eq!(snap.llm_bypass_rate, 0.0);
        assert_eq!(snap.p50_latency_ms, 0);
    }
}
