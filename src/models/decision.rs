// Routing decisions and the dispatch state machine vocabulary

//! # Route Decisions
//!
//! The dispatcher models the three-tier escalation as an explicit finite
//! state machine with named states, so tests can assert on the transitions
//! a query took rather than only on its final output. A [`RouteDecision`]
//! records the tier that satisfied the query, the matcher's confidence, the
//! scored candidate list and the traversed states; it is produced per query
//! and not persisted beyond logging.

use serde::{Deserialize, Serialize};

use crate::models::plan::ResultSet;

/// One of the three escalating answer strategies (plus the cache).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Direct,
    Template,
    Fallback,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Direct => write!(f, "direct"),
            Tier::Template => write!(f, "template"),
            Tier::Fallback => write!(f, "fallback"),
        }
    }
}

/// Named states of the per-query dispatch machine.
///
/// ```text
/// Received -> CacheCheck -> {hit: Done}
///                        -> TryDirect -> {match: Done}
///                                     -> TryTemplate -> {>= threshold: Done}
///                                                    -> Fallback -> Done | Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteState {
    Received,
    CacheCheck,
    TryDirect,
    TryTemplate,
    Fallback,
    Done,
    Failed,
}

/// Machine-readable failure codes surfaced to callers.
///
/// Mirrors the error taxonomy: each tier converts its local errors into one
/// of these at the tier boundary; raw stack traces and raw generated queries
/// never leave the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    InvalidInput,
    ValidationRejected,
    ExecutionTimeout,
    ExecutionFailed,
    UpstreamUnavailable,
    Internal,
}

/// Why and how a query was routed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDecision {
    /// Tier that satisfied the query. On a cache hit this is the tier the
    /// cached answer was originally computed by.
    pub tier: Tier,
    /// Action id or template keyword that matched, if any.
    pub matched_id: Option<String>,
    /// Matcher confidence in [0, 1]. Direct matches report 1.0; fallback
    /// reports 0.0 (nothing matched, we escalated).
    pub confidence: f64,
    /// Scored candidates the matcher considered, best first.
    pub candidates: Vec<(String, f64)>,
    /// Whether this response came straight from the result cache.
    pub cache_hit: bool,
    /// The FSM states traversed, in order.
    pub trace: Vec<RouteState>,
}

impl RouteDecision {
    pub fn new(tier: Tier) -> Self {
        Self {
            tier,
            matched_id: None,
            confidence: 0.0,
            candidates: Vec::new(),
            cache_hit: false,
            trace: Vec::new(),
        }
    }
}

/// Terminal outcome of the dispatch machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RouteOutcome {
    Done {
        result: ResultSet,
    },
    Failed {
        code: FailureCode,
        /// Human-readable, user-safe message.
        message: String,
    },
}

impl RouteOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, RouteOutcome::Done { .. })
    }
}

/// What `route_query` hands back to the HTTP layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResult {
    pub outcome: RouteOutcome,
    pub decision: RouteDecision,
    pub latency_ms: u64,
}
