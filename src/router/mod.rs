// The dispatch state machine
// One query in, one RouteResult out. The machine escalates through the
// tiers in fixed order and every transition lands in the decision trace.

//! # Query Dispatcher
//!
//! The per-query machine:
//!
//! ```text
//! Received -> CacheCheck -> {hit: Done}
//!                        -> TryDirect -> {keyword match: Done}
//!                                     -> TryTemplate -> {score >= threshold: Done}
//!                                                    -> Fallback -> Done | Failed
//! ```
//!
//! Invariants the router enforces:
//! - a direct or template answer never invokes the LLM collaborator,
//! - a failed direct handler escalates once instead of surfacing a wrong or
//!   empty answer,
//! - curated template statements pass through the same validation gate as
//!   generated ones before touching storage,
//! - at most one fallback generation is in flight per cache fingerprint;
//!   concurrent duplicates wait and then read the cache,
//! - `route_query` itself never returns `Err`: every failure becomes a
//!   `Failed` outcome with a machine-readable code.
//!
//! ## Rust Learning Notes
//!
//! The single-flight guard is a per-fingerprint `tokio::sync::Mutex` stored
//! in a `DashMap`. Waiters clone the `Arc` before awaiting the lock, so the
//! map entry can be removed by the winner without invalidating anyone.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::cache::ResultCache;
use crate::config::DispatcherConfig;
use crate::dictionary::TemplateDictionary;
use crate::fallback::{FallbackPipeline, GeneratedQueryValidator, ReadOnlyExecutor};
use crate::llm::LlmClient;
use crate::models::{
    ActionResult, FailureCode, Query, ResultSet, RouteDecision, RouteOutcome, RouteResult,
    RouteState, TemplateGroup, Tier,
};
use crate::registry::ActionRegistry;
use crate::stats::{StatsRecorder, StatsSnapshot};
use crate::{DispatchError, Result};

/// The tiered query dispatcher. Immutable after construction; every method
/// takes `&self` and the whole thing is shared behind one `Arc`.
pub struct QueryDispatcher {
    config: DispatcherConfig,
    registry: ActionRegistry,
    dictionary: TemplateDictionary,
    fallback: FallbackPipeline,
    validator: GeneratedQueryValidator,
    executor: Arc<dyn ReadOnlyExecutor>,
    cache: ResultCache,
    stats: StatsRecorder,
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl QueryDispatcher {
    pub fn new(
        config: DispatcherConfig,
        llm: Arc<dyn LlmClient>,
        executor: Arc<dyn ReadOnlyExecutor>,
    ) -> Result<Self> {
        let registry = ActionRegistry::new(
            config.actions.clone(),
            Arc::clone(&executor),
            config.max_rows,
            config.statement_timeout_ms,
        )?;
        let dictionary = TemplateDictionary::new(config.template_groups.clone());
        let fallback = FallbackPipeline::new(
            llm,
            Arc::clone(&executor),
            config.max_rows,
            config.statement_timeout_ms,
        );
        Ok(Self {
            config,
            registry,
            dictionary,
            fallback,
            validator: GeneratedQueryValidator::new(),
            executor,
            cache: ResultCache::new(),
            stats: StatsRecorder::new(),
            inflight: DashMap::new(),
        })
    }

    /// Route one query through the machine. Infallible by contract: every
    /// error path ends in a `Failed` outcome with its failure code.
    pub async fn route_query(&self, query: Query) -> RouteResult {
        let started = Instant::now();
        let result = self.run_machine(&query).await;
        let result = RouteResult {
            latency_ms: started.elapsed().as_millis() as u64,
            ..result
        };
        self.stats.record(&result);
        info!(
            tier = %result.decision.tier,
            cache_hit = result.decision.cache_hit,
            done = result.outcome.is_done(),
            latency_ms = result.latency_ms,
            "query routed"
        );
        result
    }

    async fn run_machine(&self, query: &Query) -> RouteResult {
        let mut trace = vec![RouteState::Received, RouteState::CacheCheck];
        let fingerprint = ResultCache::fingerprint(query, self.config.tier_policy_version);

        if let Some(cached) = self.cache.get(&fingerprint) {
            trace.push(RouteState::Done);
            return cached_result(cached, trace);
        }

        // Tier 1
        trace.push(RouteState::TryDirect);
        if let Some(action) = self.registry.try_direct(query) {
            let action = action.clone();
            let outcome = self.registry.execute(&action, query).await;
            if outcome.success {
                trace.push(RouteState::Done);
                let result = action_result_set(&outcome);
                self.store(&fingerprint, &result);
                let mut decision = RouteDecision::new(Tier::Direct);
                decision.matched_id = Some(action.action_id);
                decision.confidence = 1.0;
                decision.trace = trace;
                return done(result, decision);
            }
            // One-shot escalation on handler failure
            warn!(action_id = %action.action_id, "direct handler failed, escalating");
        }

        // Tier 2
        trace.push(RouteState::TryTemplate);
        let view = self.config.schema_view_for_role(&query.context.role);
        let template = self.dictionary.best_match(query.normalized());
        let (confidence, candidates) = match &template {
            Some(m) => (m.score, m.candidates.clone()),
            None => (0.0, Vec::new()),
        };
        if let Some(m) = template {
            if m.score >= self.config.acceptance_threshold {
                let entry = m.entry.clone();
                match self
                    .validator
                    .validate(&entry.statement, &view, self.config.max_rows, self.config.statement_timeout_ms)
                {
                    Ok(plan) => {
                        return match self.executor.execute(&plan).await {
                            Ok(rows) => {
                                trace.push(RouteState::Done);
                                let result = ResultSet::from_rows(rows, Tier::Template)
                                    .with_summary(entry.description.clone())
                                    .with_estimated_tokens(entry.estimated_tokens);
                                self.store(&fingerprint, &result);
                                let mut decision = RouteDecision::new(Tier::Template);
                                decision.matched_id = Some(entry.keyword);
                                decision.confidence = confidence;
                                decision.candidates = candidates;
                                decision.trace = trace;
                                done(result, decision)
                            }
                            Err(e) => {
                                trace.push(RouteState::Failed);
                                let mut decision = RouteDecision::new(Tier::Template);
                                decision.matched_id = Some(entry.keyword);
                                decision.confidence = confidence;
                                decision.candidates = candidates;
                                decision.trace = trace;
                                failed(&e, decision)
                            }
                        };
                    }
                    Err(e) => {
                        // A curated statement the role's view rejects is not
                        // answerable at this tier; the fallback prompt only
                        // carries the role's view, so escalate.
                        warn!(keyword = %m.entry.keyword, error = %e, "template rejected for role, escalating");
                    }
                }
            }
        }

        // Tier 3, single-flight per fingerprint
        trace.push(RouteState::Fallback);
        let gate = self
            .inflight
            .entry(fingerprint.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = gate.lock().await;

        // A winner may have populated the cache while we waited
        if let Some(cached) = self.cache.get(&fingerprint) {
            trace.push(RouteState::Done);
            return cached_result(cached, trace);
        }

        let outcome = self.fallback.execute(query, &view).await;

        let mut decision = RouteDecision::new(Tier::Fallback);
        decision.confidence = confidence;
        decision.candidates = candidates;
        let routed = match outcome {
            Ok(result) => {
                trace.push(RouteState::Done);
                self.store(&fingerprint, &result);
                decision.trace = trace;
                done(result, decision)
            }
            Err(e) => {
                trace.push(RouteState::Failed);
                decision.trace = trace;
                failed(&e, decision)
            }
        };
        // Removed only after the store above, so late arrivals that missed
        // the gate still find the cached answer
        self.inflight.remove(&fingerprint);
        routed
    }

    /// Dry-run a query: report where the machine would route it without
    /// executing anything or invoking the collaborator.
    pub fn explain(&self, query: &Query) -> RouteDecision {
        let mut trace = vec![RouteState::Received, RouteState::CacheCheck];
        let fingerprint = ResultCache::fingerprint(query, self.config.tier_policy_version);

        if let Some(cached) = self.cache.get(&fingerprint) {
            trace.push(RouteState::Done);
            let mut decision = RouteDecision::new(cached.tier);
            decision.cache_hit = true;
            decision.trace = trace;
            return decision;
        }

        trace.push(RouteState::TryDirect);
        if let Some(action) = self.registry.try_direct(query) {
            let mut decision = RouteDecision::new(Tier::Direct);
            decision.matched_id = Some(action.action_id.clone());
            decision.confidence = 1.0;
            decision.trace = trace;
            return decision;
        }

        trace.push(RouteState::TryTemplate);
        if let Some(m) = self.dictionary.best_match(query.normalized()) {
            if m.score >= self.config.acceptance_threshold {
                let mut decision = RouteDecision::new(Tier::Template);
                decision.matched_id = Some(m.entry.keyword.clone());
                decision.confidence = m.score;
                decision.candidates = m.candidates;
                decision.trace = trace;
                return decision;
            }
            trace.push(RouteState::Fallback);
            let mut decision = RouteDecision::new(Tier::Fallback);
            decision.confidence = m.score;
            decision.candidates = m.candidates;
            decision.trace = trace;
            return decision;
        }

        trace.push(RouteState::Fallback);
        let mut decision = RouteDecision::new(Tier::Fallback);
        decision.trace = trace;
        decision
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn templates(&self) -> &[TemplateGroup] {
        self.dictionary.groups()
    }

    pub fn suggestions(&self, partial: &str) -> Vec<crate::models::TemplateEntry> {
        self.dictionary
            .suggestions(partial)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Admin maintenance: drop expired entries, or everything.
    pub fn cleanup_cache(&self, clear_all: bool) -> usize {
        if clear_all {
            self.cache.clear()
        } else {
            self.cache.purge_expired()
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    fn store(&self, fingerprint: &str, result: &ResultSet) {
        let ttl = Duration::from_secs(self.config.ttl_for_tier(result.tier));
        self.cache.put(fingerprint.to_string(), result.clone(), ttl);
    }
}

fn cached_result(cached: ResultSet, trace: Vec<RouteState>) -> RouteResult {
    let mut decision = RouteDecision::new(cached.tier);
    decision.cache_hit = true;
    decision.trace = trace;
    RouteResult {
        outcome: RouteOutcome::Done { result: cached },
        decision,
        latency_ms: 0,
    }
}

fn done(result: ResultSet, decision: RouteDecision) -> RouteResult {
    RouteResult {
        outcome: RouteOutcome::Done { result },
        decision,
        latency_ms: 0,
    }
}

fn failed(error: &DispatchError, decision: RouteDecision) -> RouteResult {
    RouteResult {
        outcome: RouteOutcome::Failed {
            code: failure_code(error),
            message: error.to_string(),
        },
        decision,
        latency_ms: 0,
    }
}

fn failure_code(error: &DispatchError) -> FailureCode {
    match error {
        DispatchError::InvalidInput(_) => FailureCode::InvalidInput,
        DispatchError::ValidationRejected(_) => FailureCode::ValidationRejected,
        DispatchError::ExecutionTimeout { .. } => FailureCode::ExecutionTimeout,
        DispatchError::ExecutionFailed(_) => FailureCode::ExecutionFailed,
        DispatchError::UpstreamUnavailable(_) => FailureCode::UpstreamUnavailable,
        _ => FailureCode::Internal,
    }
}

/// Shape a successful direct-action output into a result set.
fn action_result_set(action: &ActionResult) -> ResultSet {
    let mut set = match &action.data {
        Some(serde_json::Value::Array(rows)) => ResultSet::from_rows(rows.clone(), Tier::Direct),
        Some(other) => ResultSet::from_rows(vec![other.clone()], Tier::Direct),
        None => ResultSet::message(action.response.clone(), Tier::Direct),
    };
    set = set.with_summary(action.response.clone());
    if let Some(path) = &action.navigation_path {
        set.data = vec![serde_json::json!({ "navigation_path": path })];
    }
    set
}
