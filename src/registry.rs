// Tier-1 registry: fixed keyword table, bounded handlers, no LLM anywhere

//! # Action Registry
//!
//! The first tier of the escalation ladder. Matching is exact substring over
//! the normalized query, longest keyword wins, registration order breaks
//! ties. Handlers are the only code that runs on a direct hit, and the only
//! I/O a handler may perform is one fixed read-only statement through the
//! shared executor. A handler error is caught here and reported as a failed
//! [`ActionResult`], never as a panic and never as silent escalation on its
//! own; the router decides what to do with the failure.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::fallback::ReadOnlyExecutor;
use crate::models::{ActionDescriptor, ActionResult, DirectActionKind, ExecutionPlan, Query};
use crate::{DispatchError, Result};

/// Immutable keyword -> handler table, built once at startup.
pub struct ActionRegistry {
    actions: Vec<ActionDescriptor>,
    executor: Arc<dyn ReadOnlyExecutor>,
    max_rows: u32,
    statement_timeout_ms: u64,
}

impl ActionRegistry {
    /// Build the registry, rejecting any descriptor that is not marked
    /// side-effect-free. That flag is the tier's core invariant and a
    /// misconfigured table should fail the process at startup, not at
    /// query time.
    pub fn new(
        actions: Vec<ActionDescriptor>,
        executor: Arc<dyn ReadOnlyExecutor>,
        max_rows: u32,
        statement_timeout_ms: u64,
    ) -> Result<Self> {
        for action in &actions {
            if !action.side_effect_free {
                return Err(DispatchError::Configuration(format!(
                    "action '{}' is not side-effect-free",
                    action.action_id
                )));
            }
            if action.keywords.is_empty() {
                return Err(DispatchError::Configuration(format!(
                    "action '{}' has no trigger keywords",
                    action.action_id
                )));
            }
        }
        Ok(Self {
            actions,
            executor,
            max_rows,
            statement_timeout_ms,
        })
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Find the best direct match for a query, if any.
    ///
    /// Deterministic by construction: the longest matching keyword wins, and
    /// for equal lengths the earlier registration wins. Returns `None` when
    /// no keyword occurs in the normalized text, which is the signal to
    /// escalate to tier 2.
    pub fn try_direct(&self, query: &Query) -> Option<&ActionDescriptor> {
        let text = query.normalized();
        let mut best: Option<(&ActionDescriptor, usize)> = None;
        for action in &self.actions {
            for keyword in &action.keywords {
                if !text.contains(keyword.as_str()) {
                    continue;
                }
                let length = keyword.chars().count();
                match best {
                    Some((_, best_len)) if best_len >= length => {}
                    _ => best = Some((action, length)),
                }
            }
        }
        if let Some((action, _)) = best {
            debug!(action_id = %action.action_id, "direct tier matched");
        }
        best.map(|(action, _)| action)
    }

    /// Run a matched descriptor's handler.
    ///
    /// Errors from the executor are caught and folded into a failed
    /// `ActionResult` so a broken fixed statement degrades one query, not
    /// the process.
    pub async fn execute(&self, action: &ActionDescriptor, _query: &Query) -> ActionResult {
        match &action.kind {
            DirectActionKind::Navigate { route, label } => ActionResult {
                action_id: action.action_id.clone(),
                success: true,
                response: format!("正在为您打开{}", label),
                data: None,
                navigation_path: Some(route.clone()),
            },
            DirectActionKind::Count { table } => {
                let statement = format!("SELECT COUNT(*) AS total FROM {}", table);
                self.run_statement(action, &statement, |rows| {
                    let total = rows
                        .first()
                        .and_then(|row| row.get("total"))
                        .and_then(|v| v.as_i64())
                        .unwrap_or(0);
                    (format!("当前共有 {} 条记录", total), serde_json::json!({ "total": total }))
                })
                .await
            }
            DirectActionKind::Aggregate { statement } => {
                self.run_statement(action, statement, |rows| {
                    (
                        format!("查询完成，共 {} 条结果", rows.len()),
                        serde_json::Value::Array(rows.to_vec()),
                    )
                })
                .await
            }
        }
    }

    async fn run_statement(
        &self,
        action: &ActionDescriptor,
        statement: &str,
        shape: impl FnOnce(&[serde_json::Value]) -> (String, serde_json::Value),
    ) -> ActionResult {
        let plan = ExecutionPlan {
            statement: statement.to_string(),
            allowed_tables: Vec::new(),
            max_rows: self.max_rows,
            timeout_ms: self.statement_timeout_ms,
        };
        match self.executor.execute(&plan).await {
            Ok(rows) => {
                let (response, data) = shape(&rows);
                ActionResult {
                    action_id: action.action_id.clone(),
                    success: true,
                    response,
                    data: Some(data),
                    navigation_path: None,
                }
            }
            Err(e) => {
                warn!(action_id = %action.action_id, error = %e, "direct action failed");
                ActionResult {
                    action_id: action.action_id.clone(),
                    success: false,
                    response: format!("操作失败: {}", e),
                    data: None,
                    navigation_path: None,
                }
            }
        }
    }
}
