// Tier-1 action table entries and their results

//! # Direct Actions
//!
//! Tier 1 exists to answer common, cheap queries ("学生总数", "count
//! students") without ever invoking the LLM. The action table is data, not
//! code: each [`ActionDescriptor`] pairs a set of trigger keywords with a
//! [`DirectActionKind`] describing what the handler does. Every kind is
//! side-effect-free and bounded - at most one fixed read-only statement.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a direct action does when it fires.
///
/// The variants cover the original action table: entity counts, navigation
/// hints and single fixed aggregates. There is intentionally no free-form
/// variant - tier 1 never executes caller-supplied text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DirectActionKind {
    /// `SELECT COUNT(*)` over one whitelisted table.
    Count { table: String },
    /// Pure navigation hint; no I/O at all.
    Navigate { route: String, label: String },
    /// One fixed, curated read-only statement.
    Aggregate { statement: String },
}

/// One entry of the fixed keyword -> handler table.
///
/// Built once at process start from configuration and never mutated at
/// runtime. `side_effect_free` is an invariant, not an option: the registry
/// refuses descriptors that clear it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub action_id: String,
    /// Trigger keywords, matched against the normalized query text.
    pub keywords: Vec<String>,
    pub kind: DirectActionKind,
    #[serde(default = "default_true")]
    pub side_effect_free: bool,
}

fn default_true() -> bool {
    true
}

impl ActionDescriptor {
    pub fn count(action_id: &str, table: &str, keywords: &[&str]) -> Self {
        Self {
            action_id: action_id.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            kind: DirectActionKind::Count {
                table: table.to_string(),
            },
            side_effect_free: true,
        }
    }

    pub fn navigate(action_id: &str, route: &str, label: &str, keywords: &[&str]) -> Self {
        Self {
            action_id: action_id.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            kind: DirectActionKind::Navigate {
                route: route.to_string(),
                label: label.to_string(),
            },
            side_effect_free: true,
        }
    }

    pub fn aggregate(action_id: &str, statement: &str, keywords: &[&str]) -> Self {
        Self {
            action_id: action_id.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            kind: DirectActionKind::Aggregate {
                statement: statement.to_string(),
            },
            side_effect_free: true,
        }
    }
}

/// Output of a direct action handler.
///
/// `success == false` means the handler itself failed (e.g. the count
/// statement errored); the router treats that as a recoverable "action
/// failed" and escalates once, rather than surfacing a wrong answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub action_id: String,
    pub success: bool,
    /// Human-readable answer text ("当前共有 42 名学生").
    pub response: String,
    /// Structured payload: a count, a navigation target, aggregate rows.
    pub data: Option<Value>,
    /// Frontend navigation path, when the action is a navigation hint.
    pub navigation_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_constructor() {
        let d = ActionDescriptor::count("count_students", "students", &["学生总数", "学生数量"]);
        assert_eq!(d.action_id, "count_students");
        assert!(d.side_effect_free);
        assert_eq!(
            d.kind,
            DirectActionKind::Count {
                table: "students".to_string()
            }
        );
    }

    #[test]
    fn test_kind_round_trips_through_serde() {
        let d = ActionDescriptor::navigate(
            "navigate_to_student_list",
            "/students",
            "学生列表",
            &["学生列表"],
        );
        let json = serde_json::to_string(&d).unwrap();
        let back: ActionDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back.action_id, d.action_id);
        assert!(matches!(back.kind, DirectActionKind::Navigate { .. }));
    }
}
