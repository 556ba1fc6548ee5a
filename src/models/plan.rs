// Execution plans, schema views and shaped result sets

//! # Execution Plans and Schema Views
//!
//! An [`ExecutionPlan`] is the only thing the storage collaborator will
//! execute: a generated (or curated) statement that has already passed the
//! validation gate, together with the allow-list it was validated against
//! and its row/time bounds. Plans are created per invocation and discarded
//! after use; a statement that fails validation never becomes a plan.
//!
//! A [`SchemaView`] is the whitelisted slice of the relational schema that a
//! given role may see. The fallback prompt includes only this view, never
//! the full schema.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Tier;

/// Whitelisted table -> column view of the schema.
///
/// `BTreeMap` keeps prompt rendering deterministic, which keeps cache
/// fingerprints and tests stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaView {
    pub tables: BTreeMap<String, Vec<String>>,
}

impl SchemaView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: &str, columns: &[&str]) -> Self {
        self.tables.insert(
            table.to_string(),
            columns.iter().map(|c| c.to_string()).collect(),
        );
        self
    }

    pub fn allows_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// A validated, bounded read-only query ready for execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// The statement text, post-validation (LIMIT injected if missing).
    pub statement: String,
    /// Tables the statement was validated against.
    pub allowed_tables: Vec<String>,
    pub max_rows: u32,
    pub timeout_ms: u64,
}

/// Column metadata attached to shaped results for frontend table rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Coarse type tag: "number", "string", "boolean", "datetime", "null".
    pub data_type: String,
}

/// The shaped response contract, identical across all three tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSet {
    pub data: Vec<Value>,
    pub columns: Vec<ColumnInfo>,
    /// Optional human summary ("当前共有 42 名学生").
    pub summary_text: Option<String>,
    pub tier: Tier,
    /// Known in advance for direct/template answers; actual usage for
    /// fallback answers when the provider reports it.
    pub estimated_tokens: u32,
}

impl ResultSet {
    /// Shape raw JSON rows: infer column metadata from the first row.
    pub fn from_rows(rows: Vec<Value>, tier: Tier) -> Self {
        let columns = infer_columns(&rows);
        Self {
            data: rows,
            columns,
            summary_text: None,
            tier,
            estimated_tokens: 0,
        }
    }

    /// A pure-text answer with no tabular payload (navigation hints).
    pub fn message(text: impl Into<String>, tier: Tier) -> Self {
        Self {
            data: Vec::new(),
            columns: Vec::new(),
            summary_text: Some(text.into()),
            tier,
            estimated_tokens: 0,
        }
    }

    pub fn with_summary(mut self, text: impl Into<String>) -> Self {
        self.summary_text = Some(text.into());
        self
    }

    pub fn with_estimated_tokens(mut self, tokens: u32) -> Self {
        self.estimated_tokens = tokens;
        self
    }
}

/// Infer column names and coarse types from the first object row.
fn infer_columns(rows: &[Value]) -> Vec<ColumnInfo> {
    let Some(Value::Object(first)) = rows.first() else {
        return Vec::new();
    };
    first
        .iter()
        .map(|(name, value)| ColumnInfo {
            name: name.clone(),
            data_type: infer_type(value).to_string(),
        })
        .collect()
}

fn infer_type(value: &Value) -> &'static str {
    match value {
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::String(s) => {
            // Date-ish strings render as datetimes in the frontend grid
            if s.len() >= 10 && s.as_bytes().get(4) == Some(&b'-') && s.as_bytes().get(7) == Some(&b'-')
            {
                "datetime"
            } else {
                "string"
            }
        }
        Value::Null => "null",
        _ => "string",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_view_allow_check() {
        let view = SchemaView::new()
            .with_table("students", &["id", "name", "age"])
            .with_table("activities", &["id", "title"]);
        assert!(view.allows_table("students"));
        assert!(!view.allows_table("users"));
        let names: Vec<&str> = view.table_names().collect();
        assert_eq!(names, vec!["activities", "students"]); // deterministic order
    }

    #[test]
    fn test_column_inference() {
        let rows = vec![
            json!({"name": "小明", "age": 5, "enrolled_at": "2025-09-01", "active": true}),
        ];
        let set = ResultSet::from_rows(rows, Tier::Fallback);
        let types: BTreeMap<String, String> = set
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.data_type.clone()))
            .collect();
        assert_eq!(types["age"], "number");
        assert_eq!(types["name"], "string");
        assert_eq!(types["enrolled_at"], "datetime");
        assert_eq!(types["active"], "boolean");
    }

    #[test]
    fn test_empty_rows_have_no_columns() {
        let set = ResultSet::from_rows(Vec::new(), Tier::Template);
        assert!(set.columns.is_empty());
        assert!(set.data.is_empty());
    }
}
