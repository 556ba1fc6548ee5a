// Prompt construction for the generated-query tier
// The prompt carries only the role-scoped schema view, so the model never
// even sees tables the caller is not allowed to touch.

//! # Fallback Prompt Builder
//!
//! Renders the schema view and the caller's question into a deterministic
//! chat prompt. Determinism matters: the same (view, question) pair must
//! produce byte-identical prompts so cached generations stay comparable and
//! prompt changes show up in diffs, not in flaky behavior.

use crate::models::SchemaView;

/// Builds prompts for generated-query requests.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    max_rows: u32,
}

impl PromptBuilder {
    pub fn new(max_rows: u32) -> Self {
        Self { max_rows }
    }

    /// Render the full prompt for one question against one schema view.
    pub fn build(&self, question: &str, view: &SchemaView) -> String {
        let mut prompt = String::with_capacity(1024);
        prompt.push_str("You are a SQL generator for a kindergarten management system.\n");
        prompt.push_str("Generate exactly one PostgreSQL SELECT statement answering the question.\n\n");
        prompt.push_str("Available tables and columns:\n");
        // BTreeMap iteration keeps the rendering stable across runs
        for (table, columns) in &view.tables {
            prompt.push_str(&format!("- {} ({})\n", table, columns.join(", ")));
        }
        prompt.push_str("\nRules:\n");
        prompt.push_str("1. Output only the SQL statement, no explanation and no markdown.\n");
        prompt.push_str("2. Use only the tables and columns listed above.\n");
        prompt.push_str(&format!(
            "3. Always include LIMIT {} or smaller.\n",
            self.max_rows
        ));
        prompt.push_str("4. Never use comments, semicolons, or write operations.\n");
        prompt.push_str("5. Text data in the database is Chinese.\n\n");
        prompt.push_str(&format!("Question: {}\n", question));
        prompt
    }
}
