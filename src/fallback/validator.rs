// The safety gate for LLM-generated statements
// Arbitrary model output drives a query against production data, so this is
// the component with real blast-radius risk. Every check here is a hard
// gate: a statement that fails any of them never becomes an ExecutionPlan.

//! # Generated-Query Validator
//!
//! Validation rules, in order:
//! 1. exactly one statement (interior `;` rejected),
//! 2. `SELECT`-only: any write/DDL keyword on a word boundary is rejected
//!    (`created_at` does not trip the `CREATE` check - matching is done on
//!    lexer tokens, not substrings),
//! 3. no comment sequences (`--`, `/*`, `#`) and no `OR 1=1`-style
//!    tautologies,
//! 4. every `FROM`/`JOIN` table must be in the allow-list; qualified
//!    `table.column` references must name a whitelisted column,
//! 5. a `LIMIT` ≤ the configured cap must be present, or one is injected.
//!
//! The validator is pure and synchronous so it can be unit-tested against a
//! rejection corpus with no live LLM or database anywhere near it.

use tracing::debug;

use crate::models::{ExecutionPlan, SchemaView};
use crate::{DispatchError, Result};

/// Keywords that immediately disqualify a statement.
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "drop", "delete", "update", "insert", "create", "alter", "truncate", "exec", "execute",
    "declare", "grant", "revoke", "merge", "copy", "vacuum",
];

/// SQL words that may legally follow `FROM`/`JOIN` without being a table.
const NON_TABLE_WORDS: &[&str] = &["select", "lateral"];

/// Words that end a table reference; an identifier in this set is a clause
/// keyword, not a table alias.
const CLAUSE_WORDS: &[&str] = &[
    "where", "group", "order", "limit", "having", "on", "join", "left", "right", "inner",
    "outer", "cross", "full", "natural", "union",
];

/// A minimal SQL token for validation purposes.
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(String),
    Str,
    Symbol(char),
}

/// Validates generated query text and produces bounded [`ExecutionPlan`]s.
#[derive(Debug, Clone, Default)]
pub struct GeneratedQueryValidator;

impl GeneratedQueryValidator {
    pub fn new() -> Self {
        Self
    }

    /// Run the full gate. `generated` is raw LLM output; markdown fences and
    /// a single trailing semicolon are tolerated, nothing else is cleaned up.
    pub fn validate(
        &self,
        generated: &str,
        view: &SchemaView,
        max_rows: u32,
        timeout_ms: u64,
    ) -> Result<ExecutionPlan> {
        let statement = strip_decorations(generated);
        if statement.is_empty() {
            return Err(DispatchError::ValidationRejected(
                "generated output contained no statement".to_string(),
            ));
        }

        // Comment sequences hide payload from naive scanners; reject outright
        for marker in ["--", "/*", "#"] {
            if statement.contains(marker) {
                return Err(DispatchError::ValidationRejected(format!(
                    "comment sequence '{}' is not allowed",
                    marker
                )));
            }
        }

        // One statement only
        if statement.contains(';') {
            return Err(DispatchError::ValidationRejected(
                "multiple statements are not allowed".to_string(),
            ));
        }

        let tokens = tokenize(&statement);
        if tokens.is_empty() {
            return Err(DispatchError::ValidationRejected(
                "generated output contained no statement".to_string(),
            ));
        }

        // Must be a plain SELECT
        match &tokens[0] {
            Token::Ident(word) if word == "select" => {}
            _ => {
                return Err(DispatchError::ValidationRejected(
                    "only SELECT statements are allowed".to_string(),
                ));
            }
        }

        // Word-boundary keyword scan over the whole token stream
        for token in &tokens {
            if let Token::Ident(word) = token {
                if FORBIDDEN_KEYWORDS.contains(&word.as_str()) {
                    return Err(DispatchError::ValidationRejected(format!(
                        "statement contains forbidden keyword '{}'",
                        word.to_uppercase()
                    )));
                }
            }
        }

        // `OR 1=1` style tautologies
        if has_tautology(&tokens) {
            return Err(DispatchError::ValidationRejected(
                "statement contains a constant-true predicate".to_string(),
            ));
        }

        // Table allow-list
        let referenced = referenced_tables(&tokens);
        if referenced.is_empty() {
            return Err(DispatchError::ValidationRejected(
                "statement references no table".to_string(),
            ));
        }
        for table in &referenced {
            if !view.allows_table(table) {
                return Err(DispatchError::ValidationRejected(format!(
                    "table '{}' is not in the allow-list",
                    table
                )));
            }
        }

        // Qualified column references against the view
        check_qualified_columns(&tokens, view)?;

        // Row cap: reject an over-cap LIMIT, inject a missing one
        let statement = match find_limit(&tokens) {
            Some(limit) if limit > max_rows as u64 => {
                return Err(DispatchError::ValidationRejected(format!(
                    "LIMIT {} exceeds the configured cap of {}",
                    limit, max_rows
                )));
            }
            Some(_) => statement,
            None => format!("{} LIMIT {}", statement, max_rows),
        };

        debug!(tables = ?referenced, "generated statement passed validation");

        Ok(ExecutionPlan {
            statement,
            allowed_tables: view.table_names().map(|s| s.to_string()).collect(),
            max_rows,
            timeout_ms,
        })
    }
}

/// Strip markdown fences, surrounding whitespace and one trailing semicolon.
fn strip_decorations(raw: &str) -> String {
    let mut text = raw.trim();
    if text.starts_with("```") {
        text = text.trim_start_matches("```");
        // Fence may carry a language tag on the first line
        if let Some(rest) = text.strip_prefix("sql") {
            text = rest;
        }
        if let Some(end) = text.rfind("```") {
            text = &text[..end];
        }
    }
    let mut text = text.trim().to_string();
    if text.ends_with(';') {
        text.pop();
        text = text.trim_end().to_string();
    }
    text
}

/// Tokenize into identifiers, numbers, string literals and symbols.
fn tokenize(statement: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = statement.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        if ch.is_whitespace() {
            i += 1;
        } else if ch.is_alphabetic() || ch == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect::<String>().to_lowercase();
            tokens.push(Token::Ident(word));
        } else if ch.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token::Number(chars[start..i].iter().collect()));
        } else if ch == '\'' {
            // String literal with '' escaping; contents are opaque
            i += 1;
            while i < chars.len() {
                if chars[i] == '\'' {
                    if i + 1 < chars.len() && chars[i + 1] == '\'' {
                        i += 2;
                        continue;
                    }
                    i += 1;
                    break;
                }
                i += 1;
            }
            tokens.push(Token::Str);
        } else {
            tokens.push(Token::Symbol(ch));
            i += 1;
        }
    }
    tokens
}

/// Detect `OR <num> = <num>` / `AND <num> = <num>` patterns.
fn has_tautology(tokens: &[Token]) -> bool {
    for window in tokens.windows(4) {
        if let [Token::Ident(conj), Token::Number(a), Token::Symbol('='), Token::Number(b)] = window
        {
            if (conj == "or" || conj == "and") && a == b {
                return true;
            }
        }
    }
    false
}

/// Collect every table referenced after `FROM` or `JOIN`.
///
/// A `FROM` clause is a comma-separated list of `table [AS] [alias]` items,
/// so the scan walks the whole list rather than stopping at the first name.
/// `JOIN` introduces exactly one table. Subqueries open with `(` and are
/// picked up when the scan reaches their inner `FROM`.
fn referenced_tables(tokens: &[Token]) -> Vec<String> {
    let mut tables = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let keyword = match &tokens[i] {
            Token::Ident(word) if word == "from" || word == "join" => word,
            _ => {
                i += 1;
                continue;
            }
        };
        let comma_list = keyword == "from";
        let mut j = i + 1;
        loop {
            match tokens.get(j) {
                Some(Token::Ident(name)) if !NON_TABLE_WORDS.contains(&name.as_str()) => {
                    if !tables.contains(name) {
                        tables.push(name.clone());
                    }
                    j += 1;
                }
                _ => break,
            }
            // Optional `AS` and alias
            if let Some(Token::Ident(word)) = tokens.get(j) {
                if word == "as" {
                    j += 1;
                }
            }
            if let Some(Token::Ident(word)) = tokens.get(j) {
                if !CLAUSE_WORDS.contains(&word.as_str()) {
                    j += 1;
                }
            }
            if comma_list && tokens.get(j) == Some(&Token::Symbol(',')) {
                j += 1;
                continue;
            }
            break;
        }
        i = j.max(i + 1);
    }
    tables
}

/// For `table.column` references where `table` is in the view, the column
/// must be whitelisted too. Unqualified identifiers may be aliases or output
/// names and are not checked.
fn check_qualified_columns(tokens: &[Token], view: &SchemaView) -> Result<()> {
    for window in tokens.windows(3) {
        if let [Token::Ident(table), Token::Symbol('.'), Token::Ident(column)] = window {
            if let Some(columns) = view.tables.get(table) {
                if column != "*" && !columns.iter().any(|c| c == column) {
                    return Err(DispatchError::ValidationRejected(format!(
                        "column '{}.{}' is not in the allow-list",
                        table, column
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Find a `LIMIT <n>` clause.
fn find_limit(tokens: &[Token]) -> Option<u64> {
    for window in tokens.windows(2) {
        if let [Token::Ident(word), Token::Number(n)] = window {
            if word == "limit" {
                return n.parse().ok();
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> SchemaView {
        SchemaView::new()
            .with_table("students", &["id", "name", "age", "class_id", "created_at"])
            .with_table("activities", &["id", "title", "activity_date"])
            .with_table("activity_registrations", &["id", "activity_id", "student_id"])
    }

    fn validate(sql: &str) -> Result<ExecutionPlan> {
        GeneratedQueryValidator::new().validate(sql, &view(), 100, 5000)
    }

    #[test]
    fn test_accepts_plain_select() {
        let plan = validate("SELECT name, age FROM students LIMIT 50").unwrap();
        assert_eq!(plan.statement, "SELECT name, age FROM students LIMIT 50");
        assert_eq!(plan.max_rows, 100);
    }

    #[test]
    fn test_injects_missing_limit() {
        let plan = validate("SELECT name FROM students").unwrap();
        assert!(plan.statement.ends_with("LIMIT 100"));
    }

    #[test]
    fn test_rejects_over_cap_limit() {
        let err = validate("SELECT name FROM students LIMIT 5000").unwrap_err();
        assert!(matches!(err, DispatchError::ValidationRejected(_)));
    }

    #[test]
    fn test_strips_markdown_fence_and_semicolon() {
        let plan = validate("```sql\nSELECT name FROM students LIMIT 5;\n```").unwrap();
        assert_eq!(plan.statement, "SELECT name FROM students LIMIT 5");
    }

    #[test]
    fn test_rejects_writes_and_ddl() {
        let corpus = [
            "DELETE FROM students",
            "UPDATE students SET name = 'x'",
            "INSERT INTO students (name) VALUES ('x')",
            "DROP TABLE students",
            "CREATE TABLE evil (id int)",
            "ALTER TABLE students ADD COLUMN x int",
            "TRUNCATE students",
            "SELECT name FROM students WHERE id IN (DELETE FROM students RETURNING id)",
        ];
        for sql in corpus {
            let err = validate(sql).unwrap_err();
            assert!(
                matches!(err, DispatchError::ValidationRejected(_)),
                "should reject: {}",
                sql
            );
        }
    }

    #[test]
    fn test_created_at_does_not_trip_create_check() {
        let plan = validate("SELECT name, created_at FROM students LIMIT 10").unwrap();
        assert!(plan.statement.contains("created_at"));
    }

    #[test]
    fn test_rejects_multiple_statements() {
        let err = validate("SELECT name FROM students; SELECT id FROM activities").unwrap_err();
        assert!(matches!(err, DispatchError::ValidationRejected(_)));
    }

    #[test]
    fn test_rejects_comment_sequences() {
        for sql in [
            "SELECT name FROM students -- hidden",
            "SELECT name FROM students /* hidden */ LIMIT 5",
            "SELECT name FROM students # hidden",
        ] {
            assert!(validate(sql).is_err(), "should reject: {}", sql);
        }
    }

    #[test]
    fn test_rejects_tautology() {
        let err = validate("SELECT name FROM students WHERE 1 = 1 OR 2=2").unwrap_err();
        assert!(matches!(err, DispatchError::ValidationRejected(_)));
    }

    #[test]
    fn test_rejects_out_of_allowlist_tables() {
        // Synthetic corpus: every statement references a non-whitelisted table
        // and every one of them must be rejected.
        let corpus = [
            "SELECT * FROM users LIMIT 10",
            "SELECT password FROM users LIMIT 1",
            "SELECT * FROM ai_model_config LIMIT 10",
            "SELECT s.name FROM students s JOIN fee_records f ON f.student_id = s.id LIMIT 10",
            "SELECT * FROM pg_catalog LIMIT 10",
            "SELECT name FROM students UNION SELECT name FROM teachers LIMIT 10",
        ];
        let mut rejected = 0;
        for sql in corpus {
            if validate(sql).is_err() {
                rejected += 1;
            }
        }
        assert_eq!(rejected, corpus.len(), "validator must reject 100% of the corpus");
    }

    #[test]
    fn test_accepted_plans_reference_only_allowed_tables() {
        let accepted = [
            "SELECT name FROM students LIMIT 10",
            "SELECT a.title FROM activities a JOIN activity_registrations r ON r.activity_id = a.id LIMIT 10",
        ];
        for sql in accepted {
            let plan = validate(sql).unwrap();
            for table in referenced_tables(&tokenize(&plan.statement)) {
                assert!(plan.allowed_tables.contains(&table), "{} not allowed", table);
            }
        }
    }

    #[test]
    fn test_rejects_unlisted_table_in_comma_list() {
        // Every table in a comma-separated FROM list is checked, not just
        // the first one.
        let corpus = [
            "SELECT * FROM students, fee_records LIMIT 10",
            "SELECT * FROM students s, fee_records f LIMIT 10",
            "SELECT * FROM students AS s, activities a, fee_records LIMIT 10",
        ];
        for sql in corpus {
            let err = validate(sql).unwrap_err();
            assert!(
                matches!(err, DispatchError::ValidationRejected(_)),
                "should reject: {}",
                sql
            );
        }
    }

    #[test]
    fn test_accepts_comma_list_of_allowed_tables() {
        let plan = validate(
            "SELECT s.name, a.title FROM students s, activities a WHERE s.id = a.id LIMIT 10",
        )
        .unwrap();
        let tables = referenced_tables(&tokenize(&plan.statement));
        assert_eq!(tables, vec!["students".to_string(), "activities".to_string()]);
    }

    #[test]
    fn test_rejects_unlisted_qualified_column() {
        let err = validate("SELECT students.password FROM students LIMIT 5").unwrap_err();
        assert!(matches!(err, DispatchError::ValidationRejected(_)));
    }

    #[test]
    fn test_rejects_non_select() {
        let err = validate("EXPLAIN SELECT name FROM students").unwrap_err();
        assert!(matches!(err, DispatchError::ValidationRejected(_)));
    }

    #[test]
    fn test_rejects_empty_output() {
        assert!(validate("").is_err());
        assert!(validate("```sql\n```").is_err());
    }
}
