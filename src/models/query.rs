// The inbound query and its identity/permission scope

//! # Query Model
//!
//! A [`Query`] is immutable once received. Alongside the raw text it carries
//! a normalized form (lowercased, whitespace-collapsed, punctuation-stripped)
//! that every matcher and the cache fingerprint operate on, so "统计 学生！"
//! and "统计学生" route identically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{DispatchError, Result};

/// Hard cap on inbound query length, matching the HTTP layer's contract.
pub const MAX_QUERY_CHARS: usize = 1000;

/// Identity and permission scope supplied by the auth middleware.
///
/// The dispatcher never checks permissions itself; it only folds this scope
/// into the cache fingerprint so two users with different data visibility
/// never share a cached answer, and passes the role down so the fallback
/// tier selects the matching schema allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryContext {
    pub user_id: i64,
    /// Role name as the auth layer reports it ("admin", "principal",
    /// "teacher", "parent"). Selects the schema allow-list.
    pub role: String,
    pub conversation_id: Option<Uuid>,
}

impl QueryContext {
    pub fn new(user_id: i64, role: impl Into<String>) -> Self {
        Self {
            user_id,
            role: role.into(),
            conversation_id: None,
        }
    }

    pub fn with_conversation(mut self, conversation_id: Uuid) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }

    /// The part of the cache key that encodes who this answer is valid for.
    pub fn scope_key(&self) -> String {
        format!("{}:{}", self.user_id, self.role)
    }
}

/// An immutable user query plus its normalized matching form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub normalized_text: String,
    pub context: QueryContext,
    pub received_at: DateTime<Utc>,
}

impl Query {
    /// Validate and normalize inbound text.
    ///
    /// Rejects empty and over-long input with [`DispatchError::InvalidInput`]
    /// before any routing work happens.
    pub fn new(text: impl Into<String>, context: QueryContext) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(DispatchError::InvalidInput(
                "query text must not be empty".to_string(),
            ));
        }
        if text.chars().count() > MAX_QUERY_CHARS {
            return Err(DispatchError::InvalidInput(format!(
                "query text exceeds {} characters",
                MAX_QUERY_CHARS
            )));
        }
        let normalized_text = normalize(&text);
        Ok(Self {
            text,
            normalized_text,
            context,
            received_at: Utc::now(),
        })
    }

    pub fn normalized(&self) -> &str {
        &self.normalized_text
    }
}

/// Lowercase, strip punctuation, and keep whitespace only where it carries
/// meaning.
///
/// Alphanumerics and non-ASCII letters (CJK in particular) survive; ASCII
/// and CJK punctuation is dropped entirely. A single space is kept between
/// two ASCII word runs, where removing it would merge distinct words. CJK
/// characters need no separator, so whitespace between them is dropped and
/// "统计 学生" normalizes the same as "统计学生".
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            pending_space = true;
        } else if ch.is_alphanumeric() {
            if pending_space
                && ch.is_ascii_alphanumeric()
                && out.chars().last().map_or(false, |c| c.is_ascii_alphanumeric())
            {
                out.push(' ');
            }
            pending_space = false;
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
        }
        // Everything else (punctuation, symbols, fullwidth marks) is dropped
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> QueryContext {
        QueryContext::new(1, "admin")
    }

    #[test]
    fn test_normalize_collapses_whitespace_and_case() {
        assert_eq!(normalize("  Count   STUDENTS  "), "count students");
    }

    #[test]
    fn test_normalize_drops_space_between_cjk_runs() {
        assert_eq!(normalize("统计 学生"), "统计学生");
        assert_eq!(normalize("统计 学生！"), normalize("统计学生"));
        assert_eq!(normalize("count 学生 total"), "count学生total");
        // A space between two ASCII words is load-bearing and stays
        assert_eq!(normalize("count all students"), "count all students");
    }

    #[test]
    fn test_normalize_strips_punctuation() {
        assert_eq!(normalize("统计学生！！"), "统计学生");
        assert_eq!(normalize("count, students?"), "count students");
        assert_eq!(normalize("查询：本月（新增）学生"), "查询本月新增学生");
    }

    #[test]
    fn test_empty_query_rejected() {
        let err = Query::new("   ", ctx()).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidInput(_)));
    }

    #[test]
    fn test_overlong_query_rejected() {
        let long = "学".repeat(MAX_QUERY_CHARS + 1);
        let err = Query::new(long, ctx()).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidInput(_)));
    }

    #[test]
    fn test_scope_key_combines_user_and_role() {
        assert_eq!(ctx().scope_key(), "1:admin");
        assert_eq!(QueryContext::new(7, "teacher").scope_key(), "7:teacher");
    }
}
