// Tier-2 template dictionary definitions

//! # Query Templates
//!
//! The template dictionary is the curated middle tier: each entry describes
//! one known query shape with its trigger keyword, a category tag, the
//! curated read-only statement that answers it and a token-cost estimate
//! that can be surfaced to callers and billing before anything runs.
//! Entries are grouped for the frontend's template browser (each group has
//! a display name and icon). Loaded once at startup, read-only thereafter.

use serde::{Deserialize, Serialize};

/// One matchable query template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateEntry {
    /// Primary trigger keyword, e.g. "学生信息".
    pub keyword: String,
    /// Human description shown in the template browser.
    pub description: String,
    /// Category tag for `by_category` browsing ("student", "statistics"...).
    pub category: String,
    /// Known token cost of answering this template; surfaced with results.
    pub estimated_tokens: u32,
    /// Curated read-only statement executed when this template matches.
    pub statement: String,
    /// Owning group.
    pub group_id: String,
}

/// A display group of templates (学生管理, 活动管理, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateGroup {
    pub group_id: String,
    pub name: String,
    pub icon: String,
    pub description: String,
    /// Ordered: the frontend renders these in sequence.
    pub entries: Vec<TemplateEntry>,
}

impl TemplateGroup {
    pub fn new(group_id: &str, name: &str, icon: &str, description: &str) -> Self {
        Self {
            group_id: group_id.to_string(),
            name: name.to_string(),
            icon: icon.to_string(),
            description: description.to_string(),
            entries: Vec::new(),
        }
    }

    pub fn with_entry(
        mut self,
        keyword: &str,
        description: &str,
        category: &str,
        estimated_tokens: u32,
        statement: &str,
    ) -> Self {
        self.entries.push(TemplateEntry {
            keyword: keyword.to_string(),
            description: description.to_string(),
            category: category.to_string(),
            estimated_tokens,
            statement: statement.to_string(),
            group_id: self.group_id.clone(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_links_entries_to_group() {
        let group = TemplateGroup::new("student", "学生管理", "user", "学生相关查询")
            .with_entry(
                "学生信息",
                "查询学生基本信息",
                "student",
                300,
                "SELECT name, age, class_id FROM students LIMIT 100",
            )
            .with_entry(
                "班级学生人数",
                "统计各班级学生人数",
                "statistics",
                350,
                "SELECT class_id, COUNT(*) AS cnt FROM students GROUP BY class_id LIMIT 100",
            );
        assert_eq!(group.entries.len(), 2);
        assert!(group.entries.iter().all(|e| e.group_id == "student"));
    }
}
