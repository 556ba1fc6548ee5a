// Tier-2 template dictionary: curated statements, scored keyword match

//! # Template Dictionary
//!
//! Tier 2 holds curated query templates grouped by business area. A query is
//! matched by token overlap between its normalized text and each template's
//! keyword, weighted by inverse document frequency over the dictionary so
//! that rare, specific tokens count more than ubiquitous ones.
//!
//! Tokenization handles Chinese without a segmenter: runs of CJK characters
//! become character bigrams, runs of ASCII alphanumerics become lowercase
//! words. "学生信息" tokenizes to {学生, 生信, 信息}, which overlaps the
//! longer question "查询所有学生的基本信息" on 学生 and 信息.
//!
//! The score for a template is the IDF-weighted share of ITS tokens present
//! in the query, in `[0, 1]`. A long question that fully contains a short
//! keyword scores 1.0; extra question tokens do not dilute the score.
//!
//! ## Rust Learning Notes
//!
//! The dictionary is built once and shared immutably behind an `Arc`, so
//! scoring needs no locks. All derived state (token sets, IDF table) is
//! computed in the constructor; queries only read.

use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::models::{TemplateEntry, TemplateGroup};

/// How many scored candidates to surface on a routing decision.
const CANDIDATE_LIMIT: usize = 3;

/// A scored template match.
#[derive(Debug, Clone)]
pub struct TemplateMatch<'a> {
    pub entry: &'a TemplateEntry,
    pub score: f64,
    /// Top-scored `(keyword, score)` pairs, best first, for diagnostics.
    pub candidates: Vec<(String, f64)>,
}

struct IndexedTemplate {
    entry: TemplateEntry,
    tokens: BTreeSet<String>,
}

/// Immutable, pre-indexed dictionary of curated query templates.
pub struct TemplateDictionary {
    groups: Vec<TemplateGroup>,
    indexed: Vec<IndexedTemplate>,
    idf: HashMap<String, f64>,
}

impl TemplateDictionary {
    pub fn new(groups: Vec<TemplateGroup>) -> Self {
        let indexed: Vec<IndexedTemplate> = groups
            .iter()
            .flat_map(|g| g.entries.iter().cloned())
            .map(|entry| {
                let tokens = tokens(&crate::models::query::normalize(&entry.keyword));
                IndexedTemplate { entry, tokens }
            })
            .collect();

        // Document frequency over template token sets
        let mut df: HashMap<String, usize> = HashMap::new();
        for template in &indexed {
            for token in &template.tokens {
                *df.entry(token.clone()).or_insert(0) += 1;
            }
        }
        let n = indexed.len().max(1) as f64;
        let idf = df
            .into_iter()
            .map(|(token, count)| (token, 1.0 + (n / (1.0 + count as f64)).ln().max(0.0)))
            .collect();

        Self {
            groups,
            indexed,
            idf,
        }
    }

    pub fn len(&self) -> usize {
        self.indexed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexed.is_empty()
    }

    /// All groups, for the template-listing endpoint.
    pub fn groups(&self) -> &[TemplateGroup] {
        &self.groups
    }

    /// Score every template against normalized query text, best first.
    pub fn search(&self, normalized: &str) -> Vec<(&TemplateEntry, f64)> {
        let query_tokens = tokens(normalized);
        let mut scored: Vec<(&TemplateEntry, f64)> = self
            .indexed
            .iter()
            .map(|template| (&template.entry, self.score(&query_tokens, template)))
            .collect();
        // Stable ordering: score descending, dictionary order on ties
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
    }

    /// Best match for normalized query text, with its score and the top
    /// candidate list. `None` only when the dictionary is empty.
    pub fn best_match(&self, normalized: &str) -> Option<TemplateMatch<'_>> {
        let scored = self.search(normalized);
        let (entry, score) = *scored.first()?;
        let candidates = scored
            .iter()
            .take(CANDIDATE_LIMIT)
            .map(|(entry, score)| (entry.keyword.clone(), *score))
            .collect();
        debug!(keyword = %entry.keyword, score, "template tier scored");
        Some(TemplateMatch {
            entry,
            score,
            candidates,
        })
    }

    /// Entries belonging to one display group.
    pub fn by_group(&self, group_id: &str) -> Vec<&TemplateEntry> {
        self.indexed
            .iter()
            .filter(|t| t.entry.group_id == group_id)
            .map(|t| &t.entry)
            .collect()
    }

    /// Entries carrying one category tag, across groups.
    pub fn by_category(&self, category: &str) -> Vec<&TemplateEntry> {
        self.indexed
            .iter()
            .filter(|t| t.entry.category == category)
            .map(|t| &t.entry)
            .collect()
    }

    /// Templates whose keyword or description contains the partial text,
    /// for type-ahead suggestions. Empty input returns nothing.
    pub fn suggestions(&self, partial: &str) -> Vec<&TemplateEntry> {
        let needle = crate::models::query::normalize(partial);
        if needle.is_empty() {
            return Vec::new();
        }
        self.indexed
            .iter()
            .filter(|t| {
                t.entry.keyword.contains(&needle)
                    || crate::models::query::normalize(&t.entry.description).contains(&needle)
            })
            .map(|t| &t.entry)
            .collect()
    }

    /// IDF-weighted share of the template's tokens present in the query.
    fn score(&self, query_tokens: &BTreeSet<String>, template: &IndexedTemplate) -> f64 {
        if template.tokens.is_empty() || query_tokens.is_empty() {
            return 0.0;
        }
        let weight = |token: &String| self.idf.get(token).copied().unwrap_or(1.0);
        let total: f64 = template.tokens.iter().map(weight).sum();
        let shared: f64 = template
            .tokens
            .intersection(query_tokens)
            .map(weight)
            .sum();
        if total <= 0.0 {
            0.0
        } else {
            (shared / total).clamp(0.0, 1.0)
        }
    }
}

/// Tokenize normalized text: ASCII alphanumeric runs become lowercase word
/// tokens, runs of other alphanumerics (CJK) become character bigrams. A
/// lone CJK character yields itself.
pub fn tokens(normalized: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let mut ascii_run = String::new();
    let mut cjk_run: Vec<char> = Vec::new();

    let flush_ascii = |run: &mut String, out: &mut BTreeSet<String>| {
        if !run.is_empty() {
            out.insert(std::mem::take(run));
        }
    };
    let flush_cjk = |run: &mut Vec<char>, out: &mut BTreeSet<String>| {
        match run.len() {
            0 => {}
            1 => {
                out.insert(run[0].to_string());
            }
            _ => {
                for pair in run.windows(2) {
                    out.insert(pair.iter().collect());
                }
            }
        }
        run.clear();
    };

    for ch in normalized.chars() {
        if ch.is_ascii_alphanumeric() {
            flush_cjk(&mut cjk_run, &mut out);
            ascii_run.push(ch);
        } else if ch.is_alphanumeric() {
            flush_ascii(&mut ascii_run, &mut out);
            cjk_run.push(ch);
        } else {
            flush_ascii(&mut ascii_run, &mut out);
            flush_cjk(&mut cjk_run, &mut out);
        }
    }
    flush_ascii(&mut ascii_run, &mut out);
    flush_cjk(&mut cjk_run, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dictionary() -> TemplateDictionary {
        let student = TemplateGroup::new("student", "学生查询", "👦", "学生相关查询")
            .with_entry(
                "学生信息",
                "查询所有学生的基本信息",
                "student",
                120,
                "SELECT id, name, age, class_id FROM students LIMIT 100",
            )
            .with_entry(
                "本月新生",
                "本月新入园的学生",
                "student",
                90,
                "SELECT id, name, created_at FROM students WHERE created_at >= date_trunc('month', now()) LIMIT 100",
            );
        let activity = TemplateGroup::new("activity", "活动查询", "🎨", "活动相关查询")
            .with_entry(
                "今日活动",
                "今天安排的活动",
                "activity",
                80,
                "SELECT id, title FROM activities WHERE activity_date = current_date LIMIT 100",
            );
        TemplateDictionary::new(vec![student, activity])
    }

    #[test]
    fn test_cjk_bigram_tokens() {
        let t = tokens("学生信息");
        assert!(t.contains("学生"));
        assert!(t.contains("生信"));
        assert!(t.contains("信息"));
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn test_mixed_script_tokens() {
        let t = tokens("班级 class 人数");
        assert!(t.contains("class"));
        assert!(t.contains("班级"));
        assert!(t.contains("人数"));
    }

    #[test]
    fn test_contained_keyword_scores_high() {
        let dict = dictionary();
        let m = dict
            .best_match(&crate::models::query::normalize("查询所有学生的基本信息"))
            .unwrap();
        assert_eq!(m.entry.keyword, "学生信息");
        assert!(m.score >= 0.6, "score was {}", m.score);
    }

    #[test]
    fn test_unrelated_query_scores_low() {
        let dict = dictionary();
        let m = dict
            .best_match(&crate::models::query::normalize("帮我写一首关于春天的诗"))
            .unwrap();
        assert!(m.score < 0.6, "score was {}", m.score);
    }

    #[test]
    fn test_candidates_are_sorted() {
        let dict = dictionary();
        let m = dict
            .best_match(&crate::models::query::normalize("本月有哪些新生入园"))
            .unwrap();
        assert!(m.candidates.len() <= 3);
        for pair in m.candidates.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
        assert_eq!(m.candidates[0].0, "本月新生");
    }

    #[test]
    fn test_group_and_category_browsing() {
        let dict = dictionary();
        assert_eq!(dict.by_group("student").len(), 2);
        assert_eq!(dict.by_group("nonexistent").len(), 0);
        let student_entries = dict.by_category("student");
        assert!(student_entries.iter().all(|e| e.category == "student"));
        assert_eq!(student_entries.len(), 2);
    }

    #[test]
    fn test_suggestions_match_keyword_and_description() {
        let dict = dictionary();
        let hits = dict.suggestions("学生");
        assert!(hits.iter().any(|e| e.keyword == "学生信息"));
        assert!(dict.suggestions("").is_empty());
    }

    #[test]
    fn test_empty_dictionary_has_no_match() {
        let dict = TemplateDictionary::new(vec![]);
        assert!(dict.best_match("任何问题").is_none());
    }
}
