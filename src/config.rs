// Dispatcher configuration
// Thresholds, TTLs, caps, role allow-lists and the built-in action/template
// tables. Everything the matchers treat as data lives here so the action and
// template sets can be tuned without touching matching logic.

//! # Dispatcher Configuration
//!
//! All tunables are plain serde data with compiled-in defaults, loadable
//! from a TOML file via the `config` crate. The action table and template
//! dictionary are configuration too - they are built once at boot from this
//! struct and are immutable for the process lifetime.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{ActionDescriptor, SchemaView, TemplateGroup};
use crate::{DispatchError, Result};

/// Top-level dispatcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Minimum template score for a tier-2 match; below this the router
    /// escalates to fallback.
    pub acceptance_threshold: f64,

    /// Row cap injected into (or enforced on) every executed statement.
    pub max_rows: u32,

    /// Statement timeout for the read-only execution path.
    pub statement_timeout_ms: u64,

    /// Timeout for the outbound LLM call.
    pub llm_timeout_ms: u64,

    /// Cache TTLs per tier. Direct/template answers are cheap to recompute;
    /// fallback answers cost an LLM round-trip and keep the longest TTL.
    pub direct_ttl_secs: u64,
    pub template_ttl_secs: u64,
    pub fallback_ttl_secs: u64,

    /// Bumping this invalidates every cache entry at once - used when the
    /// action table or dictionary changes between deploys.
    pub tier_policy_version: u32,

    /// Full column catalog of the queryable schema slice.
    pub schema: BTreeMap<String, Vec<String>>,

    /// Role -> table allow-list. `"*"` grants every table in `schema`.
    pub role_tables: BTreeMap<String, Vec<String>>,

    /// The tier-1 action table.
    pub actions: Vec<ActionDescriptor>,

    /// The tier-2 template dictionary.
    pub template_groups: Vec<TemplateGroup>,
}

impl DispatcherConfig {
    /// Load from a TOML file, layered over the compiled-in defaults.
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()
            .map_err(|e| DispatchError::Configuration(e.to_string()))?;
        settings
            .try_deserialize()
            .map_err(|e| DispatchError::Configuration(e.to_string()))
    }

    /// The whitelisted schema view a role is allowed to query.
    ///
    /// Unknown roles get the most restrictive view (students + activities
    /// only), matching the surrounding permission layer's default.
    pub fn schema_view_for_role(&self, role: &str) -> SchemaView {
        let tables: Vec<&str> = match self.role_tables.get(role) {
            Some(list) if list.iter().any(|t| t == "*") => {
                self.schema.keys().map(|s| s.as_str()).collect()
            }
            Some(list) => list.iter().map(|s| s.as_str()).collect(),
            None => vec!["students", "activities"],
        };
        let mut view = SchemaView::new();
        for table in tables {
            if let Some(columns) = self.schema.get(table) {
                let cols: Vec<&str> = columns.iter().map(|c| c.as_str()).collect();
                view = view.with_table(table, &cols);
            }
        }
        view
    }

    pub fn ttl_for_tier(&self, tier: crate::models::Tier) -> u64 {
        match tier {
            crate::models::Tier::Direct => self.direct_ttl_secs,
            crate::models::Tier::Template => self.template_ttl_secs,
            crate::models::Tier::Fallback => self.fallback_ttl_secs,
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.6,
            max_rows: 100,
            statement_timeout_ms: 5000,
            llm_timeout_ms: 30_000,
            direct_ttl_secs: 60,
            template_ttl_secs: 300,
            fallback_ttl_secs: 3600,
            tier_policy_version: 1,
            schema: default_schema(),
            role_tables: default_role_tables(),
            actions: default_actions(),
            template_groups: default_template_groups(),
        }
    }
}

fn cols(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// The queryable slice of the relational schema. This is the *whole* catalog;
/// per-role views are cut from it by `role_tables`.
fn default_schema() -> BTreeMap<String, Vec<String>> {
    let mut schema = BTreeMap::new();
    schema.insert(
        "students".to_string(),
        cols(&["id", "name", "gender", "birth_date", "class_id", "status", "created_at"]),
    );
    schema.insert(
        "teachers".to_string(),
        cols(&["id", "name", "phone", "class_id", "position", "created_at"]),
    );
    schema.insert(
        "classes".to_string(),
        cols(&["id", "name", "grade", "capacity", "teacher_id"]),
    );
    schema.insert(
        "activities".to_string(),
        cols(&["id", "title", "activity_date", "location", "capacity", "status", "created_at"]),
    );
    schema.insert(
        "activity_registrations".to_string(),
        cols(&["id", "activity_id", "student_id", "status", "registered_at"]),
    );
    schema.insert(
        "parents".to_string(),
        cols(&["id", "name", "phone", "student_id"]),
    );
    schema.insert(
        "enrollment_applications".to_string(),
        cols(&["id", "student_name", "status", "channel", "applied_at"]),
    );
    schema.insert(
        "fee_records".to_string(),
        cols(&["id", "student_id", "amount", "fee_type", "paid_at"]),
    );
    schema.insert(
        "marketing_campaigns".to_string(),
        cols(&["id", "name", "channel", "budget", "start_date", "end_date"]),
    );
    schema
}

fn default_role_tables() -> BTreeMap<String, Vec<String>> {
    let mut roles = BTreeMap::new();
    roles.insert("admin".to_string(), cols(&["*"]));
    roles.insert("principal".to_string(), cols(&["*"]));
    roles.insert(
        "teacher".to_string(),
        cols(&["students", "classes", "activities", "activity_registrations", "parents"]),
    );
    roles.insert(
        "parent".to_string(),
        cols(&["students", "activities", "activity_registrations", "classes"]),
    );
    roles
}

/// The built-in tier-1 action table.
fn default_actions() -> Vec<ActionDescriptor> {
    vec![
        ActionDescriptor::count("count_students", "students", &["学生总数", "学生数量", "多少学生", "count students"]),
        ActionDescriptor::count("count_teachers", "teachers", &["教师总数", "教师数量", "多少教师", "count teachers"]),
        ActionDescriptor::count("count_classes", "classes", &["班级总数", "班级数量", "多少班级"]),
        ActionDescriptor::count("count_parents", "parents", &["家长总数", "家长数量"]),
        ActionDescriptor::aggregate(
            "get_today_activities",
            "SELECT title, location, activity_date FROM activities WHERE activity_date = CURRENT_DATE LIMIT 20",
            &["今日活动", "今天的活动"],
        ),
        ActionDescriptor::aggregate(
            "get_enrollment_stats",
            "SELECT status, COUNT(*) AS cnt FROM enrollment_applications GROUP BY status LIMIT 20",
            &["招生统计", "招生情况"],
        ),
        ActionDescriptor::aggregate(
            "get_fee_stats",
            "SELECT fee_type, SUM(amount) AS total FROM fee_records GROUP BY fee_type LIMIT 20",
            &["费用统计", "收费统计"],
        ),
        ActionDescriptor::navigate("navigate_to_student_list", "/students", "学生列表", &["学生列表", "查看学生列表"]),
        ActionDescriptor::navigate("navigate_to_student_create", "/students/create", "添加学生", &["添加学生", "学生添加", "新增学生"]),
        ActionDescriptor::navigate("navigate_to_class_management", "/classes", "班级管理", &["班级管理", "班级列表"]),
        ActionDescriptor::navigate("navigate_to_enrollment_plans", "/enrollment/plans", "招生计划", &["招生计划"]),
        ActionDescriptor::navigate("navigate_to_marketing_campaigns", "/marketing/campaigns", "营销活动", &["营销活动", "营销管理"]),
    ]
}

/// The built-in tier-2 dictionary: category-grouped, curated templates with
/// known token costs and curated statements.
fn default_template_groups() -> Vec<TemplateGroup> {
    vec![
        TemplateGroup::new("student", "学生管理", "user", "学生相关查询")
            .with_entry(
                "学生信息",
                "查询学生的姓名、年龄、班级等基本信息",
                "student",
                300,
                "SELECT name, gender, birth_date, class_id, status FROM students LIMIT 100",
            )
            .with_entry(
                "班级学生人数",
                "统计各班级的学生人数",
                "statistics",
                350,
                "SELECT class_id, COUNT(*) AS student_count FROM students GROUP BY class_id LIMIT 100",
            )
            .with_entry(
                "本月新生",
                "查询本月新入学的学生",
                "student",
                320,
                "SELECT name, class_id, created_at FROM students WHERE created_at >= date_trunc('month', CURRENT_DATE) LIMIT 100",
            ),
        TemplateGroup::new("activity", "活动管理", "calendar", "活动相关查询")
            .with_entry(
                "活动列表",
                "查询近期的活动安排",
                "activity",
                280,
                "SELECT title, activity_date, location, status FROM activities ORDER BY activity_date DESC LIMIT 100",
            )
            .with_entry(
                "活动参与统计",
                "统计各活动的报名参与人数",
                "statistics",
                380,
                "SELECT activity_id, COUNT(*) AS registrations FROM activity_registrations GROUP BY activity_id LIMIT 100",
            ),
        TemplateGroup::new("enrollment", "招生管理", "clipboard", "招生相关查询")
            .with_entry(
                "招生申请",
                "查询招生申请及其状态",
                "enrollment",
                320,
                "SELECT student_name, status, channel, applied_at FROM enrollment_applications ORDER BY applied_at DESC LIMIT 100",
            )
            .with_entry(
                "招生渠道分析",
                "统计各渠道的招生申请数量",
                "statistics",
                400,
                "SELECT channel, COUNT(*) AS applications FROM enrollment_applications GROUP BY channel LIMIT 100",
            ),
        TemplateGroup::new("finance", "财务管理", "credit-card", "费用相关查询")
            .with_entry(
                "缴费记录",
                "查询最近的缴费记录",
                "finance",
                300,
                "SELECT student_id, amount, fee_type, paid_at FROM fee_records ORDER BY paid_at DESC LIMIT 100",
            )
            .with_entry(
                "费用汇总",
                "按费用类型汇总收费金额",
                "statistics",
                360,
                "SELECT fee_type, SUM(amount) AS total FROM fee_records GROUP BY fee_type LIMIT 100",
            ),
    ]
}
