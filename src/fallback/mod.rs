// Constrained execution fallback
// The last escalation tier: ask a language model for a statement, force it
// through the validation gate, run it through the shared read-only path.

//! # Fallback Pipeline
//!
//! The pipeline is a straight line with no bypass:
//!
//! ```text
//! prompt -> LlmClient::generate -> GeneratedQueryValidator -> ReadOnlyExecutor
//! ```
//!
//! The model's text is never executed directly and never reaches the caller;
//! only validated [`ExecutionPlan`](crate::models::ExecutionPlan)s touch
//! storage. Collaborator failures surface as typed errors so the router can
//! map them to failure codes without string matching.

pub mod executor;
pub mod prompt;
pub mod validator;

pub use executor::{NullExecutor, PostgresExecutor, ReadOnlyExecutor};
pub use prompt::PromptBuilder;
pub use validator::GeneratedQueryValidator;

use std::sync::Arc;
use tracing::{debug, info};

use crate::llm::LlmClient;
use crate::models::{Query, ResultSet, SchemaView, Tier};
use crate::Result;

/// Tier-3 pipeline: generation, validation gate, bounded execution.
pub struct FallbackPipeline {
    llm: Arc<dyn LlmClient>,
    executor: Arc<dyn ReadOnlyExecutor>,
    validator: GeneratedQueryValidator,
    prompt: PromptBuilder,
    max_rows: u32,
    statement_timeout_ms: u64,
}

impl FallbackPipeline {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        executor: Arc<dyn ReadOnlyExecutor>,
        max_rows: u32,
        statement_timeout_ms: u64,
    ) -> Self {
        Self {
            llm,
            executor,
            validator: GeneratedQueryValidator::new(),
            prompt: PromptBuilder::new(max_rows),
            max_rows,
            statement_timeout_ms,
        }
    }

    /// Run one query through the full pipeline against a role-scoped view.
    pub async fn execute(&self, query: &Query, view: &SchemaView) -> Result<ResultSet> {
        let prompt = self.prompt.build(&query.normalized_text, view);
        debug!(provider = self.llm.provider_name(), "requesting generation");
        let generation = self.llm.generate(&prompt).await?;

        let plan = self.validator.validate(
            &generation.text,
            view,
            self.max_rows,
            self.statement_timeout_ms,
        )?;
        info!(statement = %plan.statement, "generated statement accepted");

        let rows = self.executor.execute(&plan).await?;
        Ok(ResultSet::from_rows(rows, Tier::Fallback)
            .with_estimated_tokens(generation.tokens_used.unwrap_or(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Generation;
    use crate::models::QueryContext;
    use crate::DispatchError;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct ScriptedLlm {
        output: String,
    }

    impl ScriptedLlm {
        fn new(output: &str) -> Self {
            Self {
                output: output.to_string(),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn generate(&self, _prompt: &str) -> Result<Generation> {
            Ok(Generation {
                text: self.output.clone(),
                tokens_used: Some(42),
            })
        }

        fn provider_name(&self) -> &str {
            "scripted"
        }
    }

    struct StaticExecutor {
        rows: Vec<Value>,
    }

    #[async_trait]
    impl ReadOnlyExecutor for StaticExecutor {
        async fn execute(&self, _plan: &crate::models::ExecutionPlan) -> Result<Vec<Value>> {
            Ok(self.rows.clone())
        }
    }

    fn view() -> SchemaView {
        SchemaView::new().with_table("students", &["id", "name", "age"])
    }

    fn query(text: &str) -> Query {
        Query::new(text, QueryContext::new(7, "teacher")).unwrap()
    }

    #[tokio::test]
    async fn test_valid_generation_executes() {
        let pipeline = FallbackPipeline::new(
            Arc::new(ScriptedLlm::new("SELECT name FROM students LIMIT 10")),
            Arc::new(StaticExecutor {
                rows: vec![json!({"name": "小明"})],
            }),
            100,
            5000,
        );
        let result = pipeline.execute(&query("列出学生姓名"), &view()).await.unwrap();
        assert_eq!(result.tier, Tier::Fallback);
        assert_eq!(result.data.len(), 1);
        assert_eq!(result.estimated_tokens, 42);
    }

    #[tokio::test]
    async fn test_rejected_generation_never_executes() {
        struct PanicExecutor;
        #[async_trait]
        impl ReadOnlyExecutor for PanicExecutor {
            async fn execute(&self, _plan: &crate::models::ExecutionPlan) -> Result<Vec<Value>> {
                panic!("executor must not run for rejected statements");
            }
        }

        let pipeline = FallbackPipeline::new(
            Arc::new(ScriptedLlm::new("DROP TABLE students")),
            Arc::new(PanicExecutor),
            100,
            5000,
        );
        let err = pipeline.execute(&query("删库"), &view()).await.unwrap_err();
        assert!(matches!(err, DispatchError::ValidationRejected(_)));
    }

    #[tokio::test]
    async fn test_upstream_failure_propagates() {
        struct DownLlm;
        #[async_trait]
        impl LlmClient for DownLlm {
            async fn generate(&self, _prompt: &str) -> Result<Generation> {
                Err(DispatchError::UpstreamUnavailable("connect refused".to_string()))
            }
            fn provider_name(&self) -> &str {
                "down"
            }
        }

        let pipeline = FallbackPipeline::new(
            Arc::new(DownLlm),
            Arc::new(NullExecutor),
            100,
            5000,
        );
        let err = pipeline.execute(&query("统计学生"), &view()).await.unwrap_err();
        assert!(matches!(err, DispatchError::UpstreamUnavailable(_)));
    }
}
