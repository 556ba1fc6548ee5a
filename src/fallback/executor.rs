// Read-only statement execution
// Every tier funnels its statements through this trait, so there is exactly
// one audited path between validated plans and the database.

//! # Read-Only Executor
//!
//! [`ReadOnlyExecutor`] is the seam between routing logic and storage. The
//! production implementation wraps a Postgres pool and enforces the plan's
//! bounds at the session level (`READ ONLY` transaction, `statement_timeout`)
//! in addition to the caller-side timeout, so even a validator miss cannot
//! write or run unbounded. Tests substitute deterministic fakes.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use sqlx::postgres::PgRow;
use sqlx::{Column, PgPool, Row, TypeInfo};
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::ExecutionPlan;
use crate::{DispatchError, Result};

/// Executes validated plans against a read-only data source.
#[async_trait]
pub trait ReadOnlyExecutor: Send + Sync {
    /// Run the plan and return rows as JSON objects.
    async fn execute(&self, plan: &ExecutionPlan) -> Result<Vec<Value>>;
}

/// Postgres-backed executor. All statements run inside a `READ ONLY`
/// transaction with a per-statement timeout matching the plan.
pub struct PostgresExecutor {
    pool: PgPool,
}

impl PostgresExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| DispatchError::Configuration(format!("database connection failed: {}", e)))?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl ReadOnlyExecutor for PostgresExecutor {
    async fn execute(&self, plan: &ExecutionPlan) -> Result<Vec<Value>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DispatchError::ExecutionFailed(e.to_string()))?;

        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| DispatchError::ExecutionFailed(e.to_string()))?;
        // SET LOCAL does not accept bind parameters; timeout_ms is a u64
        sqlx::query(&format!("SET LOCAL statement_timeout = {}", plan.timeout_ms))
            .execute(&mut *tx)
            .await
            .map_err(|e| DispatchError::ExecutionFailed(e.to_string()))?;

        let fetch = sqlx::query(&plan.statement).fetch_all(&mut *tx);
        let rows = match tokio::time::timeout(Duration::from_millis(plan.timeout_ms), fetch).await {
            Err(_) => {
                warn!(timeout_ms = plan.timeout_ms, "statement exceeded caller timeout");
                return Err(DispatchError::ExecutionTimeout {
                    timeout_ms: plan.timeout_ms,
                });
            }
            Ok(Err(e)) => {
                let message = e.to_string();
                if message.contains("statement timeout") || message.contains("canceling statement")
                {
                    return Err(DispatchError::ExecutionTimeout {
                        timeout_ms: plan.timeout_ms,
                    });
                }
                return Err(DispatchError::ExecutionFailed(message));
            }
            Ok(Ok(rows)) => rows,
        };

        tx.commit()
            .await
            .map_err(|e| DispatchError::ExecutionFailed(e.to_string()))?;

        debug!(rows = rows.len(), "statement executed");
        let cap = plan.max_rows as usize;
        Ok(rows.iter().take(cap).map(row_to_json).collect())
    }
}

/// Convert one Postgres row into a JSON object, keyed by column name.
fn row_to_json(row: &PgRow) -> Value {
    let mut object = Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = match column.type_info().name() {
            "INT2" => row
                .try_get::<Option<i16>, _>(idx)
                .map(|v| json!(v))
                .unwrap_or(Value::Null),
            "INT4" => row
                .try_get::<Option<i32>, _>(idx)
                .map(|v| json!(v))
                .unwrap_or(Value::Null),
            "INT8" => row
                .try_get::<Option<i64>, _>(idx)
                .map(|v| json!(v))
                .unwrap_or(Value::Null),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(idx)
                .map(|v| json!(v))
                .unwrap_or(Value::Null),
            "FLOAT8" => row
                .try_get::<Option<f64>, _>(idx)
                .map(|v| json!(v))
                .unwrap_or(Value::Null),
            "BOOL" => row
                .try_get::<Option<bool>, _>(idx)
                .map(|v| json!(v))
                .unwrap_or(Value::Null),
            "DATE" => row
                .try_get::<Option<chrono::NaiveDate>, _>(idx)
                .map(|v| json!(v.map(|d| d.to_string())))
                .unwrap_or(Value::Null),
            "TIMESTAMP" => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(idx)
                .map(|v| json!(v.map(|t| t.to_string())))
                .unwrap_or(Value::Null),
            "TIMESTAMPTZ" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)
                .map(|v| json!(v.map(|t| t.to_rfc3339())))
                .unwrap_or(Value::Null),
            "UUID" => row
                .try_get::<Option<uuid::Uuid>, _>(idx)
                .map(|v| json!(v.map(|u| u.to_string())))
                .unwrap_or(Value::Null),
            _ => row
                .try_get::<Option<String>, _>(idx)
                .map(|v| json!(v))
                .unwrap_or(Value::Null),
        };
        object.insert(column.name().to_string(), value);
    }
    Value::Object(object)
}

/// Executor for deployments with no database configured. Every plan fails
/// with an explicit error so misconfiguration is visible, not silent.
#[derive(Debug, Default)]
pub struct NullExecutor;

#[async_trait]
impl ReadOnlyExecutor for NullExecutor {
    async fn execute(&self, _plan: &ExecutionPlan) -> Result<Vec<Value>> {
        Err(DispatchError::ExecutionFailed(
            "no storage backend configured".to_string(),
        ))
    }
}
