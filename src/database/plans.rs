// Plan and working-memory row operations.

use crate::database::{DatabaseManager, PlanRecord, PlanStoreInterface};
use crate::errors::{ErrorCategory, ErrorCode, ErrorSeverity, OrchestratorError, OrchestratorResult};
use crate::types::{ExecutionPlan, WorkingMemoryEntry};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;
use uuid::Uuid;

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// SQLite-backed plan store. Plans and working-memory entries are stored as
/// JSON text columns alongside the queryable key fields.
pub struct SqlitePlanStore {
    db: Arc<DatabaseManager>,
}

impl SqlitePlanStore {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PlanStoreInterface for SqlitePlanStore {
    async fn save_plan(&self, user_id: &str, plan: &ExecutionPlan) -> OrchestratorResult<()> {
        let plan_json = serde_json::to_string(plan)?;

        sqlx::query(
            r#"
            INSERT INTO execution_plans (
                plan_id, user_id, task_description, plan_json,
                risk_level, approval_required, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(plan_id) DO UPDATE SET
                plan_json = excluded.plan_json,
                risk_level = excluded.risk_level,
                approval_required = excluded.approval_required
            "#,
        )
        .bind(plan.plan_id.to_string())
        .bind(user_id)
        .bind(&plan.task_description)
        .bind(plan_json)
        .bind(plan.risk_level.to_string())
        .bind(plan.approval_required as i64)
        .bind(unix_now())
        .execute(self.db.pool())
        .await
        .map_err(|e| {
            OrchestratorError::new(
                ErrorCode::DatabaseError,
                ErrorCategory::Storage,
                ErrorSeverity::High,
                &format!("failed to save plan: {}", e),
            )
        })?;

        tracing::debug!(plan_id = %plan.plan_id, user_id, "plan persisted");
        Ok(())
    }

    async fn get_plan(&self, plan_id: Uuid) -> OrchestratorResult<Option<PlanRecord>> {
        let row = sqlx::query(
            "SELECT user_id, plan_json FROM execution_plans WHERE plan_id = ?",
        )
        .bind(plan_id.to_string())
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| {
            OrchestratorError::new(
                ErrorCode::DatabaseError,
                ErrorCategory::Storage,
                ErrorSeverity::High,
                &format!("failed to read plan: {}", e),
            )
        })?;

        match row {
            Some(row) => {
                let user_id: String = row.try_get("user_id").map_err(|e| {
                    OrchestratorError::database_error(&format!("bad plan row: {}", e))
                })?;
                let plan_json: String = row.try_get("plan_json").map_err(|e| {
                    OrchestratorError::database_error(&format!("bad plan row: {}", e))
                })?;
                let plan: ExecutionPlan = serde_json::from_str(&plan_json)?;
                Ok(Some(PlanRecord { user_id, plan }))
            }
            None => Ok(None),
        }
    }

    async fn append_working_memory(
        &self,
        plan_id: Uuid,
        entry: &WorkingMemoryEntry,
    ) -> OrchestratorResult<()> {
        let entry_json = serde_json::to_string(entry)?;

        sqlx::query(
            r#"
            INSERT INTO working_memory (
                plan_id, step_number, skill_id, status, entry_json, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(plan_id.to_string())
        .bind(entry.step_number as i64)
        .bind(&entry.skill_id)
        .bind(entry.status.to_string())
        .bind(entry_json)
        .bind(unix_now())
        .execute(self.db.pool())
        .await
        .map_err(|e| {
            OrchestratorError::new(
                ErrorCode::DatabaseError,
                ErrorCategory::Storage,
                ErrorSeverity::High,
                &format!("failed to append working memory: {}", e),
            )
        })?;

        Ok(())
    }

    async fn list_working_memory(&self, plan_id: Uuid) -> OrchestratorResult<Vec<WorkingMemoryEntry>> {
        let rows = sqlx::query(
            "SELECT entry_json FROM working_memory WHERE plan_id = ? ORDER BY id ASC",
        )
        .bind(plan_id.to_string())
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| {
            OrchestratorError::new(
                ErrorCode::DatabaseError,
                ErrorCategory::Storage,
                ErrorSeverity::High,
                &format!("failed to list working memory: {}", e),
            )
        })?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let entry_json: String = row.try_get("entry_json").map_err(|e| {
                OrchestratorError::database_error(&format!("bad working-memory row: {}", e))
            })?;
            entries.push(serde_json::from_str(&entry_json)?);
        }
        Ok(entries)
    }
}
