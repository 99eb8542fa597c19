// Trust-history row operations, keyed by (user_id, skill_id).

use crate::errors::{ErrorCategory, ErrorCode, ErrorSeverity, OrchestratorError, OrchestratorResult};
use crate::types::TrustHistory;
use sqlx::Row;

pub struct TrustOps;

impl TrustOps {
    /// Fold one execution outcome into the trust counters.
    pub async fn record_outcome(
        pool: &sqlx::SqlitePool,
        user_id: &str,
        skill_id: &str,
        success: bool,
    ) -> OrchestratorResult<()> {
        let (success_delta, failure_delta) = if success { (1i64, 0i64) } else { (0, 1) };

        sqlx::query(
            r#"
            INSERT INTO trust_history (
                user_id, skill_id, successful_executions, failed_executions, updated_at
            ) VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id, skill_id) DO UPDATE SET
                successful_executions = successful_executions + excluded.successful_executions,
                failed_executions = failed_executions + excluded.failed_executions,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(skill_id)
        .bind(success_delta)
        .bind(failure_delta)
        .bind(chrono::Utc::now().timestamp())
        .execute(pool)
        .await
        .map_err(|e| {
            OrchestratorError::new(
                ErrorCode::DatabaseError,
                ErrorCategory::Storage,
                ErrorSeverity::High,
                &format!("failed to record execution outcome: {}", e),
            )
        })?;

        Ok(())
    }

    pub async fn get_history(
        pool: &sqlx::SqlitePool,
        user_id: &str,
        skill_id: &str,
    ) -> OrchestratorResult<Option<TrustHistory>> {
        let row = sqlx::query(
            r#"
            SELECT successful_executions, failed_executions
            FROM trust_history WHERE user_id = ? AND skill_id = ?
            "#,
        )
        .bind(user_id)
        .bind(skill_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            OrchestratorError::new(
                ErrorCode::DatabaseError,
                ErrorCategory::Storage,
                ErrorSeverity::High,
                &format!("failed to read trust history: {}", e),
            )
        })?;

        match row {
            Some(row) => {
                let successful: i64 = row.try_get("successful_executions").map_err(|e| {
                    OrchestratorError::database_error(&format!("bad trust row: {}", e))
                })?;
                let failed: i64 = row.try_get("failed_executions").map_err(|e| {
                    OrchestratorError::database_error(&format!("bad trust row: {}", e))
                })?;
                Ok(Some(TrustHistory {
                    successful_executions: successful as u32,
                    failed_executions: failed as u32,
                }))
            }
            None => Ok(None),
        }
    }
}
