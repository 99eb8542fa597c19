// Schema migrations for the orchestrator database.

use crate::errors::{ErrorCategory, ErrorCode, ErrorSeverity, OrchestratorError, OrchestratorResult};

pub async fn run_migrations(pool: &sqlx::SqlitePool) -> OrchestratorResult<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS execution_plans (
            plan_id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            task_description TEXT NOT NULL,
            plan_json TEXT NOT NULL,
            risk_level TEXT NOT NULL,
            approval_required INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS working_memory (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            plan_id TEXT NOT NULL,
            step_number INTEGER NOT NULL,
            skill_id TEXT NOT NULL,
            status TEXT NOT NULL,
            entry_json TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_working_memory_plan
            ON working_memory (plan_id, id)
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS trust_history (
            user_id TEXT NOT NULL,
            skill_id TEXT NOT NULL,
            successful_executions INTEGER NOT NULL DEFAULT 0,
            failed_executions INTEGER NOT NULL DEFAULT 0,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (user_id, skill_id)
        )
        "#,
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await.map_err(|e| {
            OrchestratorError::new(
                ErrorCode::DatabaseError,
                ErrorCategory::Storage,
                ErrorSeverity::Critical,
                &format!("migration failed: {}", e),
            )
        })?;
    }

    tracing::debug!("orchestrator schema migrations applied");
    Ok(())
}
