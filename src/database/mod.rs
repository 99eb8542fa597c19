// Database module for the orchestrator.
// SQLite-backed persistence for plan rows, working-memory rows and
// trust-history rows, deployed user-space under ~/.aria.

use crate::errors::{ErrorCategory, ErrorCode, ErrorSeverity, OrchestratorError, OrchestratorResult};
use crate::types::{ExecutionPlan, WorkingMemoryEntry};
use async_trait::async_trait;
use std::path::PathBuf;
use uuid::Uuid;

pub mod migrations;
pub mod plans;
pub mod trust;

pub use plans::SqlitePlanStore;

/// Database configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub db_path: PathBuf,
    pub enable_wal_mode: bool,
    pub connection_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        Self {
            db_path: PathBuf::from(home).join(".aria").join("orchestrator.db"),
            enable_wal_mode: true,
            connection_timeout_seconds: 30,
        }
    }
}

/// Owns the SQLite pool and runs migrations on connect.
pub struct DatabaseManager {
    pool: sqlx::SqlitePool,
}

impl DatabaseManager {
    /// Open (creating if missing) the orchestrator database.
    pub async fn connect(config: &DatabaseConfig) -> OrchestratorResult<Self> {
        if let Some(parent) = config.db_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                OrchestratorError::new(
                    ErrorCode::DatabaseError,
                    ErrorCategory::Storage,
                    ErrorSeverity::Critical,
                    &format!("failed to create database directory: {}", e),
                )
            })?;
        }

        let mut options = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(&config.db_path)
            .create_if_missing(true)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(
                config.connection_timeout_seconds,
            ));

        if config.enable_wal_mode {
            options = options.journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);
        }

        let pool = sqlx::SqlitePool::connect_with(options).await.map_err(|e| {
            OrchestratorError::new(
                ErrorCode::DatabaseError,
                ErrorCategory::Storage,
                ErrorSeverity::Critical,
                &format!("failed to create database pool: {}", e),
            )
        })?;

        migrations::run_migrations(&pool).await?;
        tracing::info!(path = %config.db_path.display(), "orchestrator database ready");

        Ok(Self { pool })
    }

    /// In-memory database, used by tests. A single connection keeps every
    /// query on the same memory instance.
    pub async fn in_memory() -> OrchestratorResult<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                OrchestratorError::new(
                    ErrorCode::DatabaseError,
                    ErrorCategory::Storage,
                    ErrorSeverity::Critical,
                    &format!("failed to open in-memory database: {}", e),
                )
            })?;

        migrations::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        &self.pool
    }

    pub async fn shutdown(&self) {
        self.pool.close().await;
        tracing::info!("orchestrator database closed");
    }
}

/// A persisted plan row together with the user it was planned for.
#[derive(Debug, Clone)]
pub struct PlanRecord {
    pub user_id: String,
    pub plan: ExecutionPlan,
}

/// Row-level persistence for plans and their working-memory logs.
#[async_trait]
pub trait PlanStoreInterface: Send + Sync {
    async fn save_plan(&self, user_id: &str, plan: &ExecutionPlan) -> OrchestratorResult<()>;

    async fn get_plan(&self, plan_id: Uuid) -> OrchestratorResult<Option<PlanRecord>>;

    /// Append one working-memory entry for a plan run. Rows are append-only,
    /// keyed by (plan_id, step_number).
    async fn append_working_memory(
        &self,
        plan_id: Uuid,
        entry: &WorkingMemoryEntry,
    ) -> OrchestratorResult<()>;

    /// All working-memory entries for a plan, in insertion order.
    async fn list_working_memory(&self, plan_id: Uuid) -> OrchestratorResult<Vec<WorkingMemoryEntry>>;
}
