/*!
# Aria Orchestrator - Skill Execution Orchestrator

This crate contains the skill execution core of the Aria assistant backend.
It turns a natural-language task into a dependency-ordered execution plan over
a pool of discoverable skills, runs the plan with partial-failure handling,
and records per-step outcomes into a working-memory log and a trust-history
store.

## Architecture

The orchestrator consists of several key components:

- **Planning Engine**: LLM-backed task decomposition into an execution DAG
- **Execution Engine**: Group-ordered plan execution with approval gating
- **Outcome Recorder**: Trust-history reconciliation from persisted plan runs
- **Agent Selector**: Affinity/trust scoring for step delegates
- **LLM Handler**: Provider registry for the reasoning call
- **Database**: SQLite persistence for plans, working memory, and trust
*/

pub mod database;
pub mod engines;
pub mod errors;
pub mod types;

// Re-export main components
pub use database::{DatabaseConfig, DatabaseManager, PlanRecord, PlanStoreInterface, SqlitePlanStore};
pub use engines::agents::{AgentProfile, AgentSelector, DEFAULT_AGENT};
pub use engines::autonomy::{AutonomyConfig, AutonomyInterface, DatabaseAutonomyService};
pub use engines::execution::{ExecutionEngine, ProgressCallback};
pub use engines::llm::{LLMHandler, LLMHandlerInterface, LLMProvider};
pub use engines::planning::PlanningEngine;
pub use engines::recorder::OutcomeRecorder;
pub use engines::skill_registry::{
    SkillExecutorInterface, SkillRegistryInterface, StaticSkillRegistry,
};
pub use engines::OrchestratorEngines;
pub use errors::{ErrorCategory, ErrorCode, ErrorSeverity, OrchestratorError, OrchestratorResult};
pub use types::{
    DataClass, ExecutionPlan, ExecutionStep, PlanResult, PlanStatus, RiskLevel, SkillInvocation,
    SkillRef, StepStatus, TaskRequest, TrustHistory, WorkingMemoryEntry,
};

/// Orchestrator version
pub const ORCHESTRATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize tracing output for binaries and integration tests embedding the
/// orchestrator. Respects `RUST_LOG`, defaulting to `info`.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
