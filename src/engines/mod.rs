pub mod agents;
pub mod autonomy;
pub mod execution;
pub mod llm;
pub mod planning;
pub mod recorder;
pub mod skill_registry;

use crate::database::{
    DatabaseConfig, DatabaseManager, PlanStoreInterface, SqlitePlanStore,
};
use crate::errors::OrchestratorResult;
use agents::AgentSelector;
use autonomy::{AutonomyInterface, DatabaseAutonomyService};
use execution::ExecutionEngine;
use llm::{LLMHandler, LLMHandlerInterface};
use planning::PlanningEngine;
use recorder::OutcomeRecorder;
use skill_registry::{SkillExecutorInterface, SkillRegistryInterface};
use std::sync::Arc;

/// Container wiring the orchestrator's engines around one database and one
/// set of collaborator implementations. Built once at startup and shared.
pub struct OrchestratorEngines {
    pub database: Arc<DatabaseManager>,
    pub store: Arc<dyn PlanStoreInterface>,
    pub autonomy: Arc<dyn AutonomyInterface>,
    pub llm: Arc<LLMHandler>,
    pub planning: Arc<PlanningEngine>,
    pub execution: Arc<ExecutionEngine>,
    pub recorder: Arc<OutcomeRecorder>,
    pub agents: Arc<AgentSelector>,
}

impl OrchestratorEngines {
    /// Open the database, run migrations, and wire every engine against the
    /// provided skill registry, skill executor, and LLM handler.
    pub async fn new(
        config: &DatabaseConfig,
        llm: Arc<LLMHandler>,
        registry: Arc<dyn SkillRegistryInterface>,
        skill_executor: Arc<dyn SkillExecutorInterface>,
    ) -> OrchestratorResult<Self> {
        let database = Arc::new(DatabaseManager::connect(config).await?);
        let store: Arc<dyn PlanStoreInterface> = Arc::new(SqlitePlanStore::new(database.clone()));
        let autonomy: Arc<dyn AutonomyInterface> =
            Arc::new(DatabaseAutonomyService::new(database.clone()));

        let llm_interface: Arc<dyn LLMHandlerInterface> = llm.clone();
        let planning = Arc::new(PlanningEngine::new(
            llm_interface,
            registry,
            store.clone(),
        ));
        let execution = Arc::new(ExecutionEngine::new(
            skill_executor,
            autonomy.clone(),
            store.clone(),
        ));
        let recorder = Arc::new(OutcomeRecorder::new(store.clone(), autonomy.clone()));
        let agents = Arc::new(AgentSelector::new(autonomy.clone()));

        tracing::info!("orchestrator engines initialized");
        Ok(Self {
            database,
            store,
            autonomy,
            llm,
            planning,
            execution,
            recorder,
            agents,
        })
    }

    pub async fn shutdown(&self) {
        self.database.shutdown().await;
    }
}
