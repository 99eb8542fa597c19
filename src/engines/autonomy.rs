use crate::database::trust::TrustOps;
use crate::database::DatabaseManager;
use crate::errors::OrchestratorResult;
use crate::types::{ExecutionStep, RiskLevel, TrustHistory};
use async_trait::async_trait;
use std::sync::Arc;

/// Approval gating and trust-history accounting for skill executions.
#[async_trait]
pub trait AutonomyInterface: Send + Sync {
    /// Whether this step must wait for human/policy approval instead of
    /// running. A `true` answer is a deliberate gate, not a failure.
    async fn should_request_approval(
        &self,
        user_id: &str,
        step: &ExecutionStep,
        plan_risk: RiskLevel,
    ) -> OrchestratorResult<bool>;

    async fn record_execution_outcome(
        &self,
        user_id: &str,
        skill_id: &str,
        success: bool,
    ) -> OrchestratorResult<()>;

    async fn get_trust_history(
        &self,
        user_id: &str,
        skill_id: &str,
    ) -> OrchestratorResult<Option<TrustHistory>>;
}

/// Tuning knobs for the default approval policy.
#[derive(Debug, Clone)]
pub struct AutonomyConfig {
    /// Executions a skill must have before it can run unattended at high risk.
    pub min_trusted_executions: u32,
    /// Success rate required to skip approval at high risk.
    pub min_success_rate: f64,
    /// Plans at or above this risk level are subject to the trust check.
    pub approval_risk_threshold: RiskLevel,
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            min_trusted_executions: 3,
            min_success_rate: 0.8,
            approval_risk_threshold: RiskLevel::High,
        }
    }
}

/// Database-backed autonomy service. Low- and medium-risk plans run
/// unattended; riskier plans require an established trust record per skill.
pub struct DatabaseAutonomyService {
    db: Arc<DatabaseManager>,
    config: AutonomyConfig,
}

impl DatabaseAutonomyService {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self {
            db,
            config: AutonomyConfig::default(),
        }
    }

    pub fn with_config(db: Arc<DatabaseManager>, config: AutonomyConfig) -> Self {
        Self { db, config }
    }
}

#[async_trait]
impl AutonomyInterface for DatabaseAutonomyService {
    async fn should_request_approval(
        &self,
        user_id: &str,
        step: &ExecutionStep,
        plan_risk: RiskLevel,
    ) -> OrchestratorResult<bool> {
        if plan_risk < self.config.approval_risk_threshold {
            return Ok(false);
        }

        let history = TrustOps::get_history(self.db.pool(), user_id, &step.skill_id).await?;
        let approval = match history {
            Some(history) => {
                history.total() < self.config.min_trusted_executions
                    || history.success_rate() < self.config.min_success_rate
            }
            // Never-seen skill at high risk: gate it.
            None => true,
        };

        if approval {
            tracing::info!(
                user_id,
                skill_id = %step.skill_id,
                risk = %plan_risk,
                "approval required for step"
            );
        }
        Ok(approval)
    }

    async fn record_execution_outcome(
        &self,
        user_id: &str,
        skill_id: &str,
        success: bool,
    ) -> OrchestratorResult<()> {
        TrustOps::record_outcome(self.db.pool(), user_id, skill_id, success).await
    }

    async fn get_trust_history(
        &self,
        user_id: &str,
        skill_id: &str,
    ) -> OrchestratorResult<Option<TrustHistory>> {
        TrustOps::get_history(self.db.pool(), user_id, skill_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExecutionStep;

    async fn service() -> DatabaseAutonomyService {
        let db = DatabaseManager::in_memory().await.unwrap();
        DatabaseAutonomyService::new(Arc::new(db))
    }

    #[tokio::test]
    async fn low_risk_plans_run_unattended() {
        let service = service().await;
        let step = ExecutionStep::new(1, "skill", "email.draft");
        let approval = service
            .should_request_approval("u", &step, RiskLevel::Medium)
            .await
            .unwrap();
        assert!(!approval);
    }

    #[tokio::test]
    async fn unknown_skill_is_gated_at_high_risk() {
        let service = service().await;
        let step = ExecutionStep::new(1, "skill", "crm.delete");
        let approval = service
            .should_request_approval("u", &step, RiskLevel::Critical)
            .await
            .unwrap();
        assert!(approval);
    }

    #[tokio::test]
    async fn trusted_skill_skips_approval_at_high_risk() {
        let service = service().await;
        for _ in 0..5 {
            service.record_execution_outcome("u", "skill", true).await.unwrap();
        }
        let step = ExecutionStep::new(1, "skill", "crm.update");
        let approval = service
            .should_request_approval("u", &step, RiskLevel::High)
            .await
            .unwrap();
        assert!(!approval);
    }

    #[tokio::test]
    async fn unreliable_skill_stays_gated() {
        let service = service().await;
        for _ in 0..3 {
            service.record_execution_outcome("u", "skill", false).await.unwrap();
        }
        let step = ExecutionStep::new(1, "skill", "crm.update");
        let approval = service
            .should_request_approval("u", &step, RiskLevel::High)
            .await
            .unwrap();
        assert!(approval);
    }
}
