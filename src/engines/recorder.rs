use crate::database::PlanStoreInterface;
use crate::engines::autonomy::AutonomyInterface;
use crate::types::StepStatus;
use std::sync::Arc;
use uuid::Uuid;

/// Best-effort reconciliation of trust history from the persisted record of a
/// plan run. Lets trust counters be rebuilt after a crash mid-plan, so every
/// lookup miss here is logged and swallowed rather than surfaced.
pub struct OutcomeRecorder {
    store: Arc<dyn PlanStoreInterface>,
    autonomy: Arc<dyn AutonomyInterface>,
}

impl OutcomeRecorder {
    pub fn new(store: Arc<dyn PlanStoreInterface>, autonomy: Arc<dyn AutonomyInterface>) -> Self {
        Self { store, autonomy }
    }

    /// Re-read the persisted plan and its working-memory rows and replay each
    /// row's outcome into the trust store, in row order. A completed row
    /// counts as a success; failed and skipped rows count as failures.
    pub async fn record_outcome(&self, plan_id: Uuid) {
        let record = match self.store.get_plan(plan_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::debug!(%plan_id, "no persisted plan to reconcile");
                return;
            }
            Err(e) => {
                tracing::warn!(%plan_id, error = %e, "failed to read plan for reconciliation");
                return;
            }
        };

        let entries = match self.store.list_working_memory(plan_id).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(%plan_id, error = %e, "failed to read working memory for reconciliation");
                return;
            }
        };

        for entry in &entries {
            if entry.skill_id.is_empty() {
                continue;
            }
            let success = entry.status == StepStatus::Completed;
            if let Err(e) = self
                .autonomy
                .record_execution_outcome(&record.user_id, &entry.skill_id, success)
                .await
            {
                tracing::warn!(
                    %plan_id,
                    skill_id = %entry.skill_id,
                    error = %e,
                    "failed to replay execution outcome"
                );
            }
        }

        tracing::debug!(%plan_id, rows = entries.len(), "trust history reconciled");
    }
}
