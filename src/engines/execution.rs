use crate::database::PlanStoreInterface;
use crate::engines::autonomy::AutonomyInterface;
use crate::engines::skill_registry::SkillExecutorInterface;
use crate::types::{
    ExecutionPlan, ExecutionStep, PlanResult, PlanStatus, StepStatus, WorkingMemoryEntry,
};
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// Step progress notifications: (step_number, status, message).
pub type ProgressCallback = dyn Fn(u32, StepStatus, &str) + Send + Sync;

/// Terminal result of running (or gating) one step: the working-memory entry
/// plus the bookkeeping written back onto the step's plan row.
struct StepOutcome {
    entry: WorkingMemoryEntry,
    output_data: Option<serde_json::Value>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl StepOutcome {
    fn skipped(entry: WorkingMemoryEntry) -> Self {
        Self {
            entry,
            output_data: None,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Walks a plan's parallel groups in order, runs each wave's executable steps
/// concurrently, and folds every outcome into an append-only working-memory
/// log. Step failures never escape as errors; they become failed entries.
pub struct ExecutionEngine {
    executor: Arc<dyn SkillExecutorInterface>,
    autonomy: Arc<dyn AutonomyInterface>,
    store: Arc<dyn PlanStoreInterface>,
}

impl ExecutionEngine {
    pub fn new(
        executor: Arc<dyn SkillExecutorInterface>,
        autonomy: Arc<dyn AutonomyInterface>,
        store: Arc<dyn PlanStoreInterface>,
    ) -> Self {
        Self {
            executor,
            autonomy,
            store,
        }
    }

    /// Execute every group of the plan in order. Always returns a
    /// `PlanResult`; an empty plan completes immediately with zero counts.
    pub async fn execute_plan(
        &self,
        user_id: &str,
        plan: &ExecutionPlan,
        progress: Option<&ProgressCallback>,
    ) -> PlanResult {
        let started = Instant::now();
        let step_index: HashMap<u32, &ExecutionStep> =
            plan.steps.iter().map(|s| (s.step_number, s)).collect();

        // Working copy of the steps; terminal statuses, outputs and
        // timestamps are written here and persisted for auditability.
        let mut bookkeeping = plan.steps.clone();
        let slot: HashMap<u32, usize> = bookkeeping
            .iter()
            .enumerate()
            .map(|(i, s)| (s.step_number, i))
            .collect();

        let mut completed: HashSet<u32> = HashSet::new();
        let mut failed: HashSet<u32> = HashSet::new();
        let mut handled: HashSet<u32> = HashSet::new();
        let mut skipped: u32 = 0;
        let mut working_memory: Vec<WorkingMemoryEntry> = Vec::new();

        for group in &plan.parallel_groups {
            // Each concurrent step sees the log as of the start of its wave.
            let snapshot = render_working_memory(&working_memory);
            let mut wave = FuturesUnordered::new();

            for &number in group {
                let Some(step) = step_index.get(&number).copied() else {
                    tracing::warn!(step = number, plan_id = %plan.plan_id, "group references unknown step");
                    continue;
                };
                if !handled.insert(number) {
                    continue;
                }

                // Failed-dependency skip takes precedence over the
                // unresolved-dependency check.
                if depends_on_failed(step, &failed) {
                    let entry = WorkingMemoryEntry::skipped(
                        number,
                        &step.skill_id,
                        &format!(
                            "Skipped skill {}: a dependency failed",
                            step.skill_id
                        ),
                    );
                    notify(progress, number, StepStatus::Skipped, &entry.summary);
                    self.persist_entry(plan, &entry).await;
                    if let Some(&i) = slot.get(&number) {
                        bookkeeping[i].status = StepStatus::Skipped;
                    }
                    skipped += 1;
                    working_memory.push(entry);
                    continue;
                }

                if !can_execute(step, &completed) {
                    let entry = WorkingMemoryEntry::skipped(
                        number,
                        &step.skill_id,
                        &format!(
                            "Skipped skill {}: dependencies not yet satisfied",
                            step.skill_id
                        ),
                    );
                    notify(progress, number, StepStatus::Skipped, &entry.summary);
                    self.persist_entry(plan, &entry).await;
                    if let Some(&i) = slot.get(&number) {
                        bookkeeping[i].status = StepStatus::Skipped;
                    }
                    skipped += 1;
                    working_memory.push(entry);
                    continue;
                }

                wave.push(self.execute_step(user_id, step, plan, &snapshot, progress));
            }

            // Fan-in barrier: the whole wave resolves before the next group
            // starts. Entries land in completion order.
            while let Some(outcome) = wave.next().await {
                let entry = outcome.entry;
                match entry.status {
                    StepStatus::Completed => {
                        completed.insert(entry.step_number);
                    }
                    StepStatus::Failed => {
                        failed.insert(entry.step_number);
                    }
                    StepStatus::Skipped => skipped += 1,
                    _ => {}
                }
                if let Some(&i) = slot.get(&entry.step_number) {
                    let record = &mut bookkeeping[i];
                    record.status = entry.status;
                    record.output_data = outcome.output_data;
                    record.started_at = outcome.started_at;
                    record.completed_at = outcome.completed_at;
                }
                self.persist_entry(plan, &entry).await;
                working_memory.push(entry);
            }
        }

        // Write the terminal statuses, outputs and timestamps back onto the
        // persisted plan row. Best effort, like the working-memory appends.
        let audited = ExecutionPlan {
            steps: bookkeeping,
            ..plan.clone()
        };
        if let Err(e) = self.store.save_plan(user_id, &audited).await {
            tracing::warn!(plan_id = %plan.plan_id, error = %e, "failed to persist step bookkeeping");
        }

        let steps_completed = completed.len() as u32;
        let steps_failed = failed.len() as u32;
        let status = if steps_failed == 0 {
            PlanStatus::Completed
        } else if steps_completed == 0 {
            PlanStatus::Failed
        } else {
            PlanStatus::Partial
        };

        tracing::info!(
            plan_id = %plan.plan_id,
            %status,
            steps_completed,
            steps_failed,
            steps_skipped = skipped,
            "plan execution finished"
        );

        PlanResult {
            plan_id: plan.plan_id,
            status,
            steps_completed,
            steps_failed,
            steps_skipped: skipped,
            total_execution_ms: started.elapsed().as_millis() as u64,
            working_memory,
        }
    }

    /// Run one step to a terminal entry. Consults the approval gate first;
    /// a gated step is skipped without ever touching the executor. Executor
    /// errors are converted into failed entries, never propagated.
    async fn execute_step(
        &self,
        user_id: &str,
        step: &ExecutionStep,
        plan: &ExecutionPlan,
        working_memory_snapshot: &str,
        progress: Option<&ProgressCallback>,
    ) -> StepOutcome {
        let number = step.step_number;
        notify(
            progress,
            number,
            StepStatus::Running,
            &format!("Running skill {}", step.skill_id),
        );

        let approval = match self
            .autonomy
            .should_request_approval(user_id, step, plan.risk_level)
            .await
        {
            Ok(approval) => approval,
            Err(e) => {
                // Fail closed: an unreachable autonomy service gates the step.
                tracing::warn!(step = number, error = %e, "approval check failed, gating step");
                true
            }
        };

        if approval {
            let entry = WorkingMemoryEntry::skipped(
                number,
                &step.skill_id,
                &format!("Skill {} requires approval before it can run", step.skill_id),
            );
            notify(progress, number, StepStatus::Skipped, &entry.summary);
            return StepOutcome::skipped(entry);
        }

        let started_at = Utc::now();

        let mut context: HashMap<String, serde_json::Value> = HashMap::new();
        context.insert(
            "working_memory".to_string(),
            serde_json::Value::String(working_memory_snapshot.to_string()),
        );
        context.insert(
            "task".to_string(),
            serde_json::Value::String(plan.task_description.clone()),
        );
        context.insert("step_number".to_string(), serde_json::json!(number));

        let (entry, output_data) = match self
            .executor
            .execute(&step.skill_id, &step.skill_path, &step.input_data, &context)
            .await
        {
            Ok(invocation) if invocation.success => {
                self.record_outcome(user_id, &step.skill_id, true).await;
                let output = invocation.result.clone();
                (entry_from_success(step, invocation.result), output)
            }
            Ok(invocation) => {
                self.record_outcome(user_id, &step.skill_id, false).await;
                let entry = WorkingMemoryEntry {
                    step_number: number,
                    skill_id: step.skill_id.clone(),
                    status: StepStatus::Failed,
                    summary: format!(
                        "Skill {} failed: {}",
                        step.skill_id,
                        invocation.error.as_deref().unwrap_or("unknown error")
                    ),
                    artifacts: Vec::new(),
                    extracted_facts: HashMap::new(),
                    next_step_hints: Vec::new(),
                };
                (entry, None)
            }
            Err(e) => {
                self.record_outcome(user_id, &step.skill_id, false).await;
                let entry = WorkingMemoryEntry {
                    step_number: number,
                    skill_id: step.skill_id.clone(),
                    status: StepStatus::Failed,
                    summary: format!("Skill {} raised an error: {}", step.skill_id, e),
                    artifacts: Vec::new(),
                    extracted_facts: HashMap::new(),
                    next_step_hints: Vec::new(),
                };
                (entry, None)
            }
        };

        notify(progress, number, entry.status, &entry.summary);
        StepOutcome {
            entry,
            output_data,
            started_at: Some(started_at),
            completed_at: Some(Utc::now()),
        }
    }

    async fn record_outcome(&self, user_id: &str, skill_id: &str, success: bool) {
        if let Err(e) = self
            .autonomy
            .record_execution_outcome(user_id, skill_id, success)
            .await
        {
            tracing::warn!(skill_id, error = %e, "failed to record execution outcome");
        }
    }

    async fn persist_entry(&self, plan: &ExecutionPlan, entry: &WorkingMemoryEntry) {
        if let Err(e) = self.store.append_working_memory(plan.plan_id, entry).await {
            tracing::warn!(
                plan_id = %plan.plan_id,
                step = entry.step_number,
                error = %e,
                "failed to persist working-memory entry"
            );
        }
    }
}

fn can_execute(step: &ExecutionStep, completed: &HashSet<u32>) -> bool {
    step.depends_on.iter().all(|dep| completed.contains(dep))
}

fn depends_on_failed(step: &ExecutionStep, failed: &HashSet<u32>) -> bool {
    step.depends_on.iter().any(|dep| failed.contains(dep))
}

fn notify(progress: Option<&ProgressCallback>, step_number: u32, status: StepStatus, message: &str) {
    if let Some(callback) = progress {
        callback(step_number, status, message);
    }
}

fn entry_from_success(step: &ExecutionStep, result: Option<serde_json::Value>) -> WorkingMemoryEntry {
    let summary = result
        .as_ref()
        .and_then(|r| r.get("summary"))
        .and_then(|s| s.as_str())
        .map(String::from)
        .unwrap_or_else(|| format!("Skill {} completed", step.skill_id));

    let artifacts = result
        .as_ref()
        .and_then(|r| r.get("artifacts"))
        .and_then(|a| a.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    let extracted_facts = result
        .as_ref()
        .and_then(|r| r.get("extracted_facts"))
        .and_then(|f| f.as_object())
        .map(|facts| facts.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();

    let next_step_hints = result
        .as_ref()
        .and_then(|r| r.get("next_step_hints"))
        .and_then(|h| h.as_array())
        .map(|hints| {
            hints
                .iter()
                .filter_map(|h| h.as_str())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    WorkingMemoryEntry {
        step_number: step.step_number,
        skill_id: step.skill_id.clone(),
        status: StepStatus::Completed,
        summary,
        artifacts,
        extracted_facts,
        next_step_hints,
    }
}

/// Human-readable rendering of the log so far, handed to downstream skills
/// through the execution context.
fn render_working_memory(entries: &[WorkingMemoryEntry]) -> String {
    let mut rendered = String::new();
    for entry in entries {
        rendered.push_str(&format!(
            "step {} [{}] {}: {}\n",
            entry.step_number, entry.skill_id, entry.status, entry.summary
        ));
        for (key, value) in &entry.extracted_facts {
            rendered.push_str(&format!("  fact {}: {}\n", key, value));
        }
        for hint in &entry.next_step_hints {
            rendered.push_str(&format!("  hint: {}\n", hint));
        }
    }
    rendered
}
