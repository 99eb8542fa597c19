use crate::database::PlanStoreInterface;
use crate::engines::llm::types::{LLMConfig, LLMMessage, LLMRequest};
use crate::engines::llm::LLMHandlerInterface;
use crate::engines::skill_registry::SkillRegistryInterface;
use crate::errors::{ErrorCategory, ErrorCode, ErrorSeverity, OrchestratorError, OrchestratorResult};
use crate::types::{DataClass, ExecutionPlan, ExecutionStep, RiskLevel, SkillRef, StepStatus, TaskRequest};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

const PLANNER_SYSTEM_PROMPT: &str = "You are the planning engine of the ARIA assistant. \
Decompose the user's task into an execution plan over the listed skills. \
Respond with a single JSON object: {\"steps\": [{\"step_number\", \"skill_id\", \"skill_path\", \
\"depends_on\", \"input_data\", \"data_classes_accessed\"}], \"parallel_groups\", \
\"estimated_duration_ms\", \"risk_level\", \"approval_required\", \"reasoning\"}. \
Steps are numbered from 1. Do not include any text outside the JSON object.";

/// Planning engine: turns a natural-language task plus candidate skills into
/// a validated execution plan.
pub struct PlanningEngine {
    llm: Arc<dyn LLMHandlerInterface>,
    registry: Arc<dyn SkillRegistryInterface>,
    store: Arc<dyn PlanStoreInterface>,
    llm_config: LLMConfig,
}

impl PlanningEngine {
    pub fn new(
        llm: Arc<dyn LLMHandlerInterface>,
        registry: Arc<dyn SkillRegistryInterface>,
        store: Arc<dyn PlanStoreInterface>,
    ) -> Self {
        Self {
            llm,
            registry,
            store,
            llm_config: LLMConfig::default(),
        }
    }

    pub fn with_llm_config(mut self, llm_config: LLMConfig) -> Self {
        self.llm_config = llm_config;
        self
    }

    /// Build an execution plan for `task` over the given candidate skills.
    ///
    /// Failure modes are distinct: `PlanParseFailed` when the reasoning output
    /// is not JSON, `PlanMissingField` when the JSON lacks `steps`, and
    /// `PlanInvalidStep` when a step object is malformed or the DAG is
    /// inconsistent.
    pub async fn create_execution_plan(
        &self,
        task: &str,
        available_skills: &[SkillRef],
    ) -> OrchestratorResult<ExecutionPlan> {
        let skill_ids: Vec<String> = available_skills.iter().map(|s| s.id.clone()).collect();
        let summaries = self.registry.get_summaries(&skill_ids).await?;

        let request = LLMRequest {
            messages: vec![
                LLMMessage::system(PLANNER_SYSTEM_PROMPT),
                LLMMessage::user(&build_planning_prompt(task, available_skills, &summaries)),
            ],
            provider: None,
            config: self.llm_config.clone(),
        };

        let response = self.llm.complete(request).await?;
        let plan = parse_plan_response(task, &response.content)?;
        tracing::debug!(plan_id = %plan.plan_id, steps = plan.steps.len(), "execution plan built");
        Ok(plan)
    }

    /// Richer planning entry point: discovers candidate skills, derives the
    /// plan risk from the data classes the steps declare, and persists the
    /// plan before returning it.
    ///
    /// An empty search result is not an error; it yields an empty plan whose
    /// reasoning says no skills matched.
    pub async fn analyze_task(
        &self,
        task: &TaskRequest,
        user_id: &str,
    ) -> OrchestratorResult<ExecutionPlan> {
        let candidates = self.registry.search(&task.description).await?;
        if candidates.is_empty() {
            tracing::info!(user_id, "no matching skills found for task");
            return Ok(ExecutionPlan::empty(
                &task.description,
                "No matching skills were found for this task.",
            ));
        }

        let mut plan = self.create_execution_plan(&task.description, &candidates).await?;

        // Derive risk from declared data classes instead of trusting the
        // planner's self-reported level.
        let classes: Vec<DataClass> = plan
            .steps
            .iter()
            .flat_map(|s| s.data_classes.iter().copied())
            .collect();
        plan.risk_level = risk_from_data_classes(&classes);

        self.store.save_plan(user_id, &plan).await?;
        tracing::info!(
            plan_id = %plan.plan_id,
            user_id,
            risk = %plan.risk_level,
            steps = plan.steps.len(),
            "plan persisted"
        );
        Ok(plan)
    }
}

fn build_planning_prompt(
    task: &str,
    skills: &[SkillRef],
    summaries: &HashMap<String, String>,
) -> String {
    let mut prompt = format!("Task: {}\n\nAvailable skills:\n", task);
    for skill in skills {
        let summary = summaries
            .get(&skill.id)
            .map(String::as_str)
            .unwrap_or("(no summary available)");
        prompt.push_str(&format!("- {} [{}]: {}\n", skill.id, skill.skill_path, summary));
    }
    prompt
}

/// Map declared data classes to a plan risk level; the most sensitive class
/// across all steps wins. No classes means low risk.
pub fn risk_from_data_classes(classes: &[DataClass]) -> RiskLevel {
    classes
        .iter()
        .map(|c| c.risk())
        .max()
        .unwrap_or(RiskLevel::Low)
}

/// Strip a surrounding markdown code fence (``` or ```json) if present.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the fence's language tag line, then the closing fence.
    let rest = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn invalid_step(message: &str) -> OrchestratorError {
    OrchestratorError::new(
        ErrorCode::PlanInvalidStep,
        ErrorCategory::Planning,
        ErrorSeverity::Medium,
        message,
    )
}

/// Parse and validate the raw planner output into an `ExecutionPlan`.
fn parse_plan_response(task: &str, raw: &str) -> OrchestratorResult<ExecutionPlan> {
    let cleaned = strip_code_fences(raw);

    let parsed: Value = serde_json::from_str(cleaned).map_err(|e| {
        OrchestratorError::new(
            ErrorCode::PlanParseFailed,
            ErrorCategory::Planning,
            ErrorSeverity::Medium,
            &format!("could not parse plan response as JSON: {}", e),
        )
    })?;

    let steps_value = parsed.get("steps").ok_or_else(|| {
        OrchestratorError::new(
            ErrorCode::PlanMissingField,
            ErrorCategory::Planning,
            ErrorSeverity::Medium,
            "plan response is missing the required `steps` field",
        )
    })?;

    let steps_array = steps_value
        .as_array()
        .ok_or_else(|| invalid_step("`steps` is not an array"))?;

    let mut steps = Vec::with_capacity(steps_array.len());
    for raw_step in steps_array {
        let obj = raw_step
            .as_object()
            .ok_or_else(|| invalid_step("step is not an object"))?;

        let step_number = obj
            .get("step_number")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| invalid_step("step is missing `step_number`"))? as u32;

        let skill_id = obj
            .get("skill_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| invalid_step(&format!("step {} is missing `skill_id`", step_number)))?;

        let skill_path = obj.get("skill_path").and_then(|v| v.as_str()).unwrap_or("");

        let depends_on = obj
            .get("depends_on")
            .and_then(|v| v.as_array())
            .map(|deps| {
                deps.iter()
                    .filter_map(|d| d.as_u64())
                    .map(|d| d as u32)
                    .collect()
            })
            .unwrap_or_default();

        let data_classes = obj
            .get("data_classes_accessed")
            .and_then(|v| v.as_array())
            .map(|classes| {
                classes
                    .iter()
                    .filter_map(|c| c.as_str())
                    .filter_map(|c| {
                        let parsed = DataClass::parse(c);
                        if parsed.is_none() {
                            tracing::warn!(class = c, "unknown data class in plan, ignoring");
                        }
                        parsed
                    })
                    .collect()
            })
            .unwrap_or_default();

        steps.push(ExecutionStep {
            step_number,
            skill_id: skill_id.to_string(),
            skill_path: skill_path.to_string(),
            depends_on,
            status: StepStatus::Pending,
            input_data: obj.get("input_data").cloned().unwrap_or_else(|| serde_json::json!({})),
            output_data: None,
            started_at: None,
            completed_at: None,
            agent_id: obj.get("agent_id").and_then(|v| v.as_str()).map(String::from),
            data_classes,
        });
    }

    let parallel_groups = match parsed.get("parallel_groups").and_then(|v| v.as_array()) {
        Some(groups) => groups
            .iter()
            .map(|g| {
                g.as_array()
                    .map(|members| {
                        members
                            .iter()
                            .filter_map(|m| m.as_u64())
                            .map(|m| m as u32)
                            .collect()
                    })
                    .ok_or_else(|| invalid_step("parallel group is not an array"))
            })
            .collect::<OrchestratorResult<Vec<Vec<u32>>>>()?,
        // Default: one wave per step, in step-number order.
        None => {
            let mut numbers: Vec<u32> = steps.iter().map(|s| s.step_number).collect();
            numbers.sort_unstable();
            numbers.into_iter().map(|n| vec![n]).collect()
        }
    };

    validate_dag(&steps, &parallel_groups)?;

    Ok(ExecutionPlan {
        plan_id: Uuid::new_v4(),
        task_description: task.to_string(),
        steps,
        parallel_groups,
        estimated_duration_ms: parsed
            .get("estimated_duration_ms")
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
        risk_level: parsed
            .get("risk_level")
            .and_then(|v| v.as_str())
            .and_then(RiskLevel::parse)
            .unwrap_or(RiskLevel::Low),
        approval_required: parsed
            .get("approval_required")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        reasoning: parsed
            .get("reasoning")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
    })
}

/// Structural validation: unique step numbers, dependencies that resolve
/// within the plan, no self-references, no cycles, and groups that only name
/// known steps.
fn validate_dag(steps: &[ExecutionStep], parallel_groups: &[Vec<u32>]) -> OrchestratorResult<()> {
    let mut numbers = HashSet::new();
    for step in steps {
        if !numbers.insert(step.step_number) {
            return Err(invalid_step(&format!(
                "duplicate step number {}",
                step.step_number
            )));
        }
    }

    for step in steps {
        for dep in &step.depends_on {
            if *dep == step.step_number {
                return Err(invalid_step(&format!(
                    "step {} depends on itself",
                    step.step_number
                )));
            }
            if !numbers.contains(dep) {
                return Err(invalid_step(&format!(
                    "step {} depends on unknown step {}",
                    step.step_number, dep
                )));
            }
        }
    }

    for group in parallel_groups {
        for member in group {
            if !numbers.contains(member) {
                return Err(invalid_step(&format!(
                    "parallel group references unknown step {}",
                    member
                )));
            }
        }
    }

    // Groups must cover every step, or the executor would strand the
    // uncovered ones as pending.
    let covered: HashSet<u32> = parallel_groups.iter().flatten().copied().collect();
    for step in steps {
        if !covered.contains(&step.step_number) {
            return Err(invalid_step(&format!(
                "step {} is not assigned to any parallel group",
                step.step_number
            )));
        }
    }

    // Kahn's algorithm over depends_on edges.
    let mut in_degree: HashMap<u32, usize> = steps
        .iter()
        .map(|s| (s.step_number, s.depends_on.len()))
        .collect();
    let mut ready: Vec<u32> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| *n)
        .collect();
    let mut resolved = 0usize;

    while let Some(number) = ready.pop() {
        resolved += 1;
        for step in steps {
            if step.depends_on.contains(&number) {
                if let Some(degree) = in_degree.get_mut(&step.step_number) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(step.step_number);
                    }
                }
            }
        }
    }

    if resolved != steps.len() {
        return Err(invalid_step("dependency graph contains a cycle"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{PlanRecord, PlanStoreInterface};
    use crate::engines::llm::types::LLMResponse;
    use crate::engines::skill_registry::StaticSkillRegistry;
    use crate::types::WorkingMemoryEntry;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct CannedLlm {
        content: String,
    }

    #[async_trait]
    impl LLMHandlerInterface for CannedLlm {
        async fn complete(&self, _request: LLMRequest) -> OrchestratorResult<LLMResponse> {
            Ok(LLMResponse {
                content: self.content.clone(),
                model: "test".to_string(),
                provider: "test".to_string(),
                token_usage: None,
                finish_reason: "stop".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        saved: Mutex<Vec<PlanRecord>>,
    }

    #[async_trait]
    impl PlanStoreInterface for MemoryStore {
        async fn save_plan(&self, user_id: &str, plan: &ExecutionPlan) -> OrchestratorResult<()> {
            self.saved.lock().unwrap().push(PlanRecord {
                user_id: user_id.to_string(),
                plan: plan.clone(),
            });
            Ok(())
        }

        async fn get_plan(&self, _plan_id: Uuid) -> OrchestratorResult<Option<PlanRecord>> {
            Ok(None)
        }

        async fn append_working_memory(
            &self,
            _plan_id: Uuid,
            _entry: &WorkingMemoryEntry,
        ) -> OrchestratorResult<()> {
            Ok(())
        }

        async fn list_working_memory(
            &self,
            _plan_id: Uuid,
        ) -> OrchestratorResult<Vec<WorkingMemoryEntry>> {
            Ok(Vec::new())
        }
    }

    fn engine(content: &str) -> (PlanningEngine, Arc<MemoryStore>) {
        let registry = StaticSkillRegistry::new();
        registry.register(
            SkillRef::new("skill-email", "email.gmail.draft_reply"),
            "Draft a reply email",
        );
        registry.register(
            SkillRef::new("skill-crm", "crm.salesforce.update_lead"),
            "Update a Salesforce lead record",
        );
        let store = Arc::new(MemoryStore::default());
        let engine = PlanningEngine::new(
            Arc::new(CannedLlm {
                content: content.to_string(),
            }),
            Arc::new(registry),
            store.clone(),
        );
        (engine, store)
    }

    fn skills() -> Vec<SkillRef> {
        vec![
            SkillRef::new("skill-email", "email.gmail.draft_reply"),
            SkillRef::new("skill-crm", "crm.salesforce.update_lead"),
        ]
    }

    #[tokio::test]
    async fn non_json_response_is_a_parse_failure() {
        let (engine, _) = engine("not json");
        let err = engine
            .create_execution_plan("draft an email", &skills())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PlanParseFailed);
    }

    #[tokio::test]
    async fn missing_steps_field_is_distinct_from_parse_failure() {
        let (engine, _) = engine(r#"{"no_steps": []}"#);
        let err = engine
            .create_execution_plan("draft an email", &skills())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PlanMissingField);
    }

    #[tokio::test]
    async fn step_without_skill_id_is_invalid() {
        let (engine, _) = engine(r#"{"steps": [{"step_number": 1}]}"#);
        let err = engine
            .create_execution_plan("draft an email", &skills())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PlanInvalidStep);
    }

    #[tokio::test]
    async fn fenced_response_parses_with_defaults() {
        let content = "```json\n{\"steps\": [\
            {\"step_number\": 2, \"skill_id\": \"skill-crm\"},\
            {\"step_number\": 1, \"skill_id\": \"skill-email\"}\
        ]}\n```";
        let (engine, _) = engine(content);
        let plan = engine
            .create_execution_plan("draft then sync", &skills())
            .await
            .unwrap();

        assert_eq!(plan.steps.len(), 2);
        assert!(plan.steps.iter().all(|s| s.depends_on.is_empty()));
        assert!(plan.steps.iter().all(|s| s.input_data == serde_json::json!({})));
        // Default groups: one wave per step, step-number order.
        assert_eq!(plan.parallel_groups, vec![vec![1], vec![2]]);
        assert_eq!(plan.risk_level, RiskLevel::Low);
        assert!(!plan.approval_required);
        assert_eq!(plan.reasoning, "");
    }

    #[tokio::test]
    async fn self_dependency_is_rejected() {
        let content = r#"{"steps": [{"step_number": 1, "skill_id": "skill-email", "depends_on": [1]}]}"#;
        let (engine, _) = engine(content);
        let err = engine
            .create_execution_plan("task", &skills())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PlanInvalidStep);
    }

    #[tokio::test]
    async fn dependency_cycle_is_rejected() {
        let content = r#"{"steps": [
            {"step_number": 1, "skill_id": "a", "depends_on": [2]},
            {"step_number": 2, "skill_id": "b", "depends_on": [1]}
        ]}"#;
        let (engine, _) = engine(content);
        let err = engine
            .create_execution_plan("task", &skills())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PlanInvalidStep);
    }

    #[tokio::test]
    async fn groups_that_leave_a_step_uncovered_are_rejected() {
        let content = r#"{"steps": [
            {"step_number": 1, "skill_id": "skill-email"},
            {"step_number": 2, "skill_id": "skill-crm"}
        ], "parallel_groups": [[1]]}"#;
        let (engine, _) = engine(content);
        let err = engine
            .create_execution_plan("task", &skills())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PlanInvalidStep);
    }

    #[tokio::test]
    async fn dangling_dependency_is_rejected() {
        let content = r#"{"steps": [{"step_number": 1, "skill_id": "a", "depends_on": [9]}]}"#;
        let (engine, _) = engine(content);
        let err = engine
            .create_execution_plan("task", &skills())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PlanInvalidStep);
    }

    #[tokio::test]
    async fn analyze_task_without_matches_returns_empty_plan() {
        let (engine, store) = engine(r#"{"steps": []}"#);
        let plan = engine
            .analyze_task(&TaskRequest::new("forecast quarterly revenue"), "user-1")
            .await
            .unwrap();

        assert!(plan.steps.is_empty());
        assert!(plan.reasoning.contains("No matching skills"));
        // Short-circuit path does not persist.
        assert!(store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn analyze_task_derives_risk_and_persists() {
        let content = r#"{"steps": [
            {"step_number": 1, "skill_id": "skill-email", "data_classes_accessed": ["PUBLIC", "CONFIDENTIAL"]}
        ], "risk_level": "low"}"#;
        let (engine, store) = engine(content);
        let plan = engine
            .analyze_task(&TaskRequest::new("draft a reply email"), "user-1")
            .await
            .unwrap();

        // Derived from data classes, not the planner's self-reported "low".
        assert_eq!(plan.risk_level, RiskLevel::High);
        let saved = store.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].user_id, "user-1");
        assert_eq!(saved[0].plan.plan_id, plan.plan_id);
    }

    #[test]
    fn risk_mapping_takes_the_most_sensitive_class() {
        assert_eq!(
            risk_from_data_classes(&[DataClass::Public, DataClass::Internal, DataClass::Confidential]),
            RiskLevel::High
        );
        assert_eq!(risk_from_data_classes(&[]), RiskLevel::Low);
        assert_eq!(risk_from_data_classes(&[DataClass::Regulated]), RiskLevel::Critical);
        assert_eq!(risk_from_data_classes(&[DataClass::Internal]), RiskLevel::Medium);
    }

    #[test]
    fn fence_stripping_handles_plain_and_tagged_fences() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }
}
