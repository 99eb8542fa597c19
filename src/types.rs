use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// ==========================================
// STEP & PLAN STATUS
// ==========================================

/// Lifecycle status of a single plan step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Aggregate outcome of one execution pass over a plan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Completed,
    Partial,
    Failed,
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanStatus::Completed => write!(f, "completed"),
            PlanStatus::Partial => write!(f, "partial"),
            PlanStatus::Failed => write!(f, "failed"),
        }
    }
}

// ==========================================
// RISK & DATA CLASSIFICATION
// ==========================================

/// Plan-level risk, derived from the most sensitive data class any step touches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

impl RiskLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            "critical" => Some(RiskLevel::Critical),
            _ => None,
        }
    }
}

/// Data sensitivity classification a skill declares for the data it touches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataClass {
    Public,
    Internal,
    Confidential,
    Restricted,
    Regulated,
}

impl DataClass {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PUBLIC" => Some(DataClass::Public),
            "INTERNAL" => Some(DataClass::Internal),
            "CONFIDENTIAL" => Some(DataClass::Confidential),
            "RESTRICTED" => Some(DataClass::Restricted),
            "REGULATED" => Some(DataClass::Regulated),
            _ => None,
        }
    }

    pub fn risk(&self) -> RiskLevel {
        match self {
            DataClass::Public => RiskLevel::Low,
            DataClass::Internal => RiskLevel::Medium,
            DataClass::Confidential => RiskLevel::High,
            DataClass::Restricted | DataClass::Regulated => RiskLevel::Critical,
        }
    }
}

// ==========================================
// PLAN DATA MODEL
// ==========================================

/// One node in an execution plan DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStep {
    /// Unique within the plan; also the DAG node id.
    pub step_number: u32,
    pub skill_id: String,
    /// Hierarchical namespace of the skill, e.g. `crm.salesforce.update_lead`.
    pub skill_path: String,
    pub depends_on: Vec<u32>,
    pub status: StepStatus,
    pub input_data: serde_json::Value,
    pub output_data: Option<serde_json::Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub agent_id: Option<String>,
    /// Data classifications the step declared it will touch; drives risk derivation.
    pub data_classes: Vec<DataClass>,
}

impl ExecutionStep {
    pub fn new(step_number: u32, skill_id: &str, skill_path: &str) -> Self {
        Self {
            step_number,
            skill_id: skill_id.to_string(),
            skill_path: skill_path.to_string(),
            depends_on: Vec::new(),
            status: StepStatus::Pending,
            input_data: serde_json::json!({}),
            output_data: None,
            started_at: None,
            completed_at: None,
            agent_id: None,
            data_classes: Vec::new(),
        }
    }
}

/// The full DAG plus metadata. Immutable once built; every planning call
/// produces a fresh plan with a new id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub plan_id: Uuid,
    pub task_description: String,
    pub steps: Vec<ExecutionStep>,
    /// Execution waves. Group i must fully resolve before group i+1 starts.
    pub parallel_groups: Vec<Vec<u32>>,
    pub estimated_duration_ms: u64,
    pub risk_level: RiskLevel,
    pub approval_required: bool,
    /// Planner-supplied explanation, carried for auditability.
    pub reasoning: String,
}

impl ExecutionPlan {
    pub fn empty(task_description: &str, reasoning: &str) -> Self {
        Self {
            plan_id: Uuid::new_v4(),
            task_description: task_description.to_string(),
            steps: Vec::new(),
            parallel_groups: Vec::new(),
            estimated_duration_ms: 0,
            risk_level: RiskLevel::Low,
            approval_required: false,
            reasoning: reasoning.to_string(),
        }
    }

    pub fn step(&self, step_number: u32) -> Option<&ExecutionStep> {
        self.steps.iter().find(|s| s.step_number == step_number)
    }
}

// ==========================================
// WORKING MEMORY & RESULTS
// ==========================================

/// Durable record of what happened when a step ran (or was skipped).
/// Created exactly once per terminal step; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingMemoryEntry {
    pub step_number: u32,
    pub skill_id: String,
    /// Terminal only: completed, failed or skipped.
    pub status: StepStatus,
    pub summary: String,
    pub artifacts: Vec<String>,
    pub extracted_facts: HashMap<String, serde_json::Value>,
    pub next_step_hints: Vec<String>,
}

impl WorkingMemoryEntry {
    pub fn skipped(step_number: u32, skill_id: &str, summary: &str) -> Self {
        Self {
            step_number,
            skill_id: skill_id.to_string(),
            status: StepStatus::Skipped,
            summary: summary.to_string(),
            artifacts: Vec::new(),
            extracted_facts: HashMap::new(),
            next_step_hints: Vec::new(),
        }
    }
}

/// Aggregate outcome of one `execute_plan` pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanResult {
    pub plan_id: Uuid,
    pub status: PlanStatus,
    pub steps_completed: u32,
    pub steps_failed: u32,
    pub steps_skipped: u32,
    pub total_execution_ms: u64,
    /// Ordered by completion, not by step number.
    pub working_memory: Vec<WorkingMemoryEntry>,
}

// ==========================================
// SKILLS & COLLABORATOR PAYLOADS
// ==========================================

/// Reference to a discoverable skill, as returned by the skill index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillRef {
    pub id: String,
    pub skill_path: String,
    pub trust_level: Option<String>,
    pub declared_permissions: Vec<String>,
}

impl SkillRef {
    pub fn new(id: &str, skill_path: &str) -> Self {
        Self {
            id: id.to_string(),
            skill_path: skill_path.to_string(),
            trust_level: None,
            declared_permissions: Vec::new(),
        }
    }
}

/// Outcome reported by the opaque skill executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillInvocation {
    pub success: bool,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

impl SkillInvocation {
    pub fn ok(result: serde_json::Value, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            execution_time_ms,
        }
    }

    pub fn failed(error: &str, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.to_string()),
            execution_time_ms,
        }
    }
}

/// Incoming task for `analyze_task`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub description: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl TaskRequest {
    pub fn new(description: &str) -> Self {
        Self {
            description: description.to_string(),
            metadata: HashMap::new(),
        }
    }
}

/// Historical execution record for a (user, skill) pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TrustHistory {
    pub successful_executions: u32,
    pub failed_executions: u32,
}

impl TrustHistory {
    pub fn total(&self) -> u32 {
        self.successful_executions + self.failed_executions
    }

    /// Success rate in [0, 1]; neutral 0.5 when there is no history yet.
    pub fn success_rate(&self) -> f64 {
        if self.total() == 0 {
            0.5
        } else {
            self.successful_executions as f64 / self.total() as f64
        }
    }
}
