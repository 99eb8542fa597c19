use serde::{Deserialize, Serialize};
use std::fmt;

/// Main result type for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ErrorCode {
    // General Errors
    Unknown,
    Timeout,
    ConfigError,

    // Planning Errors
    PlanParseFailed,
    PlanMissingField,
    PlanInvalidStep,
    PlanningFailed,

    // Execution Errors
    StepExecutionError,
    SkillNotFound,
    SkillExecutionError,

    // LLM Errors
    LLMError,
    LLMProviderNotFound,
    LLMApiError,
    LLMInvalidResponse,

    // Storage Errors
    DatabaseError,
    SerializationError,

    // Autonomy Errors
    AutonomyError,

    // Network Errors
    NetworkError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ErrorCategory {
    System,
    Planning,
    Execution,
    Skill,
    LLM,
    Storage,
    Autonomy,
    Network,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone)]
pub struct OrchestratorError {
    pub code: ErrorCode,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub message: String,
}

impl OrchestratorError {
    pub fn new(
        code: ErrorCode,
        category: ErrorCategory,
        severity: ErrorSeverity,
        message: &str,
    ) -> Self {
        Self {
            code,
            category,
            severity,
            message: message.to_string(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self.severity {
            ErrorSeverity::Low | ErrorSeverity::Medium => true,
            ErrorSeverity::High => matches!(self.code, ErrorCode::Timeout),
            ErrorSeverity::Critical => false,
        }
    }

    pub fn is_retriable(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::LLMError
                | ErrorCode::LLMApiError
                | ErrorCode::NetworkError
                | ErrorCode::SkillExecutionError
                | ErrorCode::Timeout
        )
    }

    /// True for the three plan-malformation errors raised by the plan builder.
    /// Execution-side failures are never surfaced through this type; they are
    /// captured as failed working-memory entries instead.
    pub fn is_plan_malformation(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::PlanParseFailed | ErrorCode::PlanMissingField | ErrorCode::PlanInvalidStep
        )
    }

    /// Creates a database error
    pub fn database_error(message: &str) -> Self {
        Self::new(
            ErrorCode::DatabaseError,
            ErrorCategory::Storage,
            ErrorSeverity::High,
            message,
        )
    }
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}/{:?}] {}", self.category, self.code, self.message)
    }
}

impl std::error::Error for OrchestratorError {}

// Conversion from serde_json::Error
impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        OrchestratorError::new(
            ErrorCode::SerializationError,
            ErrorCategory::Storage,
            ErrorSeverity::Medium,
            &format!("JSON serialization error: {}", err),
        )
    }
}
