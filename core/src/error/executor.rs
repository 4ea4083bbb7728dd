use thiserror::Error;

use super::protocol::ErrorCode;

/// Plan validation and workflow-level errors.
///
/// Validation variants are fatal and never retried; only these and
/// [`WorkflowError::Timeout`] ever reach the caller of a workflow run.
#[derive(Error, Debug, Clone)]
pub enum WorkflowError {
    #[error("workflow plan has no steps")]
    EmptyPlan,

    #[error("workflow plan has {count} steps (limit: {max})")]
    TooManySteps { count: usize, max: usize },

    #[error("step #{index} is missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },

    #[error("step '{step_id}' names unknown backend '{backend}'")]
    InvalidBackend { step_id: String, backend: String },

    #[error("Duplicate step ID: {0}")]
    DuplicateStepId(String),

    #[error("Dependency not found: step '{step_id}' depends on '{missing_dep}'")]
    DependencyNotFound { step_id: String, missing_dep: String },

    #[error("Circular dependency detected at step '{offender}' ({path})")]
    CircularDependency { offender: String, path: String },

    #[error("unknown workflow kind: {0}")]
    UnknownWorkflow(String),

    #[error("workflow timed out after {0}ms")]
    Timeout(u64),
}

impl WorkflowError {
    /// Map workflow error to protocol error code
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::EmptyPlan => ErrorCode::ValidationError,
            Self::TooManySteps { .. } => ErrorCode::ValidationError,
            Self::MissingField { .. } => ErrorCode::ParseError,
            Self::InvalidBackend { .. } => ErrorCode::ValidationError,
            Self::DuplicateStepId(_) => ErrorCode::ValidationError,
            Self::DependencyNotFound { .. } => ErrorCode::DependencyError,
            Self::CircularDependency { .. } => ErrorCode::CircularDependency,
            Self::UnknownWorkflow(_) => ErrorCode::UnknownWorkflow,
            Self::Timeout(_) => ErrorCode::Timeout,
        }
    }
}
