use thiserror::Error;

use crate::backend::BackendKind;

use super::backend::BackendError;
use super::executor::WorkflowError;
use super::protocol::ErrorCode;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("router failed: {0}")]
    Router(#[from] RouterError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum RouterError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("all backends failed (primary: {primary}; attempted: {})", format_attempts(.attempts))]
    FallbackExhausted {
        primary: BackendKind,
        attempts: Vec<(BackendKind, String)>,
    },

    #[error("config error: {0}")]
    Config(String),
}

impl RouterError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Workflow(e) => e.error_code(),
            Self::Backend(e) => e.error_code(),
            Self::FallbackExhausted { .. } => ErrorCode::FallbackExhausted,
            Self::Config(_) => ErrorCode::ConfigError,
        }
    }
}

fn format_attempts(attempts: &[(BackendKind, String)]) -> String {
    attempts
        .iter()
        .map(|(backend, err)| format!("{backend}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}
