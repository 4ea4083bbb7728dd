use std::time::Duration;

use thiserror::Error;

use crate::backend::BackendKind;

use super::protocol::ErrorCode;

/// Failure classes that are worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransientKind {
    Timeout,
    Network,
    Server,
    RateLimited,
}

impl std::fmt::Display for TransientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Server => "server",
            Self::RateLimited => "rate limited",
        };
        f.write_str(s)
    }
}

/// Errors raised by a single backend call.
#[derive(Error, Debug, Clone)]
pub enum BackendError {
    #[error("backend '{backend}' unavailable: {reason}")]
    Unavailable { backend: BackendKind, reason: String },

    #[error("backend '{backend}' authentication failed: {message}")]
    Auth { backend: BackendKind, message: String },

    #[error("backend '{backend}' {kind} error: {message}")]
    Transient {
        backend: BackendKind,
        kind: TransientKind,
        message: String,
    },

    #[error("backend '{backend}' quota exceeded, retry after {}s", .retry_after.as_secs())]
    QuotaExceeded {
        backend: BackendKind,
        retry_after: Duration,
    },

    #[error("backend '{backend}' returned an unusable result: {reason}")]
    InvalidResult { backend: BackendKind, reason: String },

    #[error("backend '{backend}' error: {message}")]
    Other { backend: BackendKind, message: String },
}

impl BackendError {
    pub fn timeout(backend: BackendKind, after: Duration) -> Self {
        Self::Transient {
            backend,
            kind: TransientKind::Timeout,
            message: format!("timed out after {}ms", after.as_millis()),
        }
    }

    pub fn backend(&self) -> BackendKind {
        match self {
            Self::Unavailable { backend, .. }
            | Self::Auth { backend, .. }
            | Self::Transient { backend, .. }
            | Self::QuotaExceeded { backend, .. }
            | Self::InvalidResult { backend, .. }
            | Self::Other { backend, .. } => *backend,
        }
    }

    /// Only transient failures are retried; everything else goes to fallback.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Suggested wait before the backend should be tried again, if known.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::QuotaExceeded { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Unavailable { .. } => ErrorCode::BackendUnavailable,
            Self::Auth { .. } => ErrorCode::AuthError,
            Self::Transient { kind, .. } => match kind {
                TransientKind::Timeout => ErrorCode::Timeout,
                TransientKind::Network => ErrorCode::NetworkError,
                TransientKind::Server => ErrorCode::ServerError,
                TransientKind::RateLimited => ErrorCode::RateLimited,
            },
            Self::QuotaExceeded { .. } => ErrorCode::QuotaExceeded,
            Self::InvalidResult { .. } => ErrorCode::InvalidResult,
            Self::Other { .. } => ErrorCode::BackendError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        let t = BackendError::timeout(BackendKind::Gemini, Duration::from_millis(10));
        assert!(t.is_retryable());
        assert_eq!(t.error_code(), ErrorCode::Timeout);

        let q = BackendError::QuotaExceeded {
            backend: BackendKind::AiStudio,
            retry_after: Duration::from_secs(30),
        };
        assert!(!q.is_retryable());
        assert_eq!(q.retry_after(), Some(Duration::from_secs(30)));
        assert!(q.to_string().contains("retry after 30s"));

        let a = BackendError::Auth {
            backend: BackendKind::Claude,
            message: "not logged in".into(),
        };
        assert!(!a.is_retryable());
        assert_eq!(a.backend(), BackendKind::Claude);
    }
}
