/// Numeric error codes shared by the router, the workflow engine and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    Success = 0,
    GeneralError = 1,
    ParseError = 2,
    ValidationError = 3,
    StepNotFound = 10,
    DependencyError = 11,
    CircularDependency = 12,
    UnknownWorkflow = 13,
    BackendError = 20,
    BackendUnavailable = 21,
    QuotaExceeded = 22,
    InvalidResult = 23,
    FallbackExhausted = 24,
    Timeout = 30,
    Cancelled = 31,
    NetworkError = 40,
    AuthError = 41,
    RateLimited = 42,
    ServerError = 43,
    ConfigError = 60,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}
