use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::BackendKind;
use crate::error::{BackendError, ErrorCode};

/// Whole milliseconds, saturating at `u64::MAX`.
pub fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Outcome of one backend call (or one workflow step).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: LayerMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendKind>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
    #[serde(default)]
    pub cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackInfo>,
}

/// Recorded when a declared substitute step produced the final outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackInfo {
    pub strategy: String,
    pub replaced_by: String,
    pub original_error: String,
}

impl LayerResult {
    pub fn ok(backend: BackendKind, data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata: LayerMetadata {
                backend: Some(backend),
                ..LayerMetadata::default()
            },
        }
    }

    pub fn failed(backend: Option<BackendKind>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            metadata: LayerMetadata {
                backend,
                ..LayerMetadata::default()
            },
        }
    }

    pub fn from_error(err: &BackendError) -> Self {
        let mut result = Self::failed(Some(err.backend()), err.to_string());
        result.metadata.error_code = Some(err.error_code());
        result.metadata.retry_after_ms = err.retry_after().map(millis);
        result
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.metadata.duration_ms = duration_ms;
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.metadata.cost = cost;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.metadata.model = Some(model.into());
        self
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.metadata.tokens = Some(tokens);
        self
    }

    /// Success that also carries a usable payload.
    pub fn is_effective_success(&self) -> bool {
        self.success && self.data.as_ref().is_some_and(is_meaningful)
    }
}

/// Empty strings, empty collections and null carry nothing a dependent step
/// could use.
pub fn is_meaningful(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Per-step lifecycle inside one workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Running,
    Succeeded,
    FailedRecovered,
    FailedTerminal,
}

impl StepState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::FailedRecovered | Self::FailedTerminal
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailure {
    pub step_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    pub duration_ms: u64,
    pub total_steps: usize,
    pub steps_completed: usize,
    pub steps_failed: usize,
    pub cost: f64,
    pub step_duration_ms: u64,
    pub backends_used: Vec<BackendKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(default)]
    pub fast_path: bool,
}

/// Merged outcome of a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub success: bool,
    pub results: BTreeMap<String, LayerResult>,
    #[serde(default)]
    pub states: BTreeMap<String, StepState>,
    pub summary: String,
    pub metadata: WorkflowMetadata,
    #[serde(default)]
    pub failures: Vec<StepFailure>,
}

impl WorkflowResult {
    pub fn is_partial(&self) -> bool {
        !self.success && self.metadata.steps_completed > 0
    }
}
