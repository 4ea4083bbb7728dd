use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::task::WorkflowStep;

/// Declared substitute for one step when its backend fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackStrategy {
    /// Id of the step this strategy stands in for.
    pub replace: String,
    pub with: WorkflowStep,
}

/// A validated-shape workflow: steps plus the fallback table keyed by
/// `"<backend>_unavailable"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    pub steps: Vec<WorkflowStep>,
    #[serde(default, alias = "fallback_strategies")]
    pub fallback_strategies: BTreeMap<String, FallbackStrategy>,
}

impl ExecutionPlan {
    pub fn new(steps: Vec<WorkflowStep>) -> Self {
        Self {
            steps,
            fallback_strategies: BTreeMap::new(),
        }
    }

    pub fn with_fallback(
        mut self,
        key: impl Into<String>,
        replace: impl Into<String>,
        with: WorkflowStep,
    ) -> Self {
        self.fallback_strategies.insert(
            key.into(),
            FallbackStrategy {
                replace: replace.into(),
                with,
            },
        );
        self
    }

    pub fn step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }
}

/// Caller-supplied step before validation; every field may be absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStep {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(default, alias = "type")]
    pub action: Option<String>,
    #[serde(default)]
    pub input: Map<String, Value>,
    #[serde(default, alias = "depends_on")]
    pub depends_on: Vec<String>,
    #[serde(default, alias = "timeout_ms", alias = "timeout")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPlan {
    pub steps: Vec<RawStep>,
    #[serde(default, alias = "fallback_strategies")]
    pub fallback_strategies: BTreeMap<String, FallbackStrategy>,
}
