use std::collections::BTreeMap;
use std::time::Duration;

use crate::backend::BackendKind;
use crate::executor::types::{
    millis, LayerResult, StepFailure, StepState, WorkflowMetadata, WorkflowResult,
};

/// Merge per-step outcomes into one workflow result.
///
/// `order` is the order steps were scheduled in; it fixes the order of the
/// reported failures. A step counts as completed only when its result is
/// effectively successful, whatever the backend's own flag said.
pub fn aggregate(
    order: &[String],
    results: BTreeMap<String, LayerResult>,
    mut states: BTreeMap<String, StepState>,
    duration: Duration,
    strategy: Option<String>,
) -> WorkflowResult {
    let total_steps = order.len();
    let mut failures = Vec::new();
    let mut steps_completed = 0;
    let mut cost = 0.0;
    let mut step_duration_ms = 0;
    let mut backends_used: Vec<BackendKind> = Vec::new();

    for id in order {
        match results.get(id) {
            Some(result) => {
                cost += result.metadata.cost;
                step_duration_ms += result.metadata.duration_ms;
                if let Some(backend) = result.metadata.backend {
                    if result.metadata.attempts > 0 || result.metadata.cached {
                        backends_used.push(backend);
                    }
                }
                if result.is_effective_success() {
                    steps_completed += 1;
                } else {
                    failures.push(StepFailure {
                        step_id: id.clone(),
                        message: failure_message(result),
                    });
                }
            }
            None => {
                failures.push(StepFailure {
                    step_id: id.clone(),
                    message: "step did not run".to_string(),
                });
                states.insert(id.clone(), StepState::FailedTerminal);
            }
        }
    }

    backends_used.sort();
    backends_used.dedup();

    let steps_failed = total_steps - steps_completed;
    WorkflowResult {
        success: steps_failed == 0,
        summary: format!(
            "{}/{} steps completed, {} failed",
            steps_completed, total_steps, steps_failed
        ),
        results,
        states,
        metadata: WorkflowMetadata {
            duration_ms: millis(duration),
            total_steps,
            steps_completed,
            steps_failed,
            cost,
            step_duration_ms,
            backends_used,
            strategy,
            fast_path: false,
        },
        failures,
    }
}

fn failure_message(result: &LayerResult) -> String {
    match &result.error {
        Some(err) => err.clone(),
        None if result.success => "backend returned an empty result".to_string(),
        None => "step failed".to_string(),
    }
}
