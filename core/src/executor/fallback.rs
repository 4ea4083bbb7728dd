use serde_json::{Map, Value};

use crate::executor::types::{ExecutionPlan, FallbackInfo, LayerResult, WorkflowStep};

use super::step::StepExecutor;

/// Substitute chosen for a failed step.
#[derive(Debug, Clone)]
pub struct FallbackPlan {
    pub key: String,
    pub substitute: WorkflowStep,
}

/// Look up `"<backend>_unavailable"`; only an entry whose `replace` names the
/// failed step applies.
pub fn find_fallback(plan: &ExecutionPlan, failed: &WorkflowStep) -> Option<FallbackPlan> {
    let key = failed.backend.unavailable_key();
    let strategy = plan.fallback_strategies.get(&key)?;
    if strategy.replace != failed.id {
        return None;
    }
    Some(FallbackPlan {
        key,
        substitute: strategy.with.clone(),
    })
}

/// Input for the substitute: the failed step's resolved input, with the
/// substitute's own keys filling gaps.
pub fn substitute_input(
    failed_input: &Map<String, Value>,
    substitute: &WorkflowStep,
) -> Map<String, Value> {
    let mut input = failed_input.clone();
    for (k, v) in &substitute.input {
        input.entry(k.clone()).or_insert_with(|| v.clone());
    }
    input
}

/// Run the substitute once. `Some` only when it produced a usable result,
/// which then stands in for the original step's outcome.
pub async fn run_fallback(
    executor: &StepExecutor,
    fallback: &FallbackPlan,
    failed_input: &Map<String, Value>,
    original: &LayerResult,
) -> Option<LayerResult> {
    tracing::info!(
        "fallback '{}' activated: running '{}' on '{}'",
        fallback.key,
        fallback.substitute.id,
        fallback.substitute.backend
    );

    let input = substitute_input(failed_input, &fallback.substitute);
    let mut result = executor.run_step_once(&fallback.substitute, input).await;

    if !result.is_effective_success() {
        tracing::warn!(
            "fallback '{}' failed too: {}",
            fallback.substitute.id,
            result.error.as_deref().unwrap_or("no usable data")
        );
        return None;
    }

    result.metadata.fallback = Some(FallbackInfo {
        strategy: fallback.key.clone(),
        replaced_by: fallback.substitute.id.clone(),
        original_error: original
            .error
            .clone()
            .unwrap_or_else(|| "step returned no usable data".to_string()),
    });
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;
    use serde_json::json;

    fn plan() -> ExecutionPlan {
        ExecutionPlan::new(vec![
            WorkflowStep::new("extract", BackendKind::AiStudio, "extract"),
            WorkflowStep::new("describe", BackendKind::AiStudio, "describe"),
        ])
        .with_fallback(
            "aistudio_unavailable",
            "extract",
            WorkflowStep::new("extract_alt", BackendKind::Gemini, "extract")
                .input("instructions", json!("fallback instructions"))
                .input("mode", json!("fast")),
        )
    }

    #[test]
    fn fallback_applies_only_to_declared_step() {
        let plan = plan();
        let hit = find_fallback(&plan, plan.step("extract").unwrap()).unwrap();
        assert_eq!(hit.key, "aistudio_unavailable");
        assert_eq!(hit.substitute.id, "extract_alt");
        assert!(find_fallback(&plan, plan.step("describe").unwrap()).is_none());
    }

    #[test]
    fn substitute_uses_failed_step_input() {
        let plan = plan();
        let fb = find_fallback(&plan, plan.step("extract").unwrap()).unwrap();
        let mut failed = Map::new();
        failed.insert("instructions".into(), json!("original"));
        let input = substitute_input(&failed, &fb.substitute);
        assert_eq!(input["instructions"], json!("original"));
        assert_eq!(input["mode"], json!("fast"));
    }
}
