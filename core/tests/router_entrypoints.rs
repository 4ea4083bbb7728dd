mod common;

use pretty_assertions::assert_eq;
use serde_json::{json, Map};
use tribridge_core::api::{
    BackendKind, ExecutionMode, FileRef, RawPlan, RouterError, RoutingRule, StepState, Task,
    WorkflowError,
    WorkflowKind, WorkflowOptions, FAST_PATH_STEP_ID,
};

use common::{router, router_with_cache, ScriptedBackend};

fn all_backends() -> (
    std::sync::Arc<ScriptedBackend>,
    std::sync::Arc<ScriptedBackend>,
    std::sync::Arc<ScriptedBackend>,
) {
    (
        ScriptedBackend::new(BackendKind::Claude).shared(),
        ScriptedBackend::new(BackendKind::Gemini).shared(),
        ScriptedBackend::new(BackendKind::AiStudio).shared(),
    )
}

#[test]
fn sunset_prompt_routes_to_multimodal_backend() {
    let (claude, gemini, aistudio) = all_backends();
    let router = router(&[claude, gemini, aistudio]);

    let analysis = router.analyze_task(&Task::new("generate an image of a sunset"), None);

    assert_eq!(analysis.backend, BackendKind::AiStudio);
    assert!(analysis.reasoning.contains("Generation intent"));
}

#[tokio::test]
async fn repeated_current_information_prompt_is_answered_from_cache() {
    let (claude, gemini, aistudio) = all_backends();
    let router = router_with_cache(&[claude.clone(), gemini.clone(), aistudio]);
    let task = Task::new("What is the latest stable Tokio release?");
    assert_eq!(router.analyze_task(&task, None).rule, RoutingRule::CurrentInformation);

    let first = router.execute_with_optimal_layer(&task, None).await.unwrap();
    let second = router.execute_with_optimal_layer(&task, None).await.unwrap();

    assert!(!first.metadata.cached);
    assert!(second.metadata.cached);
    assert_eq!(second.data, first.data);
    assert_eq!(gemini.calls().len(), 1);
    assert!(claude.calls().is_empty());
}

#[tokio::test]
async fn explicit_backend_choice_bypasses_cache() {
    let (claude, gemini, aistudio) = all_backends();
    let router = router_with_cache(&[claude, gemini.clone(), aistudio]);
    let task = Task::new("What is the latest stable Tokio release?");

    router
        .execute_with_optimal_layer(&task, Some(BackendKind::Gemini))
        .await
        .unwrap();
    let second = router
        .execute_with_optimal_layer(&task, Some(BackendKind::Gemini))
        .await
        .unwrap();

    assert!(!second.metadata.cached);
    assert_eq!(gemini.calls().len(), 2);
}

#[tokio::test]
async fn optimal_layer_falls_back_in_fixed_order() {
    let claude = ScriptedBackend::new(BackendKind::Claude)
        .failing("", "overloaded")
        .shared();
    let gemini = ScriptedBackend::new(BackendKind::Gemini).shared();
    let aistudio = ScriptedBackend::new(BackendKind::AiStudio).shared();
    let router = router(&[claude.clone(), gemini.clone(), aistudio.clone()]);

    let task = Task::new("explain lifetimes");
    let result = router
        .execute_with_optimal_layer(&task, Some(BackendKind::Claude))
        .await
        .unwrap();

    assert_eq!(result.metadata.backend, Some(BackendKind::Gemini));
    let fallback = result.metadata.fallback.unwrap();
    assert_eq!(fallback.strategy, "claude_unavailable");
    assert_eq!(fallback.replaced_by, "gemini");
    assert!(fallback.original_error.contains("overloaded"));
    assert_eq!(claude.calls().len(), 1);
    assert_eq!(gemini.calls().len(), 1);
    assert!(aistudio.calls().is_empty());
}

#[tokio::test]
async fn optimal_layer_skips_unavailable_candidates() {
    let claude = ScriptedBackend::new(BackendKind::Claude)
        .failing("", "overloaded")
        .shared();
    let gemini = ScriptedBackend::new(BackendKind::Gemini).unavailable().shared();
    let aistudio = ScriptedBackend::new(BackendKind::AiStudio).shared();
    let router = router(&[claude, gemini.clone(), aistudio.clone()]);

    let result = router
        .execute_with_optimal_layer(&Task::new("explain lifetimes"), Some(BackendKind::Claude))
        .await
        .unwrap();

    assert_eq!(result.metadata.backend, Some(BackendKind::AiStudio));
    assert!(gemini.calls().is_empty());
    assert_eq!(aistudio.calls().len(), 1);
}

#[tokio::test]
async fn optimal_layer_reports_every_attempt_when_exhausted() {
    let claude = ScriptedBackend::new(BackendKind::Claude).failing("", "a").shared();
    let gemini = ScriptedBackend::new(BackendKind::Gemini).failing("", "b").shared();
    let aistudio = ScriptedBackend::new(BackendKind::AiStudio).failing("", "c").shared();
    let router = router(&[claude, gemini, aistudio]);

    let err = router
        .execute_with_optimal_layer(&Task::new("explain lifetimes"), Some(BackendKind::Claude))
        .await
        .unwrap_err();

    match err {
        RouterError::FallbackExhausted { primary, attempts } => {
            assert_eq!(primary, BackendKind::Claude);
            let tried: Vec<BackendKind> = attempts.iter().map(|(k, _)| *k).collect();
            assert_eq!(
                tried,
                vec![BackendKind::Claude, BackendKind::Gemini, BackendKind::AiStudio]
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn short_prompt_takes_the_fast_path() {
    let (claude, gemini, aistudio) = all_backends();
    let router = router(&[claude.clone(), gemini.clone(), aistudio.clone()]);

    let result = router
        .process_multimodal(
            "What is the capital of France?",
            Vec::new(),
            WorkflowKind::Analysis,
            Map::new(),
        )
        .await
        .unwrap();

    assert!(result.success);
    assert!(result.metadata.fast_path);
    assert_eq!(result.metadata.strategy.as_deref(), Some("fast_path"));
    assert_eq!(result.states[FAST_PATH_STEP_ID], StepState::Succeeded);
    let total = claude.calls().len() + gemini.calls().len() + aistudio.calls().len();
    assert_eq!(total, 1);
}

#[tokio::test]
async fn attachments_run_the_template_workflow() {
    let (claude, gemini, aistudio) = all_backends();
    let router = router(&[claude.clone(), gemini, aistudio.clone()]);

    let result = router
        .process_multimodal(
            "What is this?",
            vec![FileRef::from_path("invoice.pdf")],
            WorkflowKind::Analysis,
            Map::new(),
        )
        .await
        .unwrap();

    assert!(result.success);
    assert!(!result.metadata.fast_path);
    assert_eq!(aistudio.call_count("extract"), 1);
    assert_eq!(claude.call_count("analyze"), 1);
    assert_eq!(
        result.results.keys().cloned().collect::<Vec<_>>(),
        vec!["analyze".to_string(), "extract".to_string()]
    );
}

#[tokio::test]
async fn cyclic_plan_is_rejected_before_any_call() {
    let (claude, gemini, aistudio) = all_backends();
    let router = router(&[claude.clone(), gemini, aistudio]);

    let plan: RawPlan = serde_json::from_value(json!({
        "steps": [
            {"id": "a", "backend": "claude", "action": "analyze", "dependsOn": ["b"]},
            {"id": "b", "backend": "claude", "action": "analyze", "dependsOn": ["a"]}
        ]
    }))
    .unwrap();

    let err = router
        .execute_workflow(plan, &Map::new(), WorkflowOptions::new(ExecutionMode::Parallel))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RouterError::Workflow(WorkflowError::CircularDependency { .. })
    ));
    assert!(claude.calls().is_empty());
}

#[tokio::test]
async fn raw_plan_with_unknown_backend_is_rejected() {
    let (claude, gemini, aistudio) = all_backends();
    let router = router(&[claude, gemini, aistudio]);

    let plan: RawPlan = serde_json::from_value(json!({
        "steps": [{"id": "a", "backend": "gpt", "action": "analyze"}]
    }))
    .unwrap();

    let err = router
        .execute_workflow(plan, &Map::new(), WorkflowOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RouterError::Workflow(WorkflowError::InvalidBackend { ref backend, .. }) if backend == "gpt"
    ));
}

#[tokio::test]
async fn raw_plan_runs_with_input_data() {
    let (claude, gemini, aistudio) = all_backends();
    let router = router(&[claude, gemini.clone(), aistudio]);

    let plan: RawPlan = serde_json::from_value(json!({
        "steps": [{"id": "look", "backend": "gemini", "action": "lookup"}]
    }))
    .unwrap();
    let mut input_data = Map::new();
    input_data.insert("query".into(), json!("tokio release notes"));

    let result = router
        .execute_workflow(plan, &input_data, WorkflowOptions::new(ExecutionMode::Sequential))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(gemini.calls()[0].prompt, "tokio release notes");
    assert_eq!(result.metadata.backends_used, vec![BackendKind::Gemini]);
}
