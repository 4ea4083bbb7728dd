//! CLI 应用装配层：把子命令映射到 router 的四个入口并输出结果。
use std::time::Duration;

use serde::Serialize;
use tribridge_core::api::{
    AppConfig, BackendKind, CliError, ExecutionMode, FileRef, RawPlan, Router, RouterError, Task,
    WorkflowKind, WorkflowResult,
};

use crate::commands::cli::{Args, Commands, MultimodalArgs, TaskArgs, WorkflowArgs};
use crate::utils::{parse_options, read_json_object, read_prompt};

/// Exit code for a workflow that ran but did not fully succeed.
pub const EXIT_WORKFLOW_FAILED: i32 = 2;

#[tracing::instrument(name = "cli.run_app", skip_all)]
pub async fn run_app(args: Args, cfg: AppConfig) -> Result<i32, CliError> {
    let renderer = tribridge_plugins::factory::build_renderer(&args.events);
    let router = tribridge_plugins::factory::build_router(&cfg, renderer);
    let jsonl = args.jsonl;

    match args.command {
        Commands::Analyze(t) => analyze(&router, &t, jsonl),
        Commands::Run(t) => run_task(&router, &t, jsonl).await,
        Commands::Multimodal(m) => multimodal(&router, &m, jsonl).await,
        Commands::Workflow(w) => workflow(&router, &w, jsonl).await,
    }
}

fn analyze(router: &Router, t: &TaskArgs, jsonl: bool) -> Result<i32, CliError> {
    let task = build_task(t)?;
    let analysis = router.analyze_task(&task, parse_backend(t.backend.as_deref())?);
    print_json(&analysis, jsonl)?;
    Ok(0)
}

async fn run_task(router: &Router, t: &TaskArgs, jsonl: bool) -> Result<i32, CliError> {
    let task = build_task(t)?;
    let result = router
        .execute_with_optimal_layer(&task, parse_backend(t.backend.as_deref())?)
        .await?;
    print_json(&result, jsonl)?;
    Ok(0)
}

async fn multimodal(router: &Router, m: &MultimodalArgs, jsonl: bool) -> Result<i32, CliError> {
    let prompt = read_prompt(m.prompt.as_deref(), m.prompt_file.as_deref())?;
    let kind: WorkflowKind = m.kind.parse().map_err(RouterError::from)?;
    let files = m.files.iter().map(FileRef::from_path).collect();
    let options = parse_options(&m.options)?;

    let result = router
        .process_multimodal(&prompt, files, kind, options)
        .await?;
    finish_workflow(&result, jsonl)
}

async fn workflow(router: &Router, w: &WorkflowArgs, jsonl: bool) -> Result<i32, CliError> {
    let plan: RawPlan = serde_json::from_value(serde_json::Value::Object(read_json_object(&w.plan)?))?;
    let input_data = match &w.input {
        Some(path) => read_json_object(path)?,
        None => Default::default(),
    };

    let mut opts = router.default_options();
    if let Some(mode) = &w.mode {
        opts.mode = mode.parse::<ExecutionMode>().map_err(CliError::Command)?;
    }
    if let Some(ms) = w.timeout_ms {
        opts.timeout = Some(Duration::from_millis(ms));
    }

    let result = router.execute_workflow(plan, &input_data, opts).await?;
    finish_workflow(&result, jsonl)
}

fn finish_workflow(result: &WorkflowResult, jsonl: bool) -> Result<i32, CliError> {
    print_json(result, jsonl)?;
    if result.success {
        Ok(0)
    } else {
        for failure in &result.failures {
            tracing::warn!("step '{}' failed: {}", failure.step_id, failure.message);
        }
        Ok(EXIT_WORKFLOW_FAILED)
    }
}

fn build_task(t: &TaskArgs) -> Result<Task, CliError> {
    let mut task = Task::new(read_prompt(t.prompt.as_deref(), t.prompt_file.as_deref())?)
        .with_files(t.files.iter().map(FileRef::from_path).collect());
    if let Some(action) = &t.action {
        task = task.with_action(action.clone());
    }
    Ok(task)
}

fn parse_backend(raw: Option<&str>) -> Result<Option<BackendKind>, CliError> {
    raw.map(|b| b.parse::<BackendKind>().map_err(CliError::Command))
        .transpose()
}

fn print_json<T: Serialize>(value: &T, jsonl: bool) -> Result<(), CliError> {
    let out = if jsonl {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{out}");
    Ok(())
}
