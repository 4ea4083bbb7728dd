//! Router facade: the four public entrypoints over classifier, plan compiler
//! and execution engine.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

use crate::backend::{BackendKind, BackendRegistry};
use crate::classifier::{RoutingRule, TaskAnalysis, TaskClassifier};
use crate::config::RouterConfig;
use crate::error::{ErrorCode, RouterError};
use crate::executor::aggregate;
use crate::executor::types::{
    ExecutionPlan, FallbackInfo, FileRef, LayerResult, RawPlan, StepState, Task, WorkflowResult,
};
use crate::executor::{ExecutionEngine, WorkflowOptions};
use crate::planner::{self, CompiledPlan, TemplateContext, WorkflowKind};

/// Step id used for fast-path results.
pub const FAST_PATH_STEP_ID: &str = "fast_path";

lazy_static! {
    // Absolute, home-relative, dot-relative or drive-letter paths.
    static ref PATH_LIKE: Regex = Regex::new(
        r"(?:^|[\s(\[{'\x22`])(?:[A-Za-z]:\\|~/|\.{1,2}/|/)[\w.\-]+(?:[/\\][\w.\-]+)*"
    )
    .expect("PATH_LIKE is valid");
    // Bare or relative file names with a known extension.
    static ref FILE_NAME_LIKE: Regex = Regex::new(
        r"(?i)\b[\w\-]+(?:[/\\][\w\-.]+)*\.(?:pdf|png|jpe?g|gif|webp|bmp|tiff?|mp3|wav|flac|ogg|m4a|mp4|mov|avi|mkv|webm|docx?|xlsx?|pptx?|odt|rtf|epub|csv|tsv|json|ya?ml|toml|xml|html?|md|txt|log|rs|py|js|ts|tsx|jsx|go|java|kt|swift|rb|php|cpp|hpp|cs|sh|sql)\b"
    )
    .expect("FILE_NAME_LIKE is valid");
}

/// Ad hoc fallback order after `primary` fails.
pub fn fallback_order(primary: BackendKind, has_files: bool) -> Vec<BackendKind> {
    match primary {
        BackendKind::Claude if has_files => vec![BackendKind::AiStudio, BackendKind::Gemini],
        BackendKind::Claude => vec![BackendKind::Gemini, BackendKind::AiStudio],
        BackendKind::Gemini => vec![BackendKind::Claude, BackendKind::AiStudio],
        BackendKind::AiStudio => vec![BackendKind::Gemini, BackendKind::Claude],
    }
}

pub fn contains_file_path(prompt: &str) -> bool {
    PATH_LIKE.is_match(prompt) || FILE_NAME_LIKE.is_match(prompt)
}

pub struct Router {
    registry: Arc<BackendRegistry>,
    classifier: TaskClassifier,
    engine: ExecutionEngine,
    config: RouterConfig,
}

impl Router {
    pub fn new(engine: ExecutionEngine, config: RouterConfig) -> Self {
        Self {
            registry: engine.step_executor().registry().clone(),
            classifier: TaskClassifier::default(),
            engine,
            config,
        }
    }

    pub fn with_classifier(mut self, classifier: TaskClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Classify without executing.
    pub fn analyze_task(&self, task: &Task, override_backend: Option<BackendKind>) -> TaskAnalysis {
        self.classifier.classify(task, override_backend)
    }

    /// Classify, execute on the chosen backend, then walk the fixed fallback
    /// order on failure. Unusable candidates are skipped.
    pub async fn execute_with_optimal_layer(
        &self,
        task: &Task,
        override_backend: Option<BackendKind>,
    ) -> Result<LayerResult, RouterError> {
        let analysis = self.analyze_task(task, override_backend);
        let primary = analysis.backend;
        tracing::info!("routing to '{}': {}", primary, analysis.reasoning);

        // Lookup-style prompts reuse earlier grounded answers.
        let grounded = task.action.is_none()
            && matches!(
                analysis.rule,
                RoutingRule::CurrentInformation | RoutingRule::SimpleQuery
            );

        let mut candidates = vec![primary];
        candidates.extend(fallback_order(primary, !task.files.is_empty()));

        let mut attempts: Vec<(BackendKind, String)> = Vec::new();
        for candidate in candidates {
            if !self.registry.is_usable(candidate).await {
                tracing::warn!("backend '{}' unavailable; skipping", candidate);
                if candidate == primary {
                    attempts.push((candidate, "backend unavailable".to_string()));
                }
                continue;
            }

            let executor = self.engine.step_executor();
            let outcome = if grounded {
                executor.call_grounded(candidate, task).await
            } else {
                executor.call(candidate, task).await
            };
            match outcome {
                Ok(mut result) => {
                    if candidate != primary {
                        tracing::info!("fallback to '{}' succeeded (primary '{}')", candidate, primary);
                        result.metadata.fallback = Some(FallbackInfo {
                            strategy: primary.unavailable_key(),
                            replaced_by: candidate.to_string(),
                            original_error: attempts
                                .first()
                                .map(|(_, e)| e.clone())
                                .unwrap_or_default(),
                        });
                    }
                    return Ok(result);
                }
                Err(err) => {
                    tracing::warn!("backend '{}' failed: {}", candidate, err);
                    attempts.push((candidate, err.to_string()));
                }
            }
        }

        Err(RouterError::FallbackExhausted { primary, attempts })
    }

    /// Fast path when eligible, otherwise compile and run the template plan.
    pub async fn process_multimodal(
        &self,
        prompt: &str,
        files: Vec<FileRef>,
        kind: WorkflowKind,
        options: Map<String, Value>,
    ) -> Result<WorkflowResult, RouterError> {
        if self.is_fast_path_eligible(prompt, &files) {
            tracing::info!("fast path: skipping plan compilation");
            let task = Task {
                prompt: prompt.to_string(),
                files,
                options,
                action: None,
                timeout_ms: None,
            };
            return Ok(self.run_fast_path(&task).await);
        }

        let ctx = TemplateContext::new(prompt, files).with_options(options);
        let compiled = planner::compile_template(kind, &ctx)?;
        tracing::info!("running '{}' workflow ({} steps)", kind, compiled.len());
        self.run_compiled(&compiled, &Map::new(), self.default_options())
            .await
    }

    /// Validate and run a caller-supplied plan.
    pub async fn execute_workflow(
        &self,
        plan: RawPlan,
        input_data: &Map<String, Value>,
        opts: WorkflowOptions,
    ) -> Result<WorkflowResult, RouterError> {
        let compiled = planner::compile_raw(plan)?;
        self.run_compiled(&compiled, input_data, opts).await
    }

    /// Run an already typed plan.
    pub async fn execute_plan(
        &self,
        plan: ExecutionPlan,
        input_data: &Map<String, Value>,
        opts: WorkflowOptions,
    ) -> Result<WorkflowResult, RouterError> {
        let compiled = planner::compile(plan)?;
        self.run_compiled(&compiled, input_data, opts).await
    }

    pub fn default_options(&self) -> WorkflowOptions {
        WorkflowOptions::new(self.config.default_mode)
            .with_timeout(Duration::from_millis(self.config.workflow_timeout_ms))
    }

    /// Short, attachment-free, single-operation requests skip plan compilation.
    pub fn is_fast_path_eligible(&self, prompt: &str, files: &[FileRef]) -> bool {
        if prompt.chars().count() >= self.config.fast_path_max_chars || !files.is_empty() {
            return false;
        }
        let lower = prompt.to_lowercase();
        let complex = self
            .classifier
            .lexicon()
            .fast_path_complex_ops
            .iter()
            .any(|op| lower.contains(op));
        !complex && !contains_file_path(prompt)
    }

    async fn run_compiled(
        &self,
        compiled: &CompiledPlan,
        input_data: &Map<String, Value>,
        opts: WorkflowOptions,
    ) -> Result<WorkflowResult, RouterError> {
        Ok(self.engine.execute(compiled, input_data, &opts).await?)
    }

    async fn run_fast_path(&self, task: &Task) -> WorkflowResult {
        let start = Instant::now();
        let result = match self.execute_with_optimal_layer(task, None).await {
            Ok(result) => result,
            Err(err) => {
                let mut failed = LayerResult::failed(None, err.to_string());
                failed.metadata.error_code = Some(ErrorCode::FallbackExhausted);
                failed
            }
        };

        let state = match (&result.metadata.fallback, result.is_effective_success()) {
            (_, false) => StepState::FailedTerminal,
            (Some(_), true) => StepState::FailedRecovered,
            (None, true) => StepState::Succeeded,
        };

        let order = vec![FAST_PATH_STEP_ID.to_string()];
        let mut results = BTreeMap::new();
        results.insert(FAST_PATH_STEP_ID.to_string(), result);
        let mut states = BTreeMap::new();
        states.insert(FAST_PATH_STEP_ID.to_string(), state);

        let mut workflow = aggregate(
            &order,
            results,
            states,
            start.elapsed(),
            Some("fast_path".to_string()),
        );
        workflow.metadata.fast_path = true;
        workflow
    }
}
