use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::backend::BackendRegistry;
use crate::cache::SearchCache;
use crate::classifier::TaskClassifier;
use crate::error::WorkflowError;
use crate::planner::CompiledPlan;
use crate::quota::{AdmissionControl, Unlimited};

use super::aggregate::aggregate;
use super::fallback::{find_fallback, run_fallback};
use super::resolve::{merge_defaults, resolve_input};
use super::scheduler::execute_level;
use super::step::StepExecutor;
use super::traits::{
    ConcurrencyContext, ConcurrencyStrategyPlugin, OutputRendererPlugin, RenderEvent,
    RetryStrategyPlugin,
};
use super::types::{
    millis, ExecutionConfig, ExecutionMode, LayerResult, StepState, WorkflowResult, WorkflowStep,
};
use super::workload::{analyze_workload, choose_policy, hybrid_groups, SchedulePolicy};

/// Per-run knobs supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct WorkflowOptions {
    pub mode: ExecutionMode,
    /// Outer deadline for the whole run.
    pub timeout: Option<Duration>,
}

impl WorkflowOptions {
    pub fn new(mode: ExecutionMode) -> Self {
        Self {
            mode,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Step states for one run. Written by exactly one step at a time.
struct StepTracker {
    states: Mutex<BTreeMap<String, StepState>>,
}

impl StepTracker {
    fn new(ids: &[String]) -> Self {
        Self {
            states: Mutex::new(
                ids.iter()
                    .map(|id| (id.clone(), StepState::Pending))
                    .collect(),
            ),
        }
    }

    fn set(&self, id: &str, state: StepState) {
        let mut states = match self.states.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        states.insert(id.to_string(), state);
    }

    fn into_inner(self) -> BTreeMap<String, StepState> {
        match self.states.into_inner() {
            Ok(states) => states,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

struct StepOutcome {
    id: String,
    result: LayerResult,
    state: StepState,
}

/// Workflow execution engine: schedules a compiled plan and aggregates it.
pub struct ExecutionEngine {
    steps: StepExecutor,
    config: ExecutionConfig,
    classifier: TaskClassifier,
    renderer: Option<Arc<dyn OutputRendererPlugin>>,
    concurrency_strategy: Option<Arc<dyn ConcurrencyStrategyPlugin>>,
}

pub struct ExecutionEngineBuilder {
    registry: Arc<BackendRegistry>,
    config: ExecutionConfig,
    admission: Arc<dyn AdmissionControl>,
    cache: Option<Arc<SearchCache>>,
    classifier: TaskClassifier,
    renderer: Option<Arc<dyn OutputRendererPlugin>>,
    retry_strategy: Option<Arc<dyn RetryStrategyPlugin>>,
    concurrency_strategy: Option<Arc<dyn ConcurrencyStrategyPlugin>>,
}

impl ExecutionEngine {
    pub fn builder(registry: Arc<BackendRegistry>) -> ExecutionEngineBuilder {
        ExecutionEngineBuilder::new(registry)
    }

    pub fn step_executor(&self) -> &StepExecutor {
        &self.steps
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Run a compiled plan. Only the outer deadline surfaces as an error;
    /// step failures are part of the returned result.
    pub async fn execute(
        &self,
        compiled: &CompiledPlan,
        input_data: &Map<String, Value>,
        opts: &WorkflowOptions,
    ) -> Result<WorkflowResult, WorkflowError> {
        match opts.timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(compiled, input_data, opts.mode))
                .await
                .map_err(|_| {
                    tracing::warn!("workflow exceeded its {:?} deadline", limit);
                    WorkflowError::Timeout(millis(limit))
                }),
            None => Ok(self.run(compiled, input_data, opts.mode).await),
        }
    }

    /// Scheduling policy a run in `mode` would use.
    pub fn pick_policy(
        &self,
        mode: ExecutionMode,
        compiled: &CompiledPlan,
        input_data: &Map<String, Value>,
    ) -> SchedulePolicy {
        match mode {
            ExecutionMode::Sequential => SchedulePolicy::Sequential,
            ExecutionMode::Parallel => SchedulePolicy::Parallel,
            ExecutionMode::Adaptive => {
                let workload = analyze_workload(compiled, input_data, &self.classifier);
                let policy = choose_policy(&workload, compiled);
                tracing::info!(
                    "adaptive mode picked {} (complexity {}, recommended {}, {} steps in {} levels)",
                    policy,
                    workload.complexity,
                    workload.recommended_backend,
                    workload.step_count,
                    workload.level_count
                );
                policy
            }
        }
    }

    async fn run(
        &self,
        compiled: &CompiledPlan,
        input_data: &Map<String, Value>,
        mode: ExecutionMode,
    ) -> WorkflowResult {
        let run_id = Uuid::new_v4().to_string();
        let start = Instant::now();
        let policy = self.pick_policy(mode, compiled, input_data);

        self.emit(RenderEvent::RunStart {
            run_id: run_id.clone(),
            total_steps: compiled.len(),
            strategy: policy.to_string(),
        });
        self.emit(RenderEvent::Plan {
            run_id: run_id.clone(),
            levels: compiled.levels.clone(),
        });

        let tracker = StepTracker::new(&compiled.order);
        let mut results: BTreeMap<String, LayerResult> = BTreeMap::new();

        match policy {
            SchedulePolicy::Sequential => {
                self.run_sequential(
                    &run_id,
                    compiled,
                    input_data,
                    &compiled.order,
                    self.config.abort_on_error,
                    &tracker,
                    &mut results,
                )
                .await;
            }
            SchedulePolicy::Parallel => {
                self.run_levels(&run_id, compiled, input_data, &compiled.levels, &tracker, &mut results)
                    .await;
            }
            SchedulePolicy::Hybrid { lead } => {
                let (first, rest) = hybrid_groups(compiled, lead);
                self.run_sequential(&run_id, compiled, input_data, &first, false, &tracker, &mut results)
                    .await;
                self.run_levels(&run_id, compiled, input_data, &rest, &tracker, &mut results)
                    .await;
            }
        }

        let result = aggregate(
            &compiled.order,
            results,
            tracker.into_inner(),
            start.elapsed(),
            Some(policy.to_string()),
        );

        tracing::info!("workflow {} finished: {}", run_id, result.summary);
        self.emit(RenderEvent::RunEnd {
            run_id,
            result: result.clone(),
        });
        result
    }

    async fn run_sequential(
        &self,
        run_id: &str,
        compiled: &CompiledPlan,
        input_data: &Map<String, Value>,
        ids: &[String],
        abort_on_error: bool,
        tracker: &StepTracker,
        results: &mut BTreeMap<String, LayerResult>,
    ) {
        let mut aborted_by: Option<String> = None;

        for id in ids {
            let Some(step) = compiled.step(id) else {
                continue;
            };

            if let Some(failed) = &aborted_by {
                let message = format!("not executed: aborted after step '{failed}' failed");
                results.insert(id.clone(), LayerResult::failed(Some(step.backend), message));
                tracker.set(id, StepState::FailedTerminal);
                continue;
            }

            let input = resolve_input(&merge_defaults(&step.input, input_data), results);
            let outcome = self.execute_step(run_id, compiled, step, input, tracker).await;

            if abort_on_error && outcome.state == StepState::FailedTerminal {
                tracing::warn!("aborting sequential run after step '{}' failed", id);
                aborted_by = Some(id.clone());
            }
            results.insert(outcome.id, outcome.result);
        }
    }

    async fn run_levels(
        &self,
        run_id: &str,
        compiled: &CompiledPlan,
        input_data: &Map<String, Value>,
        levels: &[Vec<String>],
        tracker: &StepTracker,
        results: &mut BTreeMap<String, LayerResult>,
    ) {
        for (level, ids) in levels.iter().enumerate() {
            if level > 0 && self.config.batch_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.batch_delay_ms)).await;
            }

            self.emit(RenderEvent::LevelStart {
                run_id: run_id.to_string(),
                level,
                step_ids: ids.clone(),
            });

            // Every dependency finished in an earlier level, so inputs resolve up front.
            let mut prepared: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
            for id in ids {
                if let Some(step) = compiled.step(id) {
                    let input = resolve_input(&merge_defaults(&step.input, input_data), results);
                    prepared.insert(id.clone(), input);
                }
            }

            let max_parallel = self.level_concurrency(compiled, ids);
            tracing::debug!(
                "level {} ({} steps, concurrency {})",
                level,
                ids.len(),
                max_parallel
            );

            let prepared = &prepared;
            let outcomes = execute_level(ids, max_parallel, |id| async move {
                let step = compiled.step(&id)?;
                let input = prepared.get(&id).cloned().unwrap_or_default();
                Some(self.execute_step(run_id, compiled, step, input, tracker).await)
            })
            .await;

            for outcome in outcomes.into_iter().flatten() {
                results.insert(outcome.id, outcome.result);
            }
        }
    }

    /// Run one step, falling back to its declared substitute on failure.
    async fn execute_step(
        &self,
        run_id: &str,
        compiled: &CompiledPlan,
        step: &WorkflowStep,
        input: Map<String, Value>,
        tracker: &StepTracker,
    ) -> StepOutcome {
        tracker.set(&step.id, StepState::Running);
        self.emit(RenderEvent::StepStart {
            run_id: run_id.to_string(),
            step_id: step.id.clone(),
        });

        let result = self.steps.run_step(step, input.clone()).await;

        let (result, state) = if result.is_effective_success() {
            (result, StepState::Succeeded)
        } else if let Some(fallback) = find_fallback(&compiled.plan, step) {
            self.emit(RenderEvent::FallbackActivated {
                run_id: run_id.to_string(),
                step_id: step.id.clone(),
                substitute_id: fallback.substitute.id.clone(),
            });
            match run_fallback(&self.steps, &fallback, &input, &result).await {
                Some(recovered) => (recovered, StepState::FailedRecovered),
                None => (result, StepState::FailedTerminal),
            }
        } else {
            (result, StepState::FailedTerminal)
        };

        if state == StepState::FailedTerminal {
            tracing::warn!(
                "step '{}' failed: {}",
                step.id,
                result.error.as_deref().unwrap_or("no usable data")
            );
        }

        tracker.set(&step.id, state);
        self.emit(RenderEvent::StepComplete {
            run_id: run_id.to_string(),
            step_id: step.id.clone(),
            state,
            result: result.clone(),
        });

        StepOutcome {
            id: step.id.clone(),
            result,
            state,
        }
    }

    fn level_concurrency(&self, compiled: &CompiledPlan, ids: &[String]) -> usize {
        let base = self.config.concurrency.base_concurrency.max(1);
        let Some(strategy) = &self.concurrency_strategy else {
            return base;
        };
        let context = ConcurrencyContext {
            base_concurrency: base,
            level_size: ids.len(),
            backends: ids
                .iter()
                .filter_map(|id| compiled.step(id).map(|s| s.backend))
                .collect(),
        };
        strategy.calculate_concurrency(&context).max(1)
    }

    fn emit(&self, event: RenderEvent) {
        if let Some(renderer) = &self.renderer {
            renderer.render(&event);
        }
    }
}

impl ExecutionEngineBuilder {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self {
            registry,
            config: ExecutionConfig::default(),
            admission: Arc::new(Unlimited),
            cache: None,
            classifier: TaskClassifier::default(),
            renderer: None,
            retry_strategy: None,
            concurrency_strategy: None,
        }
    }

    pub fn config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn admission(mut self, admission: Arc<dyn AdmissionControl>) -> Self {
        self.admission = admission;
        self
    }

    pub fn cache(mut self, cache: Arc<SearchCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn classifier(mut self, classifier: TaskClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn OutputRendererPlugin>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn retry_strategy(mut self, strategy: Arc<dyn RetryStrategyPlugin>) -> Self {
        self.retry_strategy = Some(strategy);
        self
    }

    pub fn concurrency_strategy(mut self, strategy: Arc<dyn ConcurrencyStrategyPlugin>) -> Self {
        self.concurrency_strategy = Some(strategy);
        self
    }

    pub fn build(self) -> ExecutionEngine {
        let steps = StepExecutor::new(
            self.registry,
            self.admission,
            self.cache,
            self.retry_strategy,
            Duration::from_millis(self.config.step_timeout_ms),
        );
        ExecutionEngine {
            steps,
            config: self.config,
            classifier: self.classifier,
            renderer: self.renderer,
            concurrency_strategy: self.concurrency_strategy,
        }
    }
}
