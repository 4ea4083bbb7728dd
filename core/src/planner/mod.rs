//! Plan compiler: validates a step graph and derives its execution order,
//! capped parallel levels and static estimate.

pub mod estimate;
pub mod templates;

use serde::Serialize;

use crate::backend::BackendKind;
use crate::error::WorkflowError;
use crate::executor::graph::{cap_levels, TaskGraph};
use crate::executor::types::{ExecutionPlan, RawPlan, WorkflowStep};

pub use estimate::{estimate_plan, estimate_step, PlanEstimate, StepEstimate};
pub use templates::{TemplateContext, WorkflowKind};

/// Hard cap on steps in one plan.
pub const MAX_STEPS: usize = 50;
/// Upper bound on steps grouped into one parallel level.
pub const MAX_CONCURRENT_PER_LEVEL: usize = 3;

/// A validated plan ready for any scheduler.
#[derive(Debug, Clone)]
pub struct CompiledPlan {
    pub plan: ExecutionPlan,
    /// Topological order for one-at-a-time execution.
    pub order: Vec<String>,
    /// Dependency levels, each at most [`MAX_CONCURRENT_PER_LEVEL`] wide.
    pub levels: Vec<Vec<String>>,
    pub estimate: PlanEstimate,
    pub(crate) graph: TaskGraph<WorkflowStep>,
}

impl CompiledPlan {
    pub fn step(&self, id: &str) -> Option<&WorkflowStep> {
        self.graph.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn graph(&self) -> &TaskGraph<WorkflowStep> {
        &self.graph
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            order: self.order.clone(),
            levels: self.levels.clone(),
            estimate: self.estimate,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub order: Vec<String>,
    pub levels: Vec<Vec<String>>,
    pub estimate: PlanEstimate,
}

/// Compile a typed plan.
pub fn compile(plan: ExecutionPlan) -> Result<CompiledPlan, WorkflowError> {
    if plan.steps.is_empty() {
        return Err(WorkflowError::EmptyPlan);
    }
    if plan.steps.len() > MAX_STEPS {
        return Err(WorkflowError::TooManySteps {
            count: plan.steps.len(),
            max: MAX_STEPS,
        });
    }
    for (index, step) in plan.steps.iter().enumerate() {
        if step.id.trim().is_empty() {
            return Err(WorkflowError::MissingField { index, field: "id" });
        }
        if step.action.trim().is_empty() {
            return Err(WorkflowError::MissingField {
                index,
                field: "action",
            });
        }
    }

    let graph = TaskGraph::from_tasks(&plan.steps)?;
    graph.validate()?;
    let stages = graph.topological_sort()?;
    let order: Vec<String> = stages.iter().flatten().cloned().collect();
    let levels = cap_levels(stages, MAX_CONCURRENT_PER_LEVEL);
    let estimate = estimate_plan(&graph, &order);

    for (key, strategy) in &plan.fallback_strategies {
        if !graph.nodes.contains_key(&strategy.replace) {
            tracing::warn!(
                "fallback '{}' replaces unknown step '{}'; it will never trigger",
                key,
                strategy.replace
            );
        }
    }

    tracing::debug!(
        "compiled plan: {} steps, {} levels, critical path {}ms",
        order.len(),
        levels.len(),
        estimate.critical_path_ms
    );

    Ok(CompiledPlan {
        plan,
        order,
        levels,
        estimate,
        graph,
    })
}

/// Compile a caller-supplied plan whose fields are not yet checked.
pub fn compile_raw(raw: RawPlan) -> Result<CompiledPlan, WorkflowError> {
    if raw.steps.is_empty() {
        return Err(WorkflowError::EmptyPlan);
    }
    if raw.steps.len() > MAX_STEPS {
        return Err(WorkflowError::TooManySteps {
            count: raw.steps.len(),
            max: MAX_STEPS,
        });
    }

    let mut steps = Vec::with_capacity(raw.steps.len());
    for (index, raw_step) in raw.steps.into_iter().enumerate() {
        let id = required(raw_step.id, index, "id")?;
        let action = required(raw_step.action, index, "action")?;
        let backend_name = required(raw_step.backend, index, "backend")?;
        let backend: BackendKind =
            backend_name
                .parse()
                .map_err(|_| WorkflowError::InvalidBackend {
                    step_id: id.clone(),
                    backend: backend_name.clone(),
                })?;

        steps.push(WorkflowStep {
            id,
            backend,
            action,
            input: raw_step.input,
            depends_on: raw_step.depends_on,
            timeout_ms: raw_step.timeout_ms,
        });
    }

    compile(ExecutionPlan {
        steps,
        fallback_strategies: raw.fallback_strategies,
    })
}

/// Instantiate and compile a canned workflow.
pub fn compile_template(
    kind: WorkflowKind,
    ctx: &TemplateContext,
) -> Result<CompiledPlan, WorkflowError> {
    compile(templates::build(kind, ctx))
}

fn required(
    value: Option<String>,
    index: usize,
    field: &'static str,
) -> Result<String, WorkflowError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(WorkflowError::MissingField { index, field }),
    }
}
