//! Workflow execution: dependency graph, schedulers, step execution,
//! fallback and aggregation.
//!
//! # Architecture
//!
//! ```text
//! CompiledPlan (planner)
//!   ↓
//! ExecutionEngine::execute() ── outer deadline
//!   ↓
//! pick_policy() → Sequential | Parallel (levels) | Hybrid (lead group, then levels)
//!   ↓
//! per step: merge inputData → resolve "@id.path" → StepExecutor::run_step()
//!   ↓                                   (cache, admission, retry, step deadline)
//! fallback on failure ("<backend>_unavailable")
//!   ↓
//! aggregate() → WorkflowResult
//! ```

pub mod aggregate;
mod engine;
pub mod fallback;
pub mod graph;
pub mod resolve;
mod scheduler;
mod step;
pub mod traits;
pub mod types;
pub mod workload;

pub use aggregate::aggregate;
pub use engine::{ExecutionEngine, ExecutionEngineBuilder, WorkflowOptions};
pub use graph::TaskGraph;
pub use scheduler::execute_level;
pub use step::StepExecutor;
pub use types::{ExecutionConfig, ExecutionMode, LayerResult, WorkflowResult};
pub use workload::{SchedulePolicy, WorkloadAnalysis};
