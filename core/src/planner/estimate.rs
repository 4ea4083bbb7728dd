//! Static per-step cost/duration table.
//!
//! Figures are planning heuristics only: they feed the adaptive strategy
//! picker and the run metadata, never admission decisions.

use std::collections::HashMap;

use serde::Serialize;

use crate::backend::BackendKind;
use crate::executor::graph::TaskGraph;
use crate::executor::types::{millis, WorkflowStep};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepEstimate {
    pub cost: f64,
    pub duration_ms: u64,
}

// (backend, action, cost, duration_ms)
const ESTIMATES: &[(BackendKind, &str, f64, u64)] = &[
    (BackendKind::Claude, "analyze", 0.020, 25_000),
    (BackendKind::Claude, "plan", 0.010, 12_000),
    (BackendKind::Claude, "synthesize", 0.020, 20_000),
    (BackendKind::Claude, "convert", 0.015, 18_000),
    (BackendKind::Claude, "structure", 0.012, 15_000),
    (BackendKind::Claude, "review", 0.018, 22_000),
    (BackendKind::Claude, "code", 0.025, 30_000),
    (BackendKind::Gemini, "search", 0.002, 5_000),
    (BackendKind::Gemini, "grounded_search", 0.003, 6_000),
    (BackendKind::Gemini, "summarize", 0.002, 4_000),
    (BackendKind::Gemini, "extract", 0.004, 8_000),
    (BackendKind::Gemini, "plan", 0.002, 5_000),
    (BackendKind::AiStudio, "extract", 0.008, 12_000),
    (BackendKind::AiStudio, "ocr", 0.010, 15_000),
    (BackendKind::AiStudio, "describe", 0.006, 8_000),
    (BackendKind::AiStudio, "generate", 0.040, 30_000),
    (BackendKind::AiStudio, "synthesize", 0.008, 10_000),
];

/// Estimate for one (backend, action); unknown actions use the backend's
/// static profile.
pub fn estimate_step(backend: BackendKind, action: &str) -> StepEstimate {
    let action = action.to_ascii_lowercase();
    ESTIMATES
        .iter()
        .find(|(b, a, _, _)| *b == backend && *a == action)
        .map(|(_, _, cost, duration_ms)| StepEstimate {
            cost: *cost,
            duration_ms: *duration_ms,
        })
        .unwrap_or_else(|| {
            let profile = backend.profile();
            StepEstimate {
                cost: profile.cost_per_call,
                duration_ms: millis(profile.typical_latency),
            }
        })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PlanEstimate {
    pub total_cost: f64,
    /// Sum of all step durations (one-at-a-time execution).
    pub sequential_duration_ms: u64,
    /// Longest dependency chain (unbounded parallelism).
    pub critical_path_ms: u64,
}

impl PlanEstimate {
    /// Expected gain from running independent steps concurrently.
    pub fn parallel_speedup(&self) -> f64 {
        if self.critical_path_ms == 0 {
            1.0
        } else {
            self.sequential_duration_ms as f64 / self.critical_path_ms as f64
        }
    }
}

pub fn estimate_plan(graph: &TaskGraph<WorkflowStep>, order: &[String]) -> PlanEstimate {
    let mut finish: HashMap<&str, u64> = HashMap::new();
    let mut estimate = PlanEstimate::default();

    for id in order {
        let Some(step) = graph.nodes.get(id) else {
            continue;
        };
        let est = estimate_step(step.backend, &step.action);
        let ready_at = graph
            .dependencies_of(id)
            .iter()
            .filter_map(|dep| finish.get(dep.as_str()).copied())
            .max()
            .unwrap_or(0);
        let done = ready_at + est.duration_ms;
        finish.insert(id.as_str(), done);

        estimate.total_cost += est.cost;
        estimate.sequential_duration_ms += est.duration_ms;
        estimate.critical_path_ms = estimate.critical_path_ms.max(done);
    }

    estimate
}
