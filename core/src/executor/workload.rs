//! Workload analysis behind the adaptive scheduling mode.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::backend::BackendKind;
use crate::classifier::{Complexity, RoutingRule, TaskClassifier};
use crate::executor::types::{FileRef, Task};
use crate::planner::CompiledPlan;

const SEARCH_ACTIONS: &[&str] = &["search", "grounded_search", "web_search", "lookup", "research"];
const DOCUMENT_ACTIONS: &[&str] = &["extract", "ocr", "parse", "transcribe"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "policy")]
pub enum SchedulePolicy {
    Sequential,
    Parallel,
    /// Steps on `lead` (and what they need) first, the rest concurrently after.
    Hybrid { lead: BackendKind },
}

impl fmt::Display for SchedulePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => f.write_str("sequential"),
            Self::Parallel => f.write_str("parallel"),
            Self::Hybrid { lead } => write!(f, "hybrid({lead})"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkloadAnalysis {
    pub file_count: usize,
    pub prompt_chars: usize,
    pub step_count: usize,
    pub level_count: usize,
    pub generation: bool,
    pub search: bool,
    pub document: bool,
    pub complexity: Complexity,
    pub recommended_backend: BackendKind,
    pub parallel_speedup: f64,
}

impl WorkloadAnalysis {
    pub fn has_files(&self) -> bool {
        self.file_count > 0
    }

    pub fn is_reasoning_heavy(&self) -> bool {
        self.complexity == Complexity::High
            || (self.recommended_backend == BackendKind::Claude && !self.generation && !self.search)
    }
}

pub fn analyze_workload(
    compiled: &CompiledPlan,
    input_data: &Map<String, Value>,
    classifier: &TaskClassifier,
) -> WorkloadAnalysis {
    let prompt = workload_prompt(compiled, input_data);
    let files = workload_files(compiled, input_data);
    let task = Task::new(prompt.clone()).with_files(files);
    let analysis = classifier.classify(&task, None);

    let has_action = |table: &[&str]| {
        compiled
            .plan
            .steps
            .iter()
            .any(|s| table.contains(&s.action.to_ascii_lowercase().as_str()))
    };

    let generation = analysis.rule == RoutingRule::GenerationIntent
        || compiled
            .plan
            .steps
            .iter()
            .any(|s| s.action.to_ascii_lowercase().starts_with("generat"));
    let search = analysis.rule == RoutingRule::CurrentInformation || has_action(SEARCH_ACTIONS);
    let document = analysis.rule == RoutingRule::DocumentFiles
        || task.files.iter().any(|f| f.kind.is_document())
        || has_action(DOCUMENT_ACTIONS);

    WorkloadAnalysis {
        file_count: task.files.len(),
        prompt_chars: prompt.chars().count(),
        step_count: compiled.len(),
        level_count: compiled.levels.len(),
        generation,
        search,
        document,
        complexity: analysis.complexity,
        recommended_backend: analysis.backend,
        parallel_speedup: compiled.estimate.parallel_speedup(),
    }
}

pub fn choose_policy(workload: &WorkloadAnalysis, compiled: &CompiledPlan) -> SchedulePolicy {
    // A pure chain gains nothing from concurrency.
    if workload.is_reasoning_heavy() || workload.level_count >= workload.step_count {
        return SchedulePolicy::Sequential;
    }
    if workload.complexity == Complexity::Low {
        return SchedulePolicy::Parallel;
    }

    let lead = workload.recommended_backend;
    let lead_steps = compiled
        .plan
        .steps
        .iter()
        .filter(|s| s.backend == lead)
        .count();
    if lead_steps > 0 && lead_steps < workload.step_count {
        SchedulePolicy::Hybrid { lead }
    } else {
        SchedulePolicy::Parallel
    }
}

/// Split a plan for hybrid execution: the `lead` steps plus everything they
/// transitively depend on, in topological order, then the remaining levels.
pub fn hybrid_groups(compiled: &CompiledPlan, lead: BackendKind) -> (Vec<String>, Vec<Vec<String>>) {
    let graph = compiled.graph();
    let mut first: HashSet<String> = HashSet::new();
    for id in &compiled.order {
        if graph.nodes.get(id).is_some_and(|s| s.backend == lead) {
            first.insert(id.clone());
            first.extend(graph.ancestors(id));
        }
    }

    let sequential: Vec<String> = compiled
        .order
        .iter()
        .filter(|id| first.contains(*id))
        .cloned()
        .collect();
    let rest: Vec<Vec<String>> = compiled
        .levels
        .iter()
        .map(|level| {
            level
                .iter()
                .filter(|id| !first.contains(*id))
                .cloned()
                .collect::<Vec<_>>()
        })
        .filter(|level| !level.is_empty())
        .collect();

    (sequential, rest)
}

fn workload_prompt(compiled: &CompiledPlan, input_data: &Map<String, Value>) -> String {
    const PROMPT_KEYS: [&str; 4] = ["prompt", "instructions", "query", "content"];

    let literal = |map: &Map<String, Value>| {
        PROMPT_KEYS
            .iter()
            .filter_map(|k| map.get(*k).and_then(Value::as_str))
            .find(|s| !s.starts_with('@'))
            .map(str::to_string)
    };

    literal(input_data)
        .or_else(|| compiled.plan.steps.iter().find_map(|s| literal(&s.input)))
        .unwrap_or_default()
}

fn workload_files(compiled: &CompiledPlan, input_data: &Map<String, Value>) -> Vec<FileRef> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();
    let sources = std::iter::once(input_data).chain(compiled.plan.steps.iter().map(|s| &s.input));
    for map in sources {
        let Some(items) = map.get("files").and_then(Value::as_array) else {
            continue;
        };
        for item in items {
            let file = match item {
                Value::String(path) => Some(FileRef::from_path(path.clone())),
                Value::Object(_) => serde_json::from_value::<FileRef>(item.clone()).ok(),
                _ => None,
            };
            if let Some(file) = file {
                if seen.insert(file.path.clone()) {
                    files.push(file);
                }
            }
        }
    }
    files
}
