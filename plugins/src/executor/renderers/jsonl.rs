use chrono::Local;
use serde_json::{json, Value};
use tribridge_core::api::{OutputRendererPlugin, RenderEvent};

/// One JSON object per workflow event on stdout.
pub struct JsonlRendererPlugin {
    pretty_print: bool,
}

impl JsonlRendererPlugin {
    pub fn new(pretty_print: bool) -> Self {
        Self { pretty_print }
    }

    fn event_to_json(&self, event: &RenderEvent) -> Value {
        let ts = Local::now().to_rfc3339();
        match event {
            RenderEvent::RunStart {
                run_id,
                total_steps,
                strategy,
            } => json!({
                "v": 1,
                "event_type": "run.start",
                "ts": ts,
                "run_id": run_id,
                "metadata": {
                    "total_steps": total_steps,
                    "strategy": strategy,
                }
            }),
            RenderEvent::Plan { run_id, levels } => {
                let total_steps: usize = levels.iter().map(|l| l.len()).sum();
                json!({
                    "v": 1,
                    "event_type": "workflow.plan",
                    "ts": ts,
                    "run_id": run_id,
                    "metadata": {
                        "levels": levels,
                        "total_steps": total_steps,
                    }
                })
            }
            RenderEvent::LevelStart {
                run_id,
                level,
                step_ids,
            } => json!({
                "v": 1,
                "event_type": "level.start",
                "ts": ts,
                "run_id": run_id,
                "metadata": {
                    "level": level,
                    "steps": step_ids,
                }
            }),
            RenderEvent::StepStart { run_id, step_id } => json!({
                "v": 1,
                "event_type": "step.start",
                "ts": ts,
                "run_id": run_id,
                "step_id": step_id,
            }),
            RenderEvent::FallbackActivated {
                run_id,
                step_id,
                substitute_id,
            } => json!({
                "v": 1,
                "event_type": "step.fallback",
                "ts": ts,
                "run_id": run_id,
                "step_id": step_id,
                "metadata": {
                    "substitute": substitute_id,
                }
            }),
            RenderEvent::StepComplete {
                run_id,
                step_id,
                state,
                result,
            } => json!({
                "v": 1,
                "event_type": "step.end",
                "ts": ts,
                "run_id": run_id,
                "step_id": step_id,
                "state": state,
                "metadata": {
                    "backend": result.metadata.backend,
                    "duration_ms": result.metadata.duration_ms,
                    "attempts": result.metadata.attempts,
                    "cached": result.metadata.cached,
                    "success": result.is_effective_success(),
                    "error": result.error,
                }
            }),
            RenderEvent::RunEnd { run_id, result } => json!({
                "v": 1,
                "event_type": "run.end",
                "ts": ts,
                "run_id": run_id,
                "metadata": {
                    "success": result.success,
                    "summary": result.summary,
                    "total_steps": result.metadata.total_steps,
                    "completed": result.metadata.steps_completed,
                    "failed": result.metadata.steps_failed,
                    "duration_ms": result.metadata.duration_ms,
                }
            }),
        }
    }
}

impl OutputRendererPlugin for JsonlRendererPlugin {
    fn name(&self) -> &str {
        "jsonl-renderer"
    }

    fn render(&self, event: &RenderEvent) {
        let value = self.event_to_json(event);
        if self.pretty_print {
            println!("{}", serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".into()));
        } else {
            println!("{}", serde_json::to_string(&value).unwrap_or_else(|_| "{}".into()));
        }
    }
}
