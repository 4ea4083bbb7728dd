use tribridge_core::api::{OutputRendererPlugin, RenderEvent, StepState};

/// Human-readable progress lines on stderr, leaving stdout for the result.
pub struct TextRendererPlugin {
    ascii_only: bool,
}

impl TextRendererPlugin {
    pub fn new(ascii_only: bool) -> Self {
        Self { ascii_only }
    }

    fn format_event(&self, event: &RenderEvent) -> String {
        match event {
            RenderEvent::RunStart {
                run_id,
                total_steps,
                strategy,
            } => format!(
                "RUN START {} (steps: {}, strategy: {})",
                run_id, total_steps, strategy
            ),
            RenderEvent::Plan { run_id, levels } => {
                let mut out = format!("PLAN {}:", run_id);
                for (idx, level) in levels.iter().enumerate() {
                    out.push_str(&format!("\n  level {}: {}", idx, level.join(", ")));
                }
                out
            }
            RenderEvent::LevelStart {
                run_id,
                level,
                step_ids,
            } => format!(
                "LEVEL START {} (level {}, steps: {})",
                run_id,
                level,
                step_ids.len()
            ),
            RenderEvent::StepStart { run_id, step_id } => {
                format!("STEP START {} (step {})", run_id, step_id)
            }
            RenderEvent::FallbackActivated {
                run_id,
                step_id,
                substitute_id,
            } => format!(
                "FALLBACK {} (step {} -> {})",
                run_id, step_id, substitute_id
            ),
            RenderEvent::StepComplete {
                run_id,
                step_id,
                state,
                result,
            } => {
                let status = match (state, self.ascii_only) {
                    (StepState::Succeeded, true) => "OK",
                    (StepState::Succeeded, false) => "✓ SUCCESS",
                    (StepState::FailedRecovered, true) => "RECOVERED",
                    (StepState::FailedRecovered, false) => "↻ RECOVERED",
                    (_, true) => "FAIL",
                    (_, false) => "✗ FAILED",
                };
                let backend = result
                    .metadata
                    .backend
                    .map(|b| b.to_string())
                    .unwrap_or_else(|| "-".to_string());
                format!(
                    "STEP END {} (step {}, status {}, backend {}, duration {}ms, attempts {})",
                    run_id,
                    step_id,
                    status,
                    backend,
                    result.metadata.duration_ms,
                    result.metadata.attempts
                )
            }
            RenderEvent::RunEnd { run_id, result } => format!(
                "RUN END {} ({}, duration {}ms)",
                run_id, result.summary, result.metadata.duration_ms
            ),
        }
    }
}

impl OutputRendererPlugin for TextRendererPlugin {
    fn name(&self) -> &str {
        "text-renderer"
    }

    fn render(&self, event: &RenderEvent) {
        eprintln!("{}", self.format_event(event));
    }
}
