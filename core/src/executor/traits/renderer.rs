use crate::executor::types::{LayerResult, StepState, WorkflowResult};

/// 输出渲染器插件（接收工作流事件）
pub trait OutputRendererPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn render(&self, event: &RenderEvent);
}

/// 渲染事件（统一事件类型）
#[derive(Debug, Clone)]
pub enum RenderEvent {
    RunStart {
        run_id: String,
        total_steps: usize,
        strategy: String,
    },
    Plan {
        run_id: String,
        levels: Vec<Vec<String>>,
    },
    LevelStart {
        run_id: String,
        level: usize,
        step_ids: Vec<String>,
    },
    StepStart {
        run_id: String,
        step_id: String,
    },
    FallbackActivated {
        run_id: String,
        step_id: String,
        substitute_id: String,
    },
    StepComplete {
        run_id: String,
        step_id: String,
        state: StepState,
        result: LayerResult,
    },
    RunEnd {
        run_id: String,
        result: WorkflowResult,
    },
}
