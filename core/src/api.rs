//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `tribridge_core::api` instead of reaching into internal modules.

pub use crate::backend::{Backend, BackendKind, BackendRegistry, Capability, CostProfile};
pub use crate::cache::{
    CacheConfig, CacheRequest, CacheStats, SearchCache, GROUNDED_SEARCH_ACTION,
};
pub use crate::classifier::{
    Complexity, ComplexityScore, Lexicon, RoutingRule, TaskAnalysis, TaskClassifier,
    DEFAULT_LEXICON, LEXICON_VERSION,
};
pub use crate::config::{
    apply_env_overrides, load_default, load_from_path, AiStudioConfig, AppConfig,
    BackendsConfig, CodeCliConfig, LoggingConfig, RouterConfig,
};
pub use crate::error::{
    BackendError, CliError, ErrorCode, RouterError, TransientKind, WorkflowError,
};
pub use crate::executor::traits::{
    ConcurrencyContext, ConcurrencyStrategyPlugin, OutputRendererPlugin, RenderEvent,
    RetryStrategyPlugin,
};
pub use crate::executor::types::{
    ConcurrencyConfig, ExecutionConfig, ExecutionMode, ExecutionPlan, FallbackInfo,
    FallbackStrategy, FileKind, FileRef, LayerMetadata, LayerResult, RawPlan, RawStep,
    RetryConfig, StepFailure, StepState, Task, WorkflowMetadata, WorkflowResult, WorkflowStep,
};
pub use crate::executor::{
    ExecutionEngine, ExecutionEngineBuilder, SchedulePolicy, StepExecutor, WorkflowOptions,
    WorkloadAnalysis,
};
pub use crate::planner::{
    compile, compile_raw, compile_template, CompiledPlan, PlanEstimate, PlanSummary,
    TemplateContext, WorkflowKind, MAX_CONCURRENT_PER_LEVEL, MAX_STEPS,
};
pub use crate::quota::{
    Admission, AdmissionControl, BackendQuota, CallRecord, QuotaConfig, QuotaTracker,
    Unlimited, UsageStats,
};
pub use crate::router::{contains_file_path, fallback_order, Router, FAST_PATH_STEP_ID};
