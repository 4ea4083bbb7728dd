use std::sync::Arc;

use tribridge_core::api::{
    AdmissionControl, AppConfig, BackendKind, BackendRegistry, BackendsConfig, CacheConfig,
    ConcurrencyConfig, ConcurrencyStrategyPlugin, ExecutionEngine, OutputRendererPlugin,
    QuotaConfig, QuotaTracker, RetryConfig, RetryStrategyPlugin, Router, SearchCache, Unlimited,
};

use crate::backend::{AiStudioBackend, CodeCliBackend};
use crate::executor::{
    BackendAwareConcurrencyPlugin, ExponentialBackoffPlugin, FixedConcurrencyPlugin,
    JsonlRendererPlugin, LinearRetryPlugin, TextRendererPlugin,
};

/// Every backend is registered; disabled ones fail initialization and are
/// skipped by routing.
pub fn build_registry(cfg: &BackendsConfig) -> BackendRegistry {
    BackendRegistry::new()
        .with(Arc::new(CodeCliBackend::new(
            BackendKind::Claude,
            cfg.claude.clone(),
        )))
        .with(Arc::new(CodeCliBackend::new(
            BackendKind::Gemini,
            cfg.gemini.clone(),
        )))
        .with(Arc::new(AiStudioBackend::new(cfg.aistudio.clone())))
}

pub fn build_retry_strategy(cfg: &RetryConfig) -> Option<Arc<dyn RetryStrategyPlugin>> {
    match cfg.strategy.as_str() {
        "none" | "off" => None,
        "linear" => Some(Arc::new(LinearRetryPlugin::new(cfg.clone()))),
        "exponential-backoff" | "exponential" => {
            Some(Arc::new(ExponentialBackoffPlugin::new(cfg.clone())))
        }
        other => {
            tracing::warn!("unknown retry strategy '{}', using exponential-backoff", other);
            Some(Arc::new(ExponentialBackoffPlugin::new(cfg.clone())))
        }
    }
}

pub fn build_concurrency_strategy(cfg: &ConcurrencyConfig) -> Arc<dyn ConcurrencyStrategyPlugin> {
    match cfg.strategy.as_str() {
        "backend-aware" | "backend_aware" => Arc::new(BackendAwareConcurrencyPlugin::new(cfg.clone())),
        "fixed" => Arc::new(FixedConcurrencyPlugin::new(cfg.base_concurrency)),
        other => {
            tracing::warn!("unknown concurrency strategy '{}', using fixed", other);
            Arc::new(FixedConcurrencyPlugin::new(cfg.base_concurrency))
        }
    }
}

pub fn build_admission(cfg: &QuotaConfig) -> Arc<dyn AdmissionControl> {
    if cfg.enabled {
        Arc::new(QuotaTracker::new(cfg.clone()))
    } else {
        Arc::new(Unlimited)
    }
}

pub fn build_cache(cfg: &CacheConfig) -> Option<Arc<SearchCache>> {
    cfg.enabled.then(|| Arc::new(SearchCache::from_config(cfg)))
}

/// `jsonl` streams events to stdout, `text` writes progress to stderr.
pub fn build_renderer(format: &str) -> Option<Arc<dyn OutputRendererPlugin>> {
    match format {
        "jsonl" => Some(Arc::new(JsonlRendererPlugin::new(false))),
        "text" => Some(Arc::new(TextRendererPlugin::new(false))),
        _ => None,
    }
}

pub fn build_engine(
    cfg: &AppConfig,
    renderer: Option<Arc<dyn OutputRendererPlugin>>,
) -> ExecutionEngine {
    let mut builder = ExecutionEngine::builder(Arc::new(build_registry(&cfg.backends)))
        .config(cfg.executor.clone())
        .admission(build_admission(&cfg.quota))
        .concurrency_strategy(build_concurrency_strategy(&cfg.executor.concurrency));

    if let Some(strategy) = build_retry_strategy(&cfg.executor.retry) {
        builder = builder.retry_strategy(strategy);
    }
    if let Some(cache) = build_cache(&cfg.cache) {
        builder = builder.cache(cache);
    }
    if let Some(renderer) = renderer {
        builder = builder.renderer(renderer);
    }
    builder.build()
}

pub fn build_router(cfg: &AppConfig, renderer: Option<Arc<dyn OutputRendererPlugin>>) -> Router {
    Router::new(build_engine(cfg, renderer), cfg.router.clone())
}
