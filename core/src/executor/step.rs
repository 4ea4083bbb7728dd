use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};

use crate::backend::{BackendKind, BackendRegistry};
use crate::cache::{is_cacheable, CacheRequest, SearchCache, GROUNDED_SEARCH_ACTION};
use crate::error::BackendError;
use crate::quota::{Admission, AdmissionControl, CallRecord};

use super::traits::RetryStrategyPlugin;
use super::types::{millis, LayerResult, Task, WorkflowStep};

/// Dispatches one task to one backend and normalizes the outcome.
///
/// Shared by the workflow schedulers and the router's ad hoc path.
#[derive(Clone)]
pub struct StepExecutor {
    registry: Arc<BackendRegistry>,
    admission: Arc<dyn AdmissionControl>,
    cache: Option<Arc<SearchCache>>,
    retry_strategy: Option<Arc<dyn RetryStrategyPlugin>>,
    default_timeout: Duration,
}

struct CallOutcome {
    result: Result<LayerResult, BackendError>,
    attempts: u32,
    elapsed: Duration,
}

impl StepExecutor {
    pub fn new(
        registry: Arc<BackendRegistry>,
        admission: Arc<dyn AdmissionControl>,
        cache: Option<Arc<SearchCache>>,
        retry_strategy: Option<Arc<dyn RetryStrategyPlugin>>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            admission,
            cache,
            retry_strategy,
            default_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    /// Run a task with the configured retry strategy.
    pub async fn call(&self, backend: BackendKind, task: &Task) -> Result<LayerResult, BackendError> {
        self.call_inner(backend, task, true, None).await.result
    }

    /// Like [`call`](Self::call), for an action-less task that was routed for a
    /// grounded lookup; it is keyed in the search cache as `grounded_search`.
    pub async fn call_grounded(&self, backend: BackendKind, task: &Task) -> Result<LayerResult, BackendError> {
        self.call_inner(backend, task, true, Some(GROUNDED_SEARCH_ACTION))
            .await
            .result
    }

    /// Run a workflow step. Failures come back as a failed [`LayerResult`].
    pub async fn run_step(&self, step: &WorkflowStep, input: Map<String, Value>) -> LayerResult {
        self.run(step, input, true).await
    }

    /// Single attempt, no retry. Used for fallback substitutes.
    pub async fn run_step_once(&self, step: &WorkflowStep, input: Map<String, Value>) -> LayerResult {
        self.run(step, input, false).await
    }

    async fn run(&self, step: &WorkflowStep, input: Map<String, Value>, retry: bool) -> LayerResult {
        let task = step.to_task(input);
        let outcome = self.call_inner(step.backend, &task, retry, None).await;
        let mut result = match outcome.result {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!("step '{}' failed on '{}': {}", step.id, step.backend, err);
                LayerResult::from_error(&err)
            }
        };
        result.metadata.attempts = outcome.attempts;
        if !result.metadata.cached {
            result.metadata.duration_ms = millis(outcome.elapsed);
        }
        result
    }

    async fn call_inner(
        &self,
        kind: BackendKind,
        task: &Task,
        retry: bool,
        implied_action: Option<&str>,
    ) -> CallOutcome {
        let start = Instant::now();

        let action = task.action.as_deref().or(implied_action);
        let lookup = self
            .cache
            .as_ref()
            .filter(|_| is_cacheable(kind, action))
            .and_then(|cache| CacheRequest::from_task(task, action).map(|req| (cache, req)));
        if let Some((cache, request)) = &lookup {
            if let Some(hit) = cache.get(request, kind) {
                let mut result = LayerResult::ok(kind, hit.content);
                result.metadata.cached = true;
                result.metadata.duration_ms = hit.latency_ms;
                return CallOutcome {
                    result: Ok(result),
                    attempts: 0,
                    elapsed: start.elapsed(),
                };
            }
        }

        let backend = match self.registry.ensure_ready(kind).await {
            Ok(backend) => backend,
            Err(err) => {
                return CallOutcome {
                    result: Err(err),
                    attempts: 0,
                    elapsed: start.elapsed(),
                }
            }
        };

        let deadline = task
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout);

        let max_attempts = if retry {
            self.retry_strategy
                .as_ref()
                .map(|strategy| strategy.max_attempts().max(1))
                .unwrap_or(1)
        } else {
            1
        };

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            if let Admission::Denied { retry_after } = self.admission.can_proceed(kind) {
                return CallOutcome {
                    result: Err(BackendError::QuotaExceeded {
                        backend: kind,
                        retry_after,
                    }),
                    attempts: attempt,
                    elapsed: start.elapsed(),
                };
            }

            let call_start = Instant::now();
            let raw = match tokio::time::timeout(deadline, backend.execute(task)).await {
                Ok(res) => res,
                Err(_) => Err(BackendError::timeout(kind, deadline)),
            };
            let outcome = raw.and_then(|res| validate_payload(kind, res));
            let latency = call_start.elapsed();

            self.admission.record(
                kind,
                &CallRecord {
                    success: outcome.is_ok(),
                    latency,
                    cost: outcome
                        .as_ref()
                        .map(|r| r.metadata.cost)
                        .unwrap_or_default(),
                    quota_exhausted_for: outcome.as_ref().err().and_then(|e| match e {
                        BackendError::QuotaExceeded { retry_after, .. } => Some(*retry_after),
                        _ => None,
                    }),
                },
            );

            let err = match outcome {
                Ok(mut result) => {
                    if result.metadata.backend.is_none() {
                        result.metadata.backend = Some(kind);
                    }
                    if result.metadata.cost == 0.0 {
                        result.metadata.cost = backend.cost(task);
                    }
                    if let Some((cache, request)) = &lookup {
                        cache.set(request, &result, kind, latency);
                    }
                    return CallOutcome {
                        result: Ok(result),
                        attempts: attempt,
                        elapsed: start.elapsed(),
                    };
                }
                Err(err) => err,
            };

            let Some(strategy) = self.retry_strategy.as_ref().filter(|_| attempt < max_attempts) else {
                return CallOutcome {
                    result: Err(err),
                    attempts: attempt,
                    elapsed: start.elapsed(),
                };
            };
            if !strategy.should_retry(attempt, &err) {
                return CallOutcome {
                    result: Err(err),
                    attempts: attempt,
                    elapsed: start.elapsed(),
                };
            }
            let Some(delay) = strategy.next_delay(attempt, &err) else {
                return CallOutcome {
                    result: Err(err),
                    attempts: attempt,
                    elapsed: start.elapsed(),
                };
            };

            tracing::debug!(
                "retrying '{}' in {:?} (attempt {}/{}): {}",
                kind,
                delay,
                attempt + 1,
                max_attempts,
                err
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// A backend claiming success with nothing usable is a failure.
fn validate_payload(kind: BackendKind, result: LayerResult) -> Result<LayerResult, BackendError> {
    if result.is_effective_success() {
        return Ok(result);
    }
    if result.success {
        return Err(BackendError::InvalidResult {
            backend: kind,
            reason: "backend reported success with an empty payload".to_string(),
        });
    }
    Err(BackendError::Other {
        backend: kind,
        message: result
            .error
            .unwrap_or_else(|| "backend reported failure without a message".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use crate::error::TransientKind;
    use crate::quota::Unlimited;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Fails with the queued errors, then succeeds.
    struct Flaky {
        kind: BackendKind,
        errors: Mutex<Vec<BackendError>>,
        calls: AtomicU32,
        payload: Value,
        delay: Duration,
    }

    impl Flaky {
        fn new(kind: BackendKind, errors: Vec<BackendError>) -> Self {
            Self {
                kind,
                errors: Mutex::new(errors),
                calls: AtomicU32::new(0),
                payload: json!({"text": "ok"}),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl Backend for Flaky {
        fn kind(&self) -> BackendKind {
            self.kind
        }
        async fn initialize(&self) -> Result<(), BackendError> {
            Ok(())
        }
        async fn is_available(&self) -> bool {
            true
        }
        async fn execute(&self, _task: &Task) -> Result<LayerResult, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = self.errors.lock().unwrap().pop();
            match next {
                Some(err) => Err(err),
                None => Ok(LayerResult::ok(self.kind, self.payload.clone())),
            }
        }
    }

    /// Answers with the `query` input it was given.
    struct EchoQuery {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Backend for EchoQuery {
        fn kind(&self) -> BackendKind {
            BackendKind::Gemini
        }
        async fn initialize(&self) -> Result<(), BackendError> {
            Ok(())
        }
        async fn is_available(&self) -> bool {
            true
        }
        async fn execute(&self, task: &Task) -> Result<LayerResult, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let topic = task.options.get("query").cloned().unwrap_or(Value::Null);
            Ok(LayerResult::ok(BackendKind::Gemini, json!({ "topic": topic })))
        }
    }

    struct NoDelayRetry(u32);

    impl RetryStrategyPlugin for NoDelayRetry {
        fn name(&self) -> &str {
            "test"
        }
        fn next_delay(&self, _attempt: u32, _error: &BackendError) -> Option<Duration> {
            Some(Duration::from_millis(1))
        }
        fn max_attempts(&self) -> u32 {
            self.0
        }
    }

    fn executor(backend: Arc<Flaky>, retries: u32, cache: Option<Arc<SearchCache>>) -> StepExecutor {
        let registry = BackendRegistry::new().with(backend);
        StepExecutor::new(
            Arc::new(registry),
            Arc::new(Unlimited),
            cache,
            Some(Arc::new(NoDelayRetry(retries))),
            Duration::from_secs(5),
        )
    }

    fn transient(kind: BackendKind) -> BackendError {
        BackendError::Transient {
            backend: kind,
            kind: TransientKind::Server,
            message: "503".into(),
        }
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let backend = Arc::new(Flaky::new(
            BackendKind::Claude,
            vec![transient(BackendKind::Claude), transient(BackendKind::Claude)],
        ));
        let exec = executor(backend.clone(), 3, None);
        let step = WorkflowStep::new("a", BackendKind::Claude, "analyze");
        let result = exec.run_step(&step, Map::new()).await;
        assert!(result.is_effective_success());
        assert_eq!(result.metadata.attempts, 3);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn auth_errors_are_not_retried() {
        let backend = Arc::new(Flaky::new(
            BackendKind::Claude,
            vec![BackendError::Auth {
                backend: BackendKind::Claude,
                message: "no key".into(),
            }],
        ));
        let exec = executor(backend.clone(), 3, None);
        let step = WorkflowStep::new("a", BackendKind::Claude, "analyze");
        let result = exec.run_step(&step, Map::new()).await;
        assert!(!result.success);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fallback_substitutes_run_once() {
        let backend = Arc::new(Flaky::new(
            BackendKind::Gemini,
            vec![transient(BackendKind::Gemini)],
        ));
        let exec = executor(backend.clone(), 3, None);
        let step = WorkflowStep::new("a", BackendKind::Gemini, "summarize");
        let result = exec.run_step_once(&step, Map::new()).await;
        assert!(!result.success);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_payload_is_invalid() {
        let mut flaky = Flaky::new(BackendKind::AiStudio, vec![]);
        flaky.payload = json!("");
        let exec = executor(Arc::new(flaky), 1, None);
        let step = WorkflowStep::new("a", BackendKind::AiStudio, "describe");
        let result = exec.run_step(&step, Map::new()).await;
        assert!(!result.success);
        assert_eq!(
            result.metadata.error_code,
            Some(crate::error::ErrorCode::InvalidResult)
        );
    }

    #[tokio::test]
    async fn step_deadline_yields_timeout() {
        let mut flaky = Flaky::new(BackendKind::Claude, vec![]);
        flaky.delay = Duration::from_millis(200);
        let exec = executor(Arc::new(flaky), 1, None);
        let step = WorkflowStep::new("slow", BackendKind::Claude, "analyze").timeout_ms(20);
        let result = exec.run_step(&step, Map::new()).await;
        assert!(!result.success);
        assert_eq!(result.metadata.error_code, Some(crate::error::ErrorCode::Timeout));
    }

    #[tokio::test]
    async fn search_results_are_served_from_cache() {
        let backend = Arc::new(Flaky::new(BackendKind::Gemini, vec![]));
        let cache = Arc::new(SearchCache::new(10, Duration::from_secs(60), 0.8));
        let exec = executor(backend.clone(), 1, Some(cache));
        let step = WorkflowStep::new("s", BackendKind::Gemini, "search");
        let mut input = Map::new();
        input.insert("query".into(), json!("rust 2024 edition"));

        let first = exec.run_step(&step, input.clone()).await;
        let second = exec.run_step(&step, input).await;
        assert!(!first.metadata.cached);
        assert!(second.metadata.cached);
        assert_eq!(second.data, first.data);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn searches_differing_only_in_secondary_inputs_do_not_share_entries() {
        let backend = Arc::new(EchoQuery {
            calls: AtomicU32::new(0),
        });
        let cache = Arc::new(SearchCache::new(10, Duration::from_secs(60), 0.8));
        let exec = StepExecutor::new(
            Arc::new(BackendRegistry::new().with(backend.clone())),
            Arc::new(Unlimited),
            Some(cache.clone()),
            None,
            Duration::from_secs(5),
        );
        let step = WorkflowStep::new("s", BackendKind::Gemini, "search");
        let input = |query: &str| {
            let mut input = Map::new();
            input.insert("prompt".into(), json!("find sources"));
            input.insert("query".into(), json!(query));
            input
        };

        let rust = exec.run_step(&step, input("rust")).await;
        let golang = exec.run_step(&step, input("golang")).await;
        assert_eq!(rust.data.as_ref().unwrap()["topic"], "rust");
        assert_eq!(golang.data.as_ref().unwrap()["topic"], "golang");
        assert!(!golang.metadata.cached);

        let again = exec.run_step(&step, input("golang")).await;
        assert!(again.metadata.cached);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn steps_without_request_text_bypass_cache() {
        let backend = Arc::new(Flaky::new(BackendKind::Gemini, vec![]));
        let cache = Arc::new(SearchCache::new(10, Duration::from_secs(60), 0.8));
        let exec = executor(backend.clone(), 1, Some(cache.clone()));
        let step = WorkflowStep::new("s", BackendKind::Gemini, "search");
        let mut input = Map::new();
        input.insert("topic".into(), json!("rust"));

        exec.run_step(&step, input.clone()).await;
        let second = exec.run_step(&step, input).await;
        assert!(!second.metadata.cached);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn grounded_ad_hoc_calls_share_the_cache() {
        let backend = Arc::new(Flaky::new(BackendKind::Gemini, vec![]));
        let cache = Arc::new(SearchCache::new(10, Duration::from_secs(60), 0.8));
        let exec = executor(backend.clone(), 1, Some(cache));
        let task = Task::new("latest rust release");

        exec.call(BackendKind::Gemini, &task).await.unwrap();
        exec.call(BackendKind::Gemini, &task).await.unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);

        exec.call_grounded(BackendKind::Gemini, &task).await.unwrap();
        let hit = exec.call_grounded(BackendKind::Gemini, &task).await.unwrap();
        assert!(hit.metadata.cached);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }
}
