#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tribridge_core::api::{
    Backend, BackendError, BackendKind, BackendRegistry, ExecutionConfig, ExecutionEngine,
    LayerResult, RouterConfig, Router, SearchCache, Task, TransientKind,
};

/// Start/end marks shared by several backends, in the order they happened.
pub type Timeline = Arc<Mutex<Vec<String>>>;

/// Scripted reply for one action.
#[derive(Clone)]
pub enum Reply {
    Data(Value),
    Empty,
    Fail(BackendError),
}

#[derive(Debug, Clone)]
pub struct Call {
    pub action: String,
    pub prompt: String,
    pub options: Map<String, Value>,
}

/// Backend double: replies per action, records every call and tracks how
/// many calls were in flight at once.
pub struct ScriptedBackend {
    kind: BackendKind,
    replies: Mutex<HashMap<String, Reply>>,
    init_error: Option<BackendError>,
    available: bool,
    reject_failed_inputs: bool,
    delay: Duration,
    calls: Mutex<Vec<Call>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    timeline: Option<Timeline>,
}

impl ScriptedBackend {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            replies: Mutex::new(HashMap::new()),
            init_error: None,
            available: true,
            reject_failed_inputs: false,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            timeline: None,
        }
    }

    pub fn reply(self, action: &str, reply: Reply) -> Self {
        self.replies.lock().unwrap().insert(action.to_string(), reply);
        self
    }

    pub fn failing(self, action: &str, message: &str) -> Self {
        let kind = self.kind;
        self.reply(
            action,
            Reply::Fail(BackendError::Other {
                backend: kind,
                message: message.to_string(),
            }),
        )
    }

    pub fn broken_init(mut self) -> Self {
        self.init_error = Some(BackendError::Auth {
            backend: self.kind,
            message: "missing credentials".into(),
        });
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Fail any call whose options carry a failed-reference sentinel.
    pub fn rejecting_failed_inputs(mut self) -> Self {
        self.reject_failed_inputs = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Record `start:<kind>:<action>` and `end:<kind>:<action>` marks.
    pub fn on_timeline(mut self, timeline: &Timeline) -> Self {
        self.timeline = Some(timeline.clone());
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.action).collect()
    }

    pub fn call_count(&self, action: &str) -> usize {
        self.calls().iter().filter(|c| c.action == action).count()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl ScriptedBackend {
    fn mark(&self, phase: &str, action: &str) {
        if let Some(timeline) = &self.timeline {
            timeline
                .lock()
                .unwrap()
                .push(format!("{phase}:{}:{action}", self.kind));
        }
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn initialize(&self) -> Result<(), BackendError> {
        match &self.init_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn execute(&self, task: &Task) -> Result<LayerResult, BackendError> {
        let action = task.action.clone().unwrap_or_default();
        self.calls.lock().unwrap().push(Call {
            action: action.clone(),
            prompt: task.prompt.clone(),
            options: task.options.clone(),
        });

        self.mark("start", &action);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.mark("end", &action);

        if self.reject_failed_inputs && carries_failed_sentinel(&task.options) {
            return Err(BackendError::Other {
                backend: self.kind,
                message: "upstream input unavailable".into(),
            });
        }

        let reply = self.replies.lock().unwrap().get(&action).cloned();
        match reply {
            Some(Reply::Data(value)) => Ok(LayerResult::ok(self.kind, value)),
            Some(Reply::Empty) => Ok(LayerResult::ok(self.kind, json!(""))),
            Some(Reply::Fail(err)) => Err(err),
            None => Ok(LayerResult::ok(
                self.kind,
                json!({"text": format!("{}:{}", self.kind, action)}),
            )),
        }
    }
}

fn carries_failed_sentinel(options: &Map<String, Value>) -> bool {
    options
        .values()
        .any(|v| v.get("failed").and_then(Value::as_bool) == Some(true))
}

pub fn transient(kind: BackendKind) -> BackendError {
    BackendError::Transient {
        backend: kind,
        kind: TransientKind::Network,
        message: "connection reset".into(),
    }
}

pub fn registry(backends: &[Arc<ScriptedBackend>]) -> Arc<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    for backend in backends {
        registry.register(backend.clone());
    }
    Arc::new(registry)
}

pub fn engine(backends: &[Arc<ScriptedBackend>]) -> ExecutionEngine {
    engine_with(backends, ExecutionConfig::default())
}

pub fn engine_with(backends: &[Arc<ScriptedBackend>], config: ExecutionConfig) -> ExecutionEngine {
    ExecutionEngine::builder(registry(backends))
        .config(config)
        .build()
}

pub fn router(backends: &[Arc<ScriptedBackend>]) -> Router {
    Router::new(engine(backends), RouterConfig::default())
}

pub fn router_with_cache(backends: &[Arc<ScriptedBackend>]) -> Router {
    let engine = ExecutionEngine::builder(registry(backends))
        .cache(Arc::new(SearchCache::new(10, Duration::from_secs(60), 0.8)))
        .build();
    Router::new(engine, RouterConfig::default())
}
