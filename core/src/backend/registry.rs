use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::error::BackendError;

use super::{Backend, BackendKind};

struct BackendSlot {
    backend: Arc<dyn Backend>,
    // Memoised init outcome; concurrent callers await the same in-flight future.
    ready: OnceCell<Result<(), BackendError>>,
}

/// Single indirection point from backend identity to instance.
#[derive(Default)]
pub struct BackendRegistry {
    slots: HashMap<BackendKind, BackendSlot>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        let kind = backend.kind();
        if self.slots.contains_key(&kind) {
            tracing::warn!("replacing registered backend '{}'", kind);
        }
        self.slots.insert(
            kind,
            BackendSlot {
                backend,
                ready: OnceCell::new(),
            },
        );
    }

    pub fn with(mut self, backend: Arc<dyn Backend>) -> Self {
        self.register(backend);
        self
    }

    pub fn contains(&self, kind: BackendKind) -> bool {
        self.slots.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<BackendKind> {
        let mut kinds: Vec<BackendKind> = self.slots.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Look up a backend without initializing it.
    pub fn get(&self, kind: BackendKind) -> Option<Arc<dyn Backend>> {
        self.slots.get(&kind).map(|slot| slot.backend.clone())
    }

    /// Initialize the backend at most once and return it.
    pub async fn ensure_ready(&self, kind: BackendKind) -> Result<Arc<dyn Backend>, BackendError> {
        let slot = self
            .slots
            .get(&kind)
            .ok_or_else(|| BackendError::Unavailable {
                backend: kind,
                reason: "no backend registered".to_string(),
            })?;

        let outcome = slot
            .ready
            .get_or_init(|| async {
                tracing::debug!("initializing backend '{}'", kind);
                let res = slot.backend.initialize().await;
                if let Err(e) = &res {
                    tracing::warn!("backend '{}' failed to initialize: {}", kind, e);
                }
                res
            })
            .await;

        match outcome {
            Ok(()) => Ok(slot.backend.clone()),
            Err(e) => Err(BackendError::Unavailable {
                backend: kind,
                reason: e.to_string(),
            }),
        }
    }

    /// Ready and currently reporting itself available.
    pub async fn is_usable(&self, kind: BackendKind) -> bool {
        match self.ensure_ready(kind).await {
            Ok(backend) => backend.is_available().await,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::types::{LayerResult, Task};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SlowInit {
        inits: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Backend for SlowInit {
        fn kind(&self) -> BackendKind {
            BackendKind::Gemini
        }

        async fn initialize(&self) -> Result<(), BackendError> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                Err(BackendError::Auth {
                    backend: BackendKind::Gemini,
                    message: "no credentials".into(),
                })
            } else {
                Ok(())
            }
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn execute(&self, _task: &Task) -> Result<LayerResult, BackendError> {
            Ok(LayerResult::ok(BackendKind::Gemini, serde_json::json!("ok")))
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_initialization() {
        let backend = Arc::new(SlowInit {
            inits: AtomicUsize::new(0),
            fail: false,
        });
        let registry = Arc::new(BackendRegistry::new().with(backend.clone()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.ensure_ready(BackendKind::Gemini).await.is_ok()
            }));
        }
        for h in handles {
            assert!(h.await.unwrap());
        }
        assert_eq!(backend.inits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_initialization_is_memoised_as_unavailable() {
        let backend = Arc::new(SlowInit {
            inits: AtomicUsize::new(0),
            fail: true,
        });
        let registry = BackendRegistry::new().with(backend.clone());

        for _ in 0..3 {
            let err = registry.ensure_ready(BackendKind::Gemini).await.err().unwrap();
            assert!(matches!(err, BackendError::Unavailable { .. }));
        }
        assert_eq!(backend.inits.load(Ordering::SeqCst), 1);
        assert!(!registry.is_usable(BackendKind::Gemini).await);
    }

    #[tokio::test]
    async fn unregistered_backend_is_unavailable() {
        let registry = BackendRegistry::new();
        let err = registry.ensure_ready(BackendKind::Claude).await.err().unwrap();
        assert!(err.to_string().contains("no backend registered"));
    }
}
