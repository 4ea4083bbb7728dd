//! Read-mostly request cache for search/grounding calls.
//!
//! Entries expire by TTL; the entry count is bounded and eviction is by
//! insertion order (lookups use `peek`, so hits never refresh recency).
//! Lookups fall back to the most similar live entry for the same backend and
//! the same request scope when it clears the similarity threshold. Only the
//! free text is fuzzy; everything else in the request must match exactly.

mod similarity;

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::BackendKind;
use crate::executor::types::{millis, LayerResult, Task};

pub use similarity::{normalize_request, similarity};

/// Actions that are idempotent lookups and safe to serve from cache.
pub const CACHEABLE_ACTIONS: &[&str] = &[
    "search",
    "grounded_search",
    "web_search",
    "grounding",
    "lookup",
    "fact_check",
];

/// Action under which ad hoc grounded lookups are cached.
pub const GROUNDED_SEARCH_ACTION: &str = "grounded_search";

pub fn is_cacheable(backend: BackendKind, action: Option<&str>) -> bool {
    backend == BackendKind::Gemini
        && action.is_some_and(|a| CACHEABLE_ACTIONS.contains(&a.to_ascii_lowercase().as_str()))
}

/// What a cached call is keyed on besides the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRequest {
    /// Free text, matched after normalisation and by similarity.
    pub text: String,
    /// Action, remaining inputs and attachments in canonical form; compared exactly.
    pub scope: String,
}

impl CacheRequest {
    pub fn new(text: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            scope: scope.into(),
        }
    }

    /// Key a task on its whole request. `None` when there is no text to key on.
    pub fn from_task(task: &Task, action: Option<&str>) -> Option<Self> {
        let text = task.prompt.trim();
        if text.is_empty() {
            return None;
        }

        // The input key the prompt was taken from is already covered by `text`.
        let mut rest: BTreeMap<&str, &Value> = BTreeMap::new();
        let mut prompt_skipped = false;
        for (key, value) in &task.options {
            if key == "files" {
                continue;
            }
            if !prompt_skipped && value.as_str() == Some(task.prompt.as_str()) {
                prompt_skipped = true;
                continue;
            }
            rest.insert(key.as_str(), value);
        }
        let mut files: Vec<&str> = task.files.iter().map(|f| f.path.as_str()).collect();
        files.sort_unstable();

        let scope = serde_json::json!({
            "action": action.or(task.action.as_deref()).map(str::to_ascii_lowercase),
            "inputs": rest,
            "files": files,
        });
        Some(Self::new(text, scope.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

fn default_enabled() -> bool {
    true
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_max_entries() -> usize {
    100
}

fn default_similarity_threshold() -> f64 {
    0.8
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub backend: BackendKind,
    pub scope: String,
    pub normalized: String,
    pub content: Value,
    pub sources: Vec<String>,
    pub created_at: Instant,
    pub ttl: Duration,
    pub latency_ms: u64,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub similar_hits: u64,
    pub misses: u64,
}

pub struct SearchCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
    similarity_threshold: f64,
    hits: AtomicU64,
    similar_hits: AtomicU64,
    misses: AtomicU64,
}

impl SearchCache {
    pub fn new(max_entries: usize, ttl: Duration, similarity_threshold: f64) -> Self {
        let capacity = NonZeroUsize::new(max_entries.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            similarity_threshold: similarity_threshold.clamp(0.0, 1.0),
            hits: AtomicU64::new(0),
            similar_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn from_config(cfg: &CacheConfig) -> Self {
        Self::new(
            cfg.max_entries,
            Duration::from_secs(cfg.ttl_secs),
            cfg.similarity_threshold,
        )
    }

    fn key(backend: BackendKind, scope: &str, normalized: &str) -> String {
        format!("{backend}:{scope}:{normalized}")
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, CacheEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn get(&self, request: &CacheRequest, backend: BackendKind) -> Option<CacheEntry> {
        let normalized = normalize_request(&request.text);
        let key = Self::key(backend, &request.scope, &normalized);
        let now = Instant::now();
        let mut entries = self.lock();

        purge_expired(&mut entries, now);

        if let Some(entry) = entries.peek(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("cache hit for '{}'", key);
            return Some(entry.clone());
        }

        // Newest entries come first; keep the first best match.
        let mut best: Option<(f64, &CacheEntry)> = None;
        for (_, entry) in entries.iter() {
            if entry.backend != backend || entry.scope != request.scope {
                continue;
            }
            let score = similarity(&normalized, &entry.normalized);
            if score >= self.similarity_threshold && best.map_or(true, |(s, _)| score > s) {
                best = Some((score, entry));
            }
        }

        if let Some((score, entry)) = best {
            self.similar_hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                "cache near-hit for '{}' via '{}' (similarity {:.2})",
                key,
                entry.key,
                score
            );
            return Some(entry.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a successful result. Failed results are never cached.
    pub fn set(
        &self,
        request: &CacheRequest,
        result: &LayerResult,
        backend: BackendKind,
        latency: Duration,
    ) {
        if !result.is_effective_success() {
            return;
        }
        let Some(content) = result.data.clone() else {
            return;
        };

        let normalized = normalize_request(&request.text);
        if normalized.is_empty() {
            return;
        }
        let key = Self::key(backend, &request.scope, &normalized);
        let entry = CacheEntry {
            key: key.clone(),
            backend,
            scope: request.scope.clone(),
            normalized,
            sources: extract_sources(&content),
            content,
            created_at: Instant::now(),
            ttl: self.ttl,
            latency_ms: millis(latency),
        };

        let mut entries = self.lock();
        if let Some((evicted, _)) = entries.push(key, entry) {
            tracing::debug!("cache evicted '{}'", evicted);
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            similar_hits: self.similar_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

fn purge_expired(entries: &mut LruCache<String, CacheEntry>, now: Instant) {
    let expired: Vec<String> = entries
        .iter()
        .filter(|(_, e)| e.is_expired(now))
        .map(|(k, _)| k.clone())
        .collect();
    for key in expired {
        entries.pop(&key);
    }
}

fn extract_sources(content: &Value) -> Vec<String> {
    content
        .get("sources")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|s| match s {
                    Value::String(url) => Some(url.clone()),
                    Value::Object(obj) => obj.get("url").and_then(Value::as_str).map(str::to_string),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}
