use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{json, Value};
use tribridge_core::api::{
    AiStudioConfig, Backend, BackendError, BackendKind, FileRef, LayerResult, Task, TransientKind,
};

use super::compose_prompt;

const BODY_PREVIEW_LIMIT: usize = 512;

/// Inline uploads above this size are rejected by the API.
const MAX_INLINE_BYTES: u64 = 20 * 1024 * 1024;

const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// AI Studio `generateContent` over HTTP. Attachments travel inline as base64.
pub struct AiStudioBackend {
    config: AiStudioConfig,
    api_key: OnceLock<String>,
    http: OnceLock<reqwest::Client>,
}

impl AiStudioBackend {
    pub fn new(config: AiStudioConfig) -> Self {
        Self {
            config,
            api_key: OnceLock::new(),
            http: OnceLock::new(),
        }
    }

    /// Use `key` instead of reading `api_key_env` at initialization.
    pub fn with_api_key(self, key: impl Into<String>) -> Self {
        let _ = self.api_key.set(key.into());
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        )
    }

    fn model_for(&self, task: &Task) -> &str {
        match task.action.as_deref() {
            Some("generate") => &self.config.generation_model,
            _ => &self.config.model,
        }
    }

    async fn build_body(&self, task: &Task) -> Result<Value, BackendError> {
        let mut parts = vec![json!({ "text": compose_prompt(task) })];
        for file in &task.files {
            parts.push(self.inline_part(file).await?);
        }

        let mut body = json!({
            "contents": [{ "role": "user", "parts": parts }],
        });
        if task.action.as_deref() == Some("generate") {
            body["generationConfig"] = json!({ "responseModalities": ["TEXT", "IMAGE"] });
        }
        Ok(body)
    }

    async fn inline_part(&self, file: &FileRef) -> Result<Value, BackendError> {
        let meta = tokio::fs::metadata(&file.path)
            .await
            .map_err(|e| self.file_error(file, e.to_string()))?;
        if meta.len() > MAX_INLINE_BYTES {
            return Err(self.file_error(
                file,
                format!("{} bytes exceeds the inline upload limit", meta.len()),
            ));
        }
        let bytes = tokio::fs::read(&file.path)
            .await
            .map_err(|e| self.file_error(file, e.to_string()))?;

        Ok(json!({
            "inline_data": {
                "mime_type": file.mime_type(),
                "data": base64::engine::general_purpose::STANDARD.encode(bytes),
            }
        }))
    }

    fn file_error(&self, file: &FileRef, message: String) -> BackendError {
        BackendError::Other {
            backend: BackendKind::AiStudio,
            message: format!("cannot attach '{}': {}", file.path, message),
        }
    }
}

#[async_trait]
impl Backend for AiStudioBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::AiStudio
    }

    async fn initialize(&self) -> Result<(), BackendError> {
        if !self.config.enabled {
            return Err(BackendError::Unavailable {
                backend: BackendKind::AiStudio,
                reason: "disabled in config".to_string(),
            });
        }

        if self.api_key.get().is_none() {
            let key = std::env::var(&self.config.api_key_env)
                .ok()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| BackendError::Auth {
                    backend: BackendKind::AiStudio,
                    message: format!("environment variable {} is not set", self.config.api_key_env),
                })?;
            let _ = self.api_key.set(key);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(self.config.request_timeout_ms))
            .build()
            .map_err(|e| BackendError::Unavailable {
                backend: BackendKind::AiStudio,
                reason: format!("http client: {e}"),
            })?;
        let _ = self.http.set(client);
        Ok(())
    }

    async fn is_available(&self) -> bool {
        self.config.enabled && self.api_key.get().is_some() && self.http.get().is_some()
    }

    async fn execute(&self, task: &Task) -> Result<LayerResult, BackendError> {
        let (Some(http), Some(key)) = (self.http.get(), self.api_key.get()) else {
            return Err(BackendError::Unavailable {
                backend: BackendKind::AiStudio,
                reason: "not initialized".to_string(),
            });
        };

        let model = self.model_for(task).to_string();
        let url = self.endpoint(&model);
        let body = self.build_body(task).await?;
        tracing::debug!(
            "aistudio request: model {}, action {:?}, files {}",
            model,
            task.action,
            task.files.len()
        );

        let resp = http
            .post(&url)
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let text = resp.text().await.map_err(from_reqwest)?;

        if !(200..300).contains(&status) {
            return Err(status_error(status, &text, retry_after));
        }

        let value: Value = serde_json::from_str(&text).map_err(|e| BackendError::InvalidResult {
            backend: BackendKind::AiStudio,
            reason: format!("failed to decode response body: {e} | body={}", preview_body(&text)),
        })?;

        let mut result = LayerResult::ok(BackendKind::AiStudio, parse_candidates(&value))
            .with_model(model);
        if let Some(tokens) = value
            .pointer("/usageMetadata/totalTokenCount")
            .and_then(Value::as_u64)
        {
            result = result.with_tokens(tokens);
        }
        Ok(result)
    }
}

/// `{text, media}` from the first candidate; blocked prompts come back empty
/// and are rejected by the step executor.
fn parse_candidates(value: &Value) -> Value {
    let parts = value
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut text = String::new();
    let mut media = Vec::new();
    for part in &parts {
        if let Some(t) = part.get("text").and_then(Value::as_str) {
            text.push_str(t);
        }
        if let Some(inline) = part.get("inlineData").or_else(|| part.get("inline_data")) {
            media.push(json!({
                "mimeType": inline.get("mimeType").or_else(|| inline.get("mime_type")),
                "data": inline.get("data"),
            }));
        }
    }

    match (text.is_empty(), media.is_empty()) {
        (true, true) => Value::Null,
        (false, true) => json!({ "text": text }),
        _ => json!({ "text": text, "media": media }),
    }
}

fn status_error(status: u16, body: &str, retry_after: Option<Duration>) -> BackendError {
    let backend = BackendKind::AiStudio;
    let message = format!("HTTP {status}: {}", preview_body(body));
    match status {
        401 | 403 => BackendError::Auth { backend, message },
        429 if body.contains("RESOURCE_EXHAUSTED") || body.to_lowercase().contains("quota") => {
            BackendError::QuotaExceeded {
                backend,
                retry_after: retry_after.unwrap_or(DEFAULT_RETRY_AFTER),
            }
        }
        429 => BackendError::Transient {
            backend,
            kind: TransientKind::RateLimited,
            message,
        },
        408 => BackendError::Transient {
            backend,
            kind: TransientKind::Timeout,
            message,
        },
        500..=599 => BackendError::Transient {
            backend,
            kind: TransientKind::Server,
            message,
        },
        _ => BackendError::Other { backend, message },
    }
}

fn from_reqwest(err: reqwest::Error) -> BackendError {
    let kind = if err.is_timeout() {
        TransientKind::Timeout
    } else {
        TransientKind::Network
    };
    BackendError::Transient {
        backend: BackendKind::AiStudio,
        kind,
        message: err.to_string(),
    }
}

fn preview_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    let mut out: String = trimmed.chars().take(BODY_PREVIEW_LIMIT).collect();
    if trimmed.chars().count() > BODY_PREVIEW_LIMIT {
        out.push_str("...");
    }
    out
}
