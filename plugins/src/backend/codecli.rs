use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tribridge_core::api::{
    Backend, BackendError, BackendKind, CodeCliConfig, LayerResult, Task, TransientKind,
};

use super::compose_prompt;

// Longest prompt passed as an argument; Windows caps command lines near 8k.
const MAX_ARG_PROMPT_CHARS: usize = 8000;

/// Quota windows reported by the CLIs are not machine-readable; assume a minute.
const DEFAULT_QUOTA_BACKOFF: Duration = Duration::from_secs(60);

/// Drives the `claude` / `gemini` command-line tools as subprocesses.
pub struct CodeCliBackend {
    kind: BackendKind,
    config: CodeCliConfig,
    executable: OnceLock<String>,
}

impl CodeCliBackend {
    pub fn new(kind: BackendKind, config: CodeCliConfig) -> Self {
        Self {
            kind,
            config,
            executable: OnceLock::new(),
        }
    }

    fn build_args(&self, prompt: &str, use_stdin: bool) -> Vec<String> {
        let mut args = self.config.args.clone();

        if let Some(m) = &self.config.model {
            if !m.trim().is_empty() {
                args.push("--model".to_string());
                args.push(m.clone());
            }
        }

        if use_stdin {
            // gemini's -p takes a value; an empty one makes it read stdin.
            if self.kind == BackendKind::Gemini && args.last().map(String::as_str) == Some("-p") {
                args.push(String::new());
            }
        } else {
            args.push(prompt.to_string());
        }
        args
    }

    async fn run(&self, exe: &str, task: &Task) -> Result<LayerResult, BackendError> {
        let prompt = with_file_mentions(compose_prompt(task), task);
        let use_stdin = needs_stdin(&prompt);
        let args = self.build_args(&prompt, use_stdin);

        tracing::debug!(
            "spawning {} ({} args, prompt_len {}, stdin {}, files {})",
            exe,
            args.len(),
            prompt.len(),
            use_stdin,
            task.files.len()
        );

        let mut cmd = Command::new(exe);
        cmd.args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| BackendError::Unavailable {
            backend: self.kind,
            reason: format!("failed to spawn '{exe}': {e}"),
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            if use_stdin {
                stdin
                    .write_all(prompt.as_bytes())
                    .await
                    .map_err(|e| self.io_error(e))?;
            }
            // Dropping the handle closes the pipe.
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| self.io_error(e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let detail = if stderr.is_empty() { &stdout } else { &stderr };
            return Err(classify_failure(self.kind, code, detail));
        }

        let mut result = LayerResult::ok(self.kind, json!({ "text": stdout }));
        if let Some(model) = &self.config.model {
            result = result.with_model(model.clone());
        }
        Ok(result)
    }

    fn io_error(&self, e: std::io::Error) -> BackendError {
        BackendError::Transient {
            backend: self.kind,
            kind: TransientKind::Network,
            message: format!("subprocess I/O failed: {e}"),
        }
    }
}

#[async_trait]
impl Backend for CodeCliBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn initialize(&self) -> Result<(), BackendError> {
        if !self.config.enabled {
            return Err(BackendError::Unavailable {
                backend: self.kind,
                reason: "disabled in config".to_string(),
            });
        }
        let exe = resolve_executable_path(&self.config.binary).ok_or_else(|| {
            BackendError::Unavailable {
                backend: self.kind,
                reason: format!(
                    "executable '{}' not found; install it or set its full path",
                    self.config.binary
                ),
            }
        })?;
        tracing::info!("backend '{}' uses {}", self.kind, exe);
        let _ = self.executable.set(exe);
        Ok(())
    }

    async fn is_available(&self) -> bool {
        self.config.enabled && self.executable.get().is_some()
    }

    async fn execute(&self, task: &Task) -> Result<LayerResult, BackendError> {
        let exe = self
            .executable
            .get()
            .ok_or_else(|| BackendError::Unavailable {
                backend: self.kind,
                reason: "not initialized".to_string(),
            })?;
        self.run(exe, task).await
    }
}

/// Non-ASCII, multi-line or oversized prompts go through stdin so the shell
/// and code page never re-encode them.
fn needs_stdin(prompt: &str) -> bool {
    prompt.chars().count() > MAX_ARG_PROMPT_CHARS
        || prompt
            .bytes()
            .any(|b| !b.is_ascii() || b == b'\n' || b == b'\r' || b < 0x20)
}

/// Map a non-zero exit to the error taxonomy using the CLI's own wording.
pub fn classify_failure(backend: BackendKind, code: i32, detail: &str) -> BackendError {
    let lower = detail.to_lowercase();
    let message = if detail.is_empty() {
        format!("exited with code {code}")
    } else {
        format!("exited with code {code}: {}", tail(detail, 500))
    };

    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["quota", "resource_exhausted", "usage limit"]) {
        BackendError::QuotaExceeded {
            backend,
            retry_after: DEFAULT_QUOTA_BACKOFF,
        }
    } else if has(&["unauthorized", "authentication", "not logged in", "invalid api key", "login"]) {
        BackendError::Auth { backend, message }
    } else if has(&["rate limit", "too many requests", "429"]) {
        BackendError::Transient {
            backend,
            kind: TransientKind::RateLimited,
            message,
        }
    } else if has(&["overloaded", "internal server error", "503", "502", "500"]) {
        BackendError::Transient {
            backend,
            kind: TransientKind::Server,
            message,
        }
    } else if has(&["econnreset", "enotfound", "network", "connection", "timed out"]) {
        BackendError::Transient {
            backend,
            kind: TransientKind::Network,
            message,
        }
    } else {
        BackendError::Other { backend, message }
    }
}

fn tail(s: &str, max: usize) -> &str {
    match s.char_indices().rev().nth(max.saturating_sub(1)) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

/// The CLIs read attachments themselves; mention each path in the prompt.
fn with_file_mentions(prompt: String, task: &Task) -> String {
    if task.files.is_empty() {
        return prompt;
    }
    let mut out = prompt;
    out.push_str("\n\n## files");
    for file in &task.files {
        out.push_str(&format!("\n@{}", file.path));
    }
    out
}

/// 解析可执行文件的完整路径
///
/// 优先级：绝对路径 → NVM_BIN（npm 全局工具）→ 系统 PATH
fn resolve_executable_path(binary: &str) -> Option<String> {
    let path = Path::new(binary);

    if path.is_absolute() {
        return path.is_file().then(|| binary.to_string());
    }

    let cmd_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(binary);

    if let Some(dir) = std::env::var_os("NVM_BIN").map(PathBuf::from) {
        if let Some(found) = find_in_dir(&dir, cmd_name) {
            tracing::debug!("found '{}' in NVM_BIN", cmd_name);
            return Some(found);
        }
    }

    let path_env = std::env::var_os("PATH")?;
    std::env::split_paths(&path_env).find_map(|dir| find_in_dir(&dir, cmd_name))
}

fn find_in_dir(dir: &Path, cmd: &str) -> Option<String> {
    #[cfg(target_os = "windows")]
    {
        for ext in ["exe", "cmd"] {
            let candidate = dir.join(format!("{cmd}.{ext}"));
            if candidate.is_file() {
                return Some(candidate.to_string_lossy().to_string());
            }
        }
        None
    }

    #[cfg(not(target_os = "windows"))]
    {
        let candidate = dir.join(cmd);
        if candidate.is_file() && is_executable(&candidate) {
            return Some(candidate.to_string_lossy().to_string());
        }
        None
    }
}

/// 检查文件是否为可执行文件（Unix 平台需要检查权限）
#[cfg(not(target_os = "windows"))]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(kind: BackendKind, args: &[&str]) -> CodeCliBackend {
        CodeCliBackend::new(
            kind,
            CodeCliConfig {
                enabled: true,
                binary: kind.to_string(),
                args: args.iter().map(|s| s.to_string()).collect(),
                model: Some("fast".to_string()),
            },
        )
    }

    #[test]
    fn prompt_goes_last_as_an_argument() {
        let b = backend(BackendKind::Claude, &["-p", "--output-format", "text"]);
        assert_eq!(
            b.build_args("hello", false),
            vec!["-p", "--output-format", "text", "--model", "fast", "hello"]
        );
    }

    #[test]
    fn gemini_reads_stdin_with_empty_prompt_flag() {
        let b = CodeCliBackend::new(
            BackendKind::Gemini,
            CodeCliConfig {
                enabled: true,
                binary: "gemini".into(),
                args: vec!["-p".into()],
                model: None,
            },
        );
        assert_eq!(b.build_args("你好", true), vec!["-p", ""]);
    }

    #[test]
    fn stdin_is_used_for_non_ascii_and_multiline() {
        assert!(!needs_stdin("plain ascii prompt"));
        assert!(needs_stdin("总结这份文件"));
        assert!(needs_stdin("line one\nline two"));
        assert!(needs_stdin(&"a".repeat(MAX_ARG_PROMPT_CHARS + 1)));
    }

    #[test]
    fn failures_are_classified_from_output() {
        let k = BackendKind::Gemini;
        assert!(matches!(
            classify_failure(k, 1, "Error: RESOURCE_EXHAUSTED daily quota"),
            BackendError::QuotaExceeded { .. }
        ));
        assert!(matches!(
            classify_failure(k, 1, "Please login first"),
            BackendError::Auth { .. }
        ));
        assert!(matches!(
            classify_failure(k, 1, "429 Too Many Requests"),
            BackendError::Transient { kind: TransientKind::RateLimited, .. }
        ));
        assert!(matches!(
            classify_failure(k, 1, "read ECONNRESET"),
            BackendError::Transient { kind: TransientKind::Network, .. }
        ));
        assert!(matches!(
            classify_failure(k, 2, "unknown flag"),
            BackendError::Other { .. }
        ));
    }

    #[test]
    fn attachments_are_mentioned() {
        let task = Task::new("describe").with_file(tribridge_core::api::FileRef::from_path("/tmp/a.png"));
        let prompt = with_file_mentions("describe".to_string(), &task);
        assert!(prompt.ends_with("## files\n@/tmp/a.png"));
    }

    #[tokio::test]
    async fn missing_binary_fails_initialization() {
        let b = CodeCliBackend::new(
            BackendKind::Claude,
            CodeCliConfig {
                enabled: true,
                binary: "/definitely/not/here/claude".into(),
                args: Vec::new(),
                model: None,
            },
        );
        assert!(matches!(
            b.initialize().await,
            Err(BackendError::Unavailable { .. })
        ));
        assert!(!b.is_available().await);
    }
}
