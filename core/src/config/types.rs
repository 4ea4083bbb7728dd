use serde::{Deserialize, Serialize};

use crate::backend::BackendKind;
use crate::cache::CacheConfig;
use crate::executor::types::{ExecutionConfig, ExecutionMode};
use crate::quota::QuotaConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub executor: ExecutionConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub quota: QuotaConfig,

    #[serde(default)]
    pub backends: BackendsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "tribridge_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    false
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Prompts shorter than this (characters) may take the fast path.
    #[serde(default = "default_fast_path_max_chars")]
    pub fast_path_max_chars: usize,

    #[serde(default)]
    pub default_mode: ExecutionMode,

    /// Outer deadline for one workflow run.
    #[serde(default = "default_workflow_timeout_ms")]
    pub workflow_timeout_ms: u64,
}

fn default_fast_path_max_chars() -> usize {
    100
}

fn default_workflow_timeout_ms() -> u64 {
    600_000
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            fast_path_max_chars: default_fast_path_max_chars(),
            default_mode: ExecutionMode::default(),
            workflow_timeout_ms: default_workflow_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendsConfig {
    #[serde(default = "default_claude")]
    pub claude: CodeCliConfig,

    #[serde(default = "default_gemini")]
    pub gemini: CodeCliConfig,

    #[serde(default)]
    pub aistudio: AiStudioConfig,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            claude: default_claude(),
            gemini: default_gemini(),
            aistudio: AiStudioConfig::default(),
        }
    }
}

impl BackendsConfig {
    pub fn is_enabled(&self, kind: BackendKind) -> bool {
        match kind {
            BackendKind::Claude => self.claude.enabled,
            BackendKind::Gemini => self.gemini.enabled,
            BackendKind::AiStudio => self.aistudio.enabled,
        }
    }
}

/// Subprocess-driven backend (`claude` / `gemini` CLIs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeCliConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Executable name or absolute path.
    pub binary: String,

    /// Arguments placed before the prompt.
    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub model: Option<String>,
}

fn default_claude() -> CodeCliConfig {
    CodeCliConfig {
        enabled: true,
        binary: "claude".to_string(),
        args: vec![
            "-p".to_string(),
            "--output-format".to_string(),
            "text".to_string(),
        ],
        model: None,
    }
}

fn default_gemini() -> CodeCliConfig {
    CodeCliConfig {
        enabled: true,
        binary: "gemini".to_string(),
        args: vec!["-p".to_string()],
        model: None,
    }
}

/// HTTP multimodal backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiStudioConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_aistudio_base_url")]
    pub base_url: String,

    /// Name of the environment variable holding the API key.
    #[serde(default = "default_aistudio_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_aistudio_model")]
    pub model: String,

    /// Model used for `generate` actions.
    #[serde(default = "default_aistudio_generation_model")]
    pub generation_model: String,

    #[serde(default = "default_aistudio_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_aistudio_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_aistudio_api_key_env() -> String {
    "AISTUDIO_API_KEY".to_string()
}

fn default_aistudio_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_aistudio_generation_model() -> String {
    "gemini-2.0-flash-preview-image-generation".to_string()
}

fn default_aistudio_request_timeout_ms() -> u64 {
    120_000
}

impl Default for AiStudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_aistudio_base_url(),
            api_key_env: default_aistudio_api_key_env(),
            model: default_aistudio_model(),
            generation_model: default_aistudio_generation_model(),
            request_timeout_ms: default_aistudio_request_timeout_ms(),
        }
    }
}
