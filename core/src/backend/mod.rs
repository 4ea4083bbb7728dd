//! Uniform backend contract.
//!
//! Backends are a closed set of identities ([`BackendKind`]); every concrete
//! implementation sits behind the [`Backend`] trait and is resolved through the
//! [`BackendRegistry`], never by name lookup at call sites.

mod registry;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::executor::types::{LayerResult, Task};

pub use registry::BackendRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Deep-reasoning backend (code, long analysis).
    Claude,
    /// Search-grounded backend (current information, fast answers).
    Gemini,
    /// Multimodal backend (files, OCR, media generation).
    #[serde(rename = "aistudio")]
    AiStudio,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [Self::Claude, Self::Gemini, Self::AiStudio];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Gemini => "gemini",
            Self::AiStudio => "aistudio",
        }
    }

    /// Key used in a plan's fallback table, e.g. `aistudio_unavailable`.
    pub fn unavailable_key(self) -> String {
        format!("{}_unavailable", self.as_str())
    }

    pub fn capabilities(self) -> &'static [Capability] {
        match self {
            Self::Claude => &[
                Capability::Reasoning,
                Capability::CodeExecution,
                Capability::FileOperations,
            ],
            Self::Gemini => &[
                Capability::Grounding,
                Capability::WebSearch,
                Capability::FileUnderstanding,
            ],
            Self::AiStudio => &[
                Capability::FileUnderstanding,
                Capability::DocumentExtraction,
                Capability::ImageGeneration,
                Capability::AudioGeneration,
                Capability::VideoGeneration,
            ],
        }
    }

    /// Static cost/latency profile used for estimates when a backend does not
    /// report its own.
    pub fn profile(self) -> CostProfile {
        match self {
            Self::Claude => CostProfile {
                cost_per_call: 0.015,
                typical_latency: Duration::from_secs(20),
            },
            Self::Gemini => CostProfile {
                cost_per_call: 0.002,
                typical_latency: Duration::from_secs(5),
            },
            Self::AiStudio => CostProfile {
                cost_per_call: 0.008,
                typical_latency: Duration::from_secs(12),
            },
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" | "claude-code" | "claude_code" => Ok(Self::Claude),
            "gemini" | "gemini-cli" | "gemini_cli" => Ok(Self::Gemini),
            "aistudio" | "ai-studio" | "ai_studio" => Ok(Self::AiStudio),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Reasoning,
    CodeExecution,
    FileOperations,
    Grounding,
    WebSearch,
    FileUnderstanding,
    DocumentExtraction,
    ImageGeneration,
    AudioGeneration,
    VideoGeneration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostProfile {
    pub cost_per_call: f64,
    pub typical_latency: Duration,
}

/// Contract every execution backend implements.
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// One-time setup (credential checks, binary discovery). Called at most
    /// once per registry slot.
    async fn initialize(&self) -> Result<(), BackendError>;

    async fn is_available(&self) -> bool;

    async fn execute(&self, task: &Task) -> Result<LayerResult, BackendError>;

    fn capabilities(&self) -> Vec<Capability> {
        self.kind().capabilities().to_vec()
    }

    fn cost(&self, _task: &Task) -> f64 {
        self.kind().profile().cost_per_call
    }

    fn estimated_duration(&self, _task: &Task) -> Duration {
        self.kind().profile().typical_latency
    }
}
