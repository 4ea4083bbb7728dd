use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Scheduling policy requested for a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Sequential,
    Parallel,
    #[default]
    Adaptive,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::Adaptive => "adaptive",
        };
        f.write_str(s)
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "parallel" => Ok(Self::Parallel),
            "adaptive" | "auto" | "hybrid" => Ok(Self::Adaptive),
            other => Err(format!("unknown execution mode: {other}")),
        }
    }
}

/// Workflow engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub concurrency: ConcurrencyConfig,

    /// Deadline for a single step when the step declares none.
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,

    /// Pause injected between parallel levels to respect backend rate limits.
    #[serde(default)]
    pub batch_delay_ms: u64,

    /// Sequential mode only: stop after the first terminal failure.
    #[serde(default)]
    pub abort_on_error: bool,
}

fn default_step_timeout_ms() -> u64 {
    300_000
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            step_timeout_ms: default_step_timeout_ms(),
            batch_delay_ms: 0,
            abort_on_error: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_strategy")]
    pub strategy: String,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: default_retry_strategy(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_strategy() -> String {
    "exponential-backoff".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    #[serde(default = "default_concurrency_strategy")]
    pub strategy: String,
    #[serde(default = "default_min_concurrency")]
    pub min_concurrency: usize,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_base_concurrency")]
    pub base_concurrency: usize,
    /// Permits granted per distinct backend in a level (backend-aware strategy).
    #[serde(default = "default_per_backend")]
    pub per_backend: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            strategy: default_concurrency_strategy(),
            min_concurrency: default_min_concurrency(),
            max_concurrency: default_max_concurrency(),
            base_concurrency: default_base_concurrency(),
            per_backend: default_per_backend(),
        }
    }
}

fn default_min_concurrency() -> usize {
    1
}

fn default_max_concurrency() -> usize {
    5
}

fn default_base_concurrency() -> usize {
    3
}

fn default_per_backend() -> usize {
    2
}

fn default_concurrency_strategy() -> String {
    "fixed".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_aliases() {
        assert_eq!("Parallel".parse::<ExecutionMode>(), Ok(ExecutionMode::Parallel));
        assert_eq!("hybrid".parse::<ExecutionMode>(), Ok(ExecutionMode::Adaptive));
        assert!("random".parse::<ExecutionMode>().is_err());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: ExecutionConfig = toml::from_str("batch_delay_ms = 50\n[retry]\nmax_attempts = 5\n").unwrap();
        assert_eq!(cfg.batch_delay_ms, 50);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.strategy, "exponential-backoff");
        assert_eq!(cfg.retry.base_delay_ms, 1_000);
        assert_eq!(cfg.step_timeout_ms, 300_000);
        assert_eq!(cfg.concurrency.max_concurrency, 5);
    }
}
