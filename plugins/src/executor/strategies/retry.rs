use std::time::Duration;

use tribridge_core::api::{BackendError, RetryConfig, RetryStrategyPlugin};

/// Doubles the base delay for every failed attempt, capped at `max_delay_ms`.
pub struct ExponentialBackoffPlugin {
    config: RetryConfig,
}

pub struct LinearRetryPlugin {
    config: RetryConfig,
}

impl ExponentialBackoffPlugin {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl LinearRetryPlugin {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl RetryStrategyPlugin for ExponentialBackoffPlugin {
    fn name(&self) -> &str {
        "exponential-backoff"
    }

    // `attempt` counts failed attempts so far, starting at 1.
    fn next_delay(&self, attempt: u32, error: &BackendError) -> Option<Duration> {
        if attempt >= self.config.max_attempts || !error.is_retryable() {
            return None;
        }
        let exp = 1u64 << attempt.saturating_sub(1).min(30);
        let delay = self.config.base_delay_ms.saturating_mul(exp);
        let delay = delay.min(self.config.max_delay_ms);
        Some(Duration::from_millis(delay))
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}

impl RetryStrategyPlugin for LinearRetryPlugin {
    fn name(&self) -> &str {
        "linear"
    }

    fn next_delay(&self, attempt: u32, error: &BackendError) -> Option<Duration> {
        if attempt >= self.config.max_attempts || !error.is_retryable() {
            return None;
        }
        let multiplier = attempt.max(1) as u64;
        let delay = self.config.base_delay_ms.saturating_mul(multiplier);
        let delay = delay.min(self.config.max_delay_ms);
        Some(Duration::from_millis(delay))
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tribridge_core::api::{BackendKind, TransientKind};

    fn network() -> BackendError {
        BackendError::Transient {
            backend: BackendKind::Gemini,
            kind: TransientKind::Network,
            message: "reset".into(),
        }
    }

    #[test]
    fn test_exponential_backoff() {
        let cfg = RetryConfig {
            base_delay_ms: 100,
            max_delay_ms: 1000,
            max_attempts: 6,
            strategy: "exponential-backoff".to_string(),
        };
        let plugin = ExponentialBackoffPlugin::new(cfg);
        assert_eq!(plugin.next_delay(1, &network()).unwrap().as_millis(), 100);
        assert_eq!(plugin.next_delay(2, &network()).unwrap().as_millis(), 200);
        assert_eq!(plugin.next_delay(3, &network()).unwrap().as_millis(), 400);
        assert_eq!(plugin.next_delay(5, &network()).unwrap().as_millis(), 1000);
        assert_eq!(plugin.next_delay(6, &network()), None);
    }

    #[test]
    fn test_linear_backoff() {
        let cfg = RetryConfig {
            base_delay_ms: 50,
            max_delay_ms: 200,
            max_attempts: 4,
            strategy: "linear".to_string(),
        };
        let plugin = LinearRetryPlugin::new(cfg);
        assert_eq!(plugin.next_delay(1, &network()).unwrap().as_millis(), 50);
        assert_eq!(plugin.next_delay(3, &network()).unwrap().as_millis(), 150);
    }

    #[test]
    fn quota_and_auth_errors_are_fatal() {
        let plugin = ExponentialBackoffPlugin::new(RetryConfig::default());
        let quota = BackendError::QuotaExceeded {
            backend: BackendKind::AiStudio,
            retry_after: Duration::from_secs(30),
        };
        let auth = BackendError::Auth {
            backend: BackendKind::Claude,
            message: "expired".into(),
        };
        assert!(plugin.is_fatal_error(&quota));
        assert!(!plugin.should_retry(1, &auth));
        assert!(plugin.should_retry(1, &network()));
        assert_eq!(plugin.next_delay(1, &quota), None);
    }
}
