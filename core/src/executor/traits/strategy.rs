use std::time::Duration;

use crate::backend::BackendKind;
use crate::error::BackendError;

/// 重试策略插件
pub trait RetryStrategyPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn next_delay(&self, attempt: u32, error: &BackendError) -> Option<Duration>;
    fn max_attempts(&self) -> u32;
    fn should_retry(&self, attempt: u32, error: &BackendError) -> bool {
        attempt < self.max_attempts() && !self.is_fatal_error(error)
    }
    /// Auth, quota and unavailability are never retried in place.
    fn is_fatal_error(&self, error: &BackendError) -> bool {
        !error.is_retryable()
    }
}

/// 并发控制策略插件
pub trait ConcurrencyStrategyPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn calculate_concurrency(&self, context: &ConcurrencyContext) -> usize;
}

#[derive(Debug, Clone)]
pub struct ConcurrencyContext {
    pub base_concurrency: usize,
    pub level_size: usize,
    pub backends: Vec<BackendKind>,
}

impl ConcurrencyContext {
    pub fn distinct_backends(&self) -> usize {
        let mut seen = self.backends.clone();
        seen.sort();
        seen.dedup();
        seen.len()
    }
}
