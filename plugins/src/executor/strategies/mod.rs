pub mod concurrency;
pub mod retry;

pub use concurrency::{BackendAwareConcurrencyPlugin, FixedConcurrencyPlugin};
pub use retry::{ExponentialBackoffPlugin, LinearRetryPlugin};
