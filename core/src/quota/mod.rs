//! Admission control for backend calls.
//!
//! A call first asks [`AdmissionControl::can_proceed`], which also reserves a
//! slot in the rate windows when it answers `Allowed`; the outcome is reported
//! through [`AdmissionControl::record`] afterwards.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::backend::BackendKind;
use crate::executor::types::millis;

const MINUTE: Duration = Duration::from_secs(60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Outcome of one backend call.
#[derive(Debug, Clone, Default)]
pub struct CallRecord {
    pub success: bool,
    pub latency: Duration,
    pub cost: f64,
    /// Set when the backend itself reported quota exhaustion.
    pub quota_exhausted_for: Option<Duration>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct UsageStats {
    pub calls: u64,
    pub failures: u64,
    pub denied: u64,
    pub total_latency_ms: u64,
    pub total_cost: f64,
}

impl UsageStats {
    pub fn average_latency_ms(&self) -> u64 {
        if self.calls == 0 {
            0
        } else {
            self.total_latency_ms / self.calls
        }
    }
}

pub trait AdmissionControl: Send + Sync {
    fn can_proceed(&self, backend: BackendKind) -> Admission;
    fn record(&self, backend: BackendKind, call: &CallRecord);
    fn stats(&self, _backend: BackendKind) -> UsageStats {
        UsageStats::default()
    }
}

/// Admits everything; used when quotas are disabled and in tests.
#[derive(Debug, Default)]
pub struct Unlimited;

impl AdmissionControl for Unlimited {
    fn can_proceed(&self, _backend: BackendKind) -> Admission {
        Admission::Allowed
    }

    fn record(&self, _backend: BackendKind, _call: &CallRecord) {}
}

/// Per-backend request limits; zero means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendQuota {
    #[serde(default)]
    pub requests_per_minute: u32,
    #[serde(default)]
    pub requests_per_day: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub claude: BackendQuota,
    #[serde(default = "default_gemini_quota")]
    pub gemini: BackendQuota,
    #[serde(default = "default_aistudio_quota")]
    pub aistudio: BackendQuota,
}

fn default_enabled() -> bool {
    true
}

fn default_gemini_quota() -> BackendQuota {
    BackendQuota {
        requests_per_minute: 60,
        requests_per_day: 1000,
    }
}

fn default_aistudio_quota() -> BackendQuota {
    BackendQuota {
        requests_per_minute: 15,
        requests_per_day: 1500,
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            claude: BackendQuota::default(),
            gemini: default_gemini_quota(),
            aistudio: default_aistudio_quota(),
        }
    }
}

impl QuotaConfig {
    pub fn for_backend(&self, backend: BackendKind) -> BackendQuota {
        match backend {
            BackendKind::Claude => self.claude,
            BackendKind::Gemini => self.gemini,
            BackendKind::AiStudio => self.aistudio,
        }
    }
}

#[derive(Debug, Default)]
struct Window {
    minute: VecDeque<Instant>,
    day: VecDeque<Instant>,
    blocked_until: Option<Instant>,
    stats: UsageStats,
}

impl Window {
    fn prune(&mut self, now: Instant) {
        while self
            .minute
            .front()
            .is_some_and(|t| now.duration_since(*t) >= MINUTE)
        {
            self.minute.pop_front();
        }
        while self
            .day
            .front()
            .is_some_and(|t| now.duration_since(*t) >= DAY)
        {
            self.day.pop_front();
        }
        if self.blocked_until.is_some_and(|until| until <= now) {
            self.blocked_until = None;
        }
    }
}

/// Sliding minute/day windows per backend plus a "blocked until" instant.
pub struct QuotaTracker {
    limits: QuotaConfig,
    windows: Mutex<HashMap<BackendKind, Window>>,
}

impl QuotaTracker {
    pub fn new(limits: QuotaConfig) -> Self {
        Self {
            limits,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<BackendKind, Window>> {
        match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl AdmissionControl for QuotaTracker {
    fn can_proceed(&self, backend: BackendKind) -> Admission {
        let limits = self.limits.for_backend(backend);
        let now = Instant::now();
        let mut windows = self.lock();
        let window = windows.entry(backend).or_default();
        window.prune(now);

        let wait = if let Some(until) = window.blocked_until {
            Some(until.duration_since(now))
        } else if limits.requests_per_minute > 0
            && window.minute.len() >= limits.requests_per_minute as usize
        {
            window.minute.front().map(|t| MINUTE.saturating_sub(now.duration_since(*t)))
        } else if limits.requests_per_day > 0 && window.day.len() >= limits.requests_per_day as usize
        {
            window.day.front().map(|t| DAY.saturating_sub(now.duration_since(*t)))
        } else {
            None
        };

        match wait {
            Some(retry_after) => {
                window.stats.denied += 1;
                tracing::debug!("quota denied for '{}', retry in {:?}", backend, retry_after);
                Admission::Denied { retry_after }
            }
            None => {
                window.minute.push_back(now);
                window.day.push_back(now);
                Admission::Allowed
            }
        }
    }

    fn record(&self, backend: BackendKind, call: &CallRecord) {
        let mut windows = self.lock();
        let window = windows.entry(backend).or_default();
        window.stats.calls += 1;
        if !call.success {
            window.stats.failures += 1;
        }
        window.stats.total_latency_ms += millis(call.latency);
        window.stats.total_cost += call.cost;

        if let Some(wait) = call.quota_exhausted_for {
            let until = Instant::now() + wait;
            window.blocked_until = Some(window.blocked_until.map_or(until, |u| u.max(until)));
            tracing::warn!("backend '{}' reported quota exhaustion; blocked for {:?}", backend, wait);
        }
    }

    fn stats(&self, backend: BackendKind) -> UsageStats {
        self.lock()
            .get(&backend)
            .map(|w| w.stats)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(rpm: u32) -> QuotaTracker {
        QuotaTracker::new(QuotaConfig {
            enabled: true,
            claude: BackendQuota::default(),
            gemini: BackendQuota {
                requests_per_minute: rpm,
                requests_per_day: 0,
            },
            aistudio: BackendQuota::default(),
        })
    }

    #[test]
    fn minute_window_denies_past_limit() {
        let t = tracker(2);
        assert!(t.can_proceed(BackendKind::Gemini).is_allowed());
        assert!(t.can_proceed(BackendKind::Gemini).is_allowed());
        match t.can_proceed(BackendKind::Gemini) {
            Admission::Denied { retry_after } => assert!(retry_after <= MINUTE),
            Admission::Allowed => panic!("third call should be denied"),
        }
        // Other backends are independent.
        assert!(t.can_proceed(BackendKind::Claude).is_allowed());
        assert_eq!(t.stats(BackendKind::Gemini).denied, 1);
    }

    #[test]
    fn reported_exhaustion_blocks_backend() {
        let t = tracker(0);
        t.record(
            BackendKind::Gemini,
            &CallRecord {
                success: false,
                latency: Duration::from_millis(40),
                cost: 0.0,
                quota_exhausted_for: Some(Duration::from_secs(30)),
            },
        );
        assert!(matches!(
            t.can_proceed(BackendKind::Gemini),
            Admission::Denied { retry_after } if retry_after <= Duration::from_secs(30)
        ));
        let stats = t.stats(BackendKind::Gemini);
        assert_eq!(stats.calls, 1);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.average_latency_ms(), 40);
    }

    #[test]
    fn unlimited_always_allows() {
        let u = Unlimited;
        for _ in 0..100 {
            assert!(u.can_proceed(BackendKind::AiStudio).is_allowed());
        }
    }
}
