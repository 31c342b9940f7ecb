//! Scheduler status snapshot and the periodic health probe.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use xpost_core::config::SchedulerConfig;
use xpost_publish::PublishGateway;
use xpost_store::PostStore;

/// Result of one health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub checked_at: DateTime<Utc>,
    pub store_ok: bool,
    /// Due posts at probe time. `None` when the store probe failed.
    pub pending: Option<u64>,
    pub gateway_ok: bool,
}

impl HealthReport {
    pub fn healthy(&self) -> bool {
        self.store_ok && self.gateway_ok
    }
}

/// Point-in-time view of the publish loop, served by the health endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub loops: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub last_health: Option<HealthReport>,
    pub published: u64,
    pub failed: u64,
    pub errors: u64,
    pub slow_publishes: u64,
    /// Failures and errors inside the alert window at the last health pass.
    pub recent_errors: u64,
    pub error_alert: bool,
}

/// Shared, cloneable cell holding the current [`SchedulerStatus`].
#[derive(Clone, Default)]
pub struct StatusCell {
    inner: Arc<Mutex<SchedulerStatus>>,
}

impl StatusCell {
    pub fn snapshot(&self) -> SchedulerStatus {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut SchedulerStatus)) {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard);
    }
}

/// Probe the store and the gateway. Failures are logged, never returned.
pub async fn run_health_check(
    store: &PostStore,
    gateway: &dyn PublishGateway,
    now: DateTime<Utc>,
) -> HealthReport {
    let pending = match store.count_pending(now) {
        Ok(n) => Some(n),
        Err(e) => {
            warn!(error = %e, "health check: store probe failed");
            None
        }
    };
    let gateway_ok = gateway.check_health().await;

    let report = HealthReport {
        checked_at: now,
        store_ok: pending.is_some(),
        pending,
        gateway_ok,
    };
    if report.healthy() {
        info!(pending = ?report.pending, "health check ok");
    } else {
        warn!(
            store_ok = report.store_ok,
            gateway_ok = report.gateway_ok,
            "health check degraded"
        );
    }
    report
}

/// Error-rate alert settings. A zero threshold disables the alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorAlert {
    pub window: Duration,
    pub threshold: u64,
}

impl Default for ErrorAlert {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for ErrorAlert {
    fn from(cfg: &SchedulerConfig) -> Self {
        Self {
            window: Duration::from_secs(cfg.error_window_secs),
            threshold: cfg.error_alert_threshold,
        }
    }
}

/// Most failure timestamps kept; older entries fall off first.
const MAX_ERROR_HISTORY: usize = 1000;

/// Sliding window of recent publish failures and scheduler errors.
#[derive(Debug)]
pub struct ErrorWindow {
    alert: ErrorAlert,
    events: VecDeque<DateTime<Utc>>,
}

impl ErrorWindow {
    pub fn new(alert: ErrorAlert) -> Self {
        Self {
            alert,
            events: VecDeque::new(),
        }
    }

    pub fn record(&mut self, at: DateTime<Utc>, count: u64) {
        for _ in 0..count {
            if self.events.len() == MAX_ERROR_HISTORY {
                self.events.pop_front();
            }
            self.events.push_back(at);
        }
    }

    /// Events newer than `now - window`. Older ones are discarded.
    pub fn count(&mut self, now: DateTime<Utc>) -> u64 {
        let window = chrono::Duration::from_std(self.alert.window).unwrap_or(chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);
        while self.events.front().is_some_and(|at| *at <= cutoff) {
            self.events.pop_front();
        }
        self.events.len() as u64
    }

    /// `Some(count)` when the window holds at least `threshold` events.
    pub fn check(&mut self, now: DateTime<Utc>) -> Option<u64> {
        if self.alert.threshold == 0 {
            return None;
        }
        let count = self.count(now);
        if count < self.alert.threshold {
            return None;
        }
        warn!(
            recent_errors = count,
            threshold = self.alert.threshold,
            window_secs = self.alert.window.as_secs(),
            "error rate above threshold"
        );
        Some(count)
    }

    pub fn alert(&self) -> ErrorAlert {
        self.alert
    }
}
