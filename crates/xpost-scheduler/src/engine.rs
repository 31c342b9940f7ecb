use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn, Instrument};

use xpost_core::config::SchedulerConfig;

use crate::error::{Result, SchedulerError};
use crate::health::{run_health_check, ErrorAlert, ErrorWindow, SchedulerStatus, StatusCell};
use crate::reconcile::Reconciler;

/// Loop cadence. The loop wakes every `wake_interval` but only scans the
/// store once `check_interval` has elapsed since the previous scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub wake_interval: Duration,
    pub check_interval: Duration,
    /// Run a health probe every N wakes. `0` disables it.
    pub health_check_every: u64,
}

impl From<&SchedulerConfig> for Timing {
    fn from(cfg: &SchedulerConfig) -> Self {
        Self {
            wake_interval: Duration::from_secs(cfg.loop_interval_secs),
            check_interval: Duration::from_secs(cfg.check_interval_secs),
            health_check_every: cfg.health_check_every,
        }
    }
}

/// Background publish loop with a `Stopped`/`Running` lifecycle.
///
/// `start` spawns the loop; `stop` asks it to exit after the current wake.
/// A tick already in progress is never cancelled. Each run owns its own
/// shutdown channel, and a restarted loop waits for the previous one to exit
/// before its first scan, so at most one loop publishes at a time.
pub struct PublishScheduler {
    reconciler: Arc<Reconciler>,
    timing: Timing,
    alert: ErrorAlert,
    running: AtomicBool,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    status: StatusCell,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PublishScheduler {
    pub fn new(reconciler: Reconciler, timing: Timing) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
            timing,
            alert: ErrorAlert::default(),
            running: AtomicBool::new(false),
            shutdown: Mutex::new(None),
            status: StatusCell::default(),
            task: Mutex::new(None),
        }
    }

    pub fn with_error_alert(mut self, alert: ErrorAlert) -> Self {
        self.alert = alert;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> StatusCell {
        self.status.clone()
    }

    pub fn snapshot(&self) -> SchedulerStatus {
        self.status.snapshot()
    }

    /// `Stopped -> Running`. Fails with [`SchedulerError::AlreadyRunning`]
    /// instead of starting a second loop.
    pub fn start(&self) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SchedulerError::AlreadyRunning);
        }

        let (tx, rx) = watch::channel(false);
        // The previous run's sender was already flipped by `stop`.
        *lock(&self.shutdown) = Some(tx);
        self.status.update(|s| s.running = true);

        let ctx = LoopContext {
            reconciler: Arc::clone(&self.reconciler),
            timing: self.timing,
            errors: ErrorWindow::new(self.alert),
            shutdown: rx,
            status: self.status.clone(),
        };

        let mut task = lock(&self.task);
        let previous = task.take();
        *task = Some(tokio::spawn(async move {
            if let Some(prev) = previous {
                if !prev.is_finished() {
                    debug!("waiting for the previous publish loop to exit");
                }
                if let Err(e) = prev.await {
                    error!(error = %e, "previous publish loop ended abnormally");
                }
            }
            ctx.run().await;
        }));
        info!(
            wake_secs = self.timing.wake_interval.as_secs_f64(),
            check_secs = self.timing.check_interval.as_secs_f64(),
            "publish scheduler started"
        );
        Ok(())
    }

    /// `Running -> Stopped`. Returns immediately; see [`Self::wait`].
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("publish scheduler stopping");
        }
        if let Some(tx) = lock(&self.shutdown).as_ref() {
            tx.send_replace(true);
        }
        self.status.update(|s| s.running = false);
    }

    /// Wait for the loop task (and any run it replaced) to exit after [`Self::stop`].
    pub async fn wait(&self) {
        let handle = lock(&self.task).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "publish loop task ended abnormally");
            }
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// Whether a scan is due at the tick scheduled for `tick`.
///
/// Measured between tick deadlines, so a late wake does not push the next
/// scan back by a whole wake interval.
fn scan_due(last_scan: Option<Instant>, tick: Instant, check_interval: Duration) -> bool {
    last_scan.map_or(true, |at| tick.saturating_duration_since(at) >= check_interval)
}

struct LoopContext {
    reconciler: Arc<Reconciler>,
    timing: Timing,
    errors: ErrorWindow,
    shutdown: watch::Receiver<bool>,
    status: StatusCell,
}

impl LoopContext {
    async fn run(mut self) {
        let mut interval = tokio::time::interval(self.timing.wake_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_scan: Option<Instant> = None;
        let mut loops: u64 = 0;

        loop {
            tokio::select! {
                tick = interval.tick() => {
                    if *self.shutdown.borrow() {
                        break;
                    }
                    loops += 1;
                    let now = Utc::now();
                    self.status.update(|s| {
                        s.loops = loops;
                        s.last_tick_at = Some(now);
                    });

                    if scan_due(last_scan, tick, self.timing.check_interval) {
                        last_scan = Some(tick);
                        self.scan(now).instrument(info_span!("tick", loop_no = loops)).await;
                    }

                    let every = self.timing.health_check_every;
                    if every > 0 && loops % every == 0 {
                        self.health_pass().await;
                    }
                }
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(loops, "publish loop exited");
    }

    async fn scan(&mut self, now: chrono::DateTime<Utc>) {
        debug!("scanning for due posts");
        match self.reconciler.check_and_post(now).await {
            Ok(summary) => {
                self.errors
                    .record(now, (summary.failed + summary.errored) as u64);
                self.status.update(|s| {
                    s.last_scan_at = Some(now);
                    s.published += summary.published as u64;
                    s.failed += summary.failed as u64;
                    s.errors += summary.errored as u64;
                    s.slow_publishes += summary.slow as u64;
                });
            }
            Err(e) => {
                warn!(error = %e, "tick aborted");
                self.errors.record(now, 1);
                self.status.update(|s| {
                    s.last_scan_at = Some(now);
                    s.errors += 1;
                });
            }
        }
    }

    /// Store and gateway probe plus the error-rate check.
    async fn health_pass(&mut self) {
        let now = Utc::now();
        let report = run_health_check(
            self.reconciler.store(),
            self.reconciler.gateway(),
            now,
        )
        .await;

        let alert = self.errors.check(now);
        if let Some(count) = alert {
            let window = self.errors.alert().window.as_secs();
            self.reconciler.notifier().notify_error(format!(
                "error rate above threshold: {count} failures in the last {window}s"
            ));
        }
        let recent = self.errors.count(now);
        self.status.update(|s| {
            s.last_health = Some(report);
            s.recent_errors = recent;
            s.error_alert = alert.is_some();
        });
    }
}
