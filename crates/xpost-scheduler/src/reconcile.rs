//! One reconciliation tick: scan due posts and try to publish each of them.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use tracing::{error, info, info_span, warn, Instrument};

use xpost_core::config::DEFAULT_SLOW_PUBLISH_MS;
use xpost_core::{Notifier, ScheduledPost};
use xpost_publish::{PublishError, PublishGateway};
use xpost_store::{cleanup_images, PostStore, StoreError};

/// What happened to one post during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    Published { external_id: String },
    /// The gateway failed. The post stays pending and is retried next scan.
    Failed { reason: String },
    /// Storage failure or panic while handling this post.
    Errored { message: String },
}

/// Totals for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub attempted: usize,
    pub published: usize,
    pub failed: usize,
    pub errored: usize,
    /// Attempts that took longer than the slow-publish threshold.
    pub slow: usize,
}

impl TickSummary {
    fn record(&mut self, outcome: &PostOutcome) {
        self.attempted += 1;
        match outcome {
            PostOutcome::Published { .. } => self.published += 1,
            PostOutcome::Failed { .. } => self.failed += 1,
            PostOutcome::Errored { .. } => self.errored += 1,
        }
    }
}

/// Publishes due posts through a [`PublishGateway`] and records the result.
pub struct Reconciler {
    store: PostStore,
    gateway: Arc<dyn PublishGateway>,
    notifier: Notifier,
    publish_timeout: Duration,
    slow_threshold: Option<Duration>,
}

impl Reconciler {
    pub fn new(
        store: PostStore,
        gateway: Arc<dyn PublishGateway>,
        notifier: Notifier,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            publish_timeout,
            slow_threshold: Some(Duration::from_millis(DEFAULT_SLOW_PUBLISH_MS)),
        }
    }

    /// Warn about publish attempts slower than `threshold`. Zero disables.
    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = (!threshold.is_zero()).then_some(threshold);
        self
    }

    pub fn store(&self) -> &PostStore {
        &self.store
    }

    pub fn gateway(&self) -> &dyn PublishGateway {
        self.gateway.as_ref()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Attempt every post due at `now`, sequentially, each at most once.
    ///
    /// A failing query aborts the tick and is reported once as a scheduler
    /// error. Per-post failures never abort the tick.
    pub async fn check_and_post(&self, now: DateTime<Utc>) -> Result<TickSummary, StoreError> {
        let pending = match self.store.get_pending_posts(now) {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "pending-post query failed");
                self.notifier
                    .notify_error(format!("failed to load pending posts: {e}"));
                return Err(e);
            }
        };

        let mut summary = TickSummary::default();
        if pending.is_empty() {
            return Ok(summary);
        }
        info!(pending = pending.len(), "processing due posts");

        for post in &pending {
            let span = info_span!("post", post_id = post.id);
            let outcome = match AssertUnwindSafe(self.process_post(post).instrument(span))
                .catch_unwind()
                .await
            {
                Ok(Ok((outcome, elapsed))) => {
                    if self.is_slow(elapsed) {
                        summary.slow += 1;
                        warn!(
                            post_id = post.id,
                            elapsed_ms = elapsed.as_millis() as u64,
                            threshold_ms = self.slow_threshold.map_or(0, |t| t.as_millis() as u64),
                            "slow publish"
                        );
                    }
                    outcome
                }
                Ok(Err(e)) => {
                    error!(post_id = post.id, error = %e, "storage error while publishing post");
                    let message = format!("post {}: {e}", post.id);
                    self.notifier.notify_error(message.clone());
                    PostOutcome::Errored { message }
                }
                Err(panic) => {
                    let message = format!("post {}: panicked: {}", post.id, panic_message(&*panic));
                    error!(post_id = post.id, "{message}");
                    self.notifier.notify_error(message.clone());
                    PostOutcome::Errored { message }
                }
            };
            summary.record(&outcome);
        }

        info!(
            attempted = summary.attempted,
            published = summary.published,
            failed = summary.failed,
            errored = summary.errored,
            slow = summary.slow,
            "tick complete"
        );
        Ok(summary)
    }

    fn is_slow(&self, elapsed: Duration) -> bool {
        self.slow_threshold.is_some_and(|t| elapsed > t)
    }

    /// Returns the outcome and how long the publish call took.
    async fn process_post(
        &self,
        post: &ScheduledPost,
    ) -> Result<(PostOutcome, Duration), StoreError> {
        let paths: Vec<String> = if post.has_images {
            self.store
                .get_images(post.id)?
                .into_iter()
                .map(|img| img.file_path)
                .collect()
        } else {
            Vec::new()
        };

        let started = std::time::Instant::now();
        let result = match tokio::time::timeout(
            self.publish_timeout,
            self.gateway.publish(&post.content, &paths),
        )
        .await
        {
            Ok(r) => r,
            Err(_) => Err(PublishError::Timeout {
                secs: self.publish_timeout.as_secs(),
            }),
        };
        let elapsed = started.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;

        match result {
            Ok(external_id) if !external_id.is_empty() => {
                self.store.mark_posted(post.id, Utc::now())?;
                if !paths.is_empty() {
                    cleanup_images(&paths).await;
                }
                info!(post_id = post.id, external_id = %external_id, elapsed_ms, "post published");
                self.notifier.notify_success(post, &external_id);
                Ok((PostOutcome::Published { external_id }, elapsed))
            }
            Ok(_) => Ok((self.failed(post, PublishError::NoId, elapsed_ms), elapsed)),
            Err(e) => Ok((self.failed(post, e, elapsed_ms), elapsed)),
        }
    }

    fn failed(&self, post: &ScheduledPost, err: PublishError, elapsed_ms: u64) -> PostOutcome {
        let reason = err.to_string();
        warn!(post_id = post.id, error = %reason, elapsed_ms, "publish failed, will retry");
        self.notifier.notify_failure(post, &reason);
        PostOutcome::Failed { reason }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
