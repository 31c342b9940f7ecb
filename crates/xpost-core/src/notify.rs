//! Publish outcome notifications.
//!
//! The scheduler never talks to a chat channel directly. It pushes
//! [`Notification`]s into a bounded queue through a cloneable [`Notifier`];
//! a single worker task drains the queue into a [`NotificationSink`]
//! (the Discord operations channel in production).
//!
//! Enqueueing is non-blocking. Delivery failures are logged and dropped.
//! Dropping every `Notifier` clone closes the queue, and
//! [`NotifierWorker::join`] waits until everything already queued has been
//! handed to the sink, so shutdown does not lose reports.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::types::ScheduledPost;

/// One report about a publish attempt or a scheduler fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Published {
        post: ScheduledPost,
        external_id: String,
    },
    Failed {
        post: ScheduledPost,
        reason: String,
    },
    SchedulerError {
        message: String,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Published { .. } => "published",
            Notification::Failed { .. } => "failed",
            Notification::SchedulerError { .. } => "scheduler_error",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("notification delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Destination for notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError>;
}

/// Cheap, cloneable producer side of the notification queue.
#[derive(Clone, Debug)]
pub struct Notifier {
    tx: Option<mpsc::Sender<Notification>>,
}

/// Handle to the background delivery task.
pub struct NotifierWorker {
    handle: JoinHandle<u64>,
}

impl NotifierWorker {
    /// Wait for the queue to drain. Returns the number of notifications delivered.
    ///
    /// Only completes once every `Notifier` clone has been dropped.
    pub async fn join(self) -> u64 {
        match self.handle.await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "notifier worker ended abnormally");
                0
            }
        }
    }
}

impl Notifier {
    /// A notifier with no destination: every call is a no-op.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Start the delivery worker for `sink` with a queue of `capacity` items.
    pub fn spawn<S: NotificationSink>(sink: S, capacity: usize) -> (Self, NotifierWorker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_worker(sink, rx));
        (Self { tx: Some(tx) }, NotifierWorker { handle })
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    pub fn notify_success(&self, post: &ScheduledPost, external_id: &str) {
        self.enqueue(Notification::Published {
            post: post.clone(),
            external_id: external_id.to_string(),
        });
    }

    pub fn notify_failure(&self, post: &ScheduledPost, reason: &str) {
        self.enqueue(Notification::Failed {
            post: post.clone(),
            reason: reason.to_string(),
        });
    }

    pub fn notify_error(&self, message: impl Into<String>) {
        self.enqueue(Notification::SchedulerError {
            message: message.into(),
        });
    }

    fn enqueue(&self, notification: Notification) {
        let Some(ref tx) = self.tx else {
            return;
        };
        // try_send never blocks the scheduler tick.
        if let Err(e) = tx.try_send(notification) {
            warn!(error = %e, "notification queue full or closed, notification dropped");
        }
    }
}

async fn run_worker<S: NotificationSink>(sink: S, mut rx: mpsc::Receiver<Notification>) -> u64 {
    let mut delivered = 0u64;
    while let Some(notification) = rx.recv().await {
        match sink.deliver(&notification).await {
            Ok(()) => {
                delivered += 1;
                debug!(sink = sink.name(), kind = notification.kind(), "notification delivered");
            }
            Err(e) => {
                warn!(sink = sink.name(), kind = notification.kind(), error = %e, "notification delivery failed");
            }
        }
    }
    info!(sink = sink.name(), delivered, "notifier worker exiting (queue closed)");
    delivered
}
