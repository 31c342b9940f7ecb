//! `xpost-scheduler`: the background loop that publishes due posts.
//!
//! # Overview
//!
//! [`PublishScheduler`] wakes every few seconds and, once the check interval
//! has elapsed, runs a reconciliation tick through [`Reconciler`]:
//!
//! 1. load every unpublished post whose scheduled time has passed;
//! 2. for each one, publish through the [`xpost_publish::PublishGateway`];
//! 3. on success mark it posted and delete its local images; on failure
//!    leave it pending so the next scan retries it.
//!
//! Every outcome is reported through the [`xpost_core::Notifier`]. One post
//! failing, erroring or panicking never stops the others in the same tick.

pub mod engine;
pub mod error;
pub mod health;
pub mod reconcile;

pub use engine::{PublishScheduler, Timing};
pub use error::{Result, SchedulerError};
pub use health::{
    run_health_check, ErrorAlert, ErrorWindow, HealthReport, SchedulerStatus, StatusCell,
};
pub use reconcile::{PostOutcome, Reconciler, TickSummary};
