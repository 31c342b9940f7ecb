use thiserror::Error;
use xpost_store::StoreError;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// `start()` was called while the loop is already running.
    #[error("scheduler is already running")]
    AlreadyRunning,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
