//! `xpost-core`: configuration, shared data model, error taxonomy,
//! notification queue and schedule-phrase parsing used by every other crate.

pub mod config;
pub mod date_parse;
pub mod error;
pub mod notify;
pub mod types;

pub use config::XpostConfig;
pub use error::{ConfigError, ValidationError};
pub use notify::{DeliveryError, Notification, NotificationSink, Notifier, NotifierWorker};
pub use types::{
    ApprovalCounts, ApprovalKind, ExternalRefs, NewPost, PostId, PostImage, SavedImage,
    ScheduledPost,
};
