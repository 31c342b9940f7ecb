//! SQLite persistence for scheduled posts, their image attachments and
//! peer approvals, plus the on-disk image directory.

pub mod db;
pub mod error;
pub mod images;
pub mod store;

pub use error::{Result, StoreError};
pub use images::{cleanup_images, is_supported_image, ImageStore, IMAGE_EXTENSIONS};
pub use store::PostStore;
