use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    /// The platform accepted the request but returned no post id.
    #[error("platform returned no post id")]
    NoId,

    /// One attachment failed to upload. The post itself may still be created.
    #[error("media upload failed for {path}: {reason}")]
    MediaUpload { path: String, reason: String },

    #[error("publish timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PublishError>;
