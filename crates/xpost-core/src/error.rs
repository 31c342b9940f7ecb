use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Load(String),

    #[error("Missing required credentials: {0}")]
    MissingCredentials(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Caller-supplied data rejected before it reaches the store or scheduler.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("could not understand time `{0}`")]
    UnparsableTime(String),

    #[error("scheduled time {0} is not in the future")]
    PastTime(String),

    #[error("unsupported file type: {filename}")]
    UnsupportedFileType { filename: String },

    #[error("file too large: {filename} is {size} bytes (max {max})")]
    FileTooLarge {
        filename: String,
        size: u64,
        max: u64,
    },

    #[error("too many attachments: {count} (max {max})")]
    TooManyAttachments { count: usize, max: usize },

    #[error("post content is empty")]
    EmptyContent,
}

impl ValidationError {
    /// Short error code, logged alongside rejected requests.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::UnparsableTime(_) => "UNPARSABLE_TIME",
            ValidationError::PastTime(_) => "PAST_TIME",
            ValidationError::UnsupportedFileType { .. } => "UNSUPPORTED_FILE_TYPE",
            ValidationError::FileTooLarge { .. } => "FILE_TOO_LARGE",
            ValidationError::TooManyAttachments { .. } => "TOO_MANY_ATTACHMENTS",
            ValidationError::EmptyContent => "EMPTY_CONTENT",
        }
    }
}
