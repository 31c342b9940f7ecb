use xpost_core::ValidationError;
use xpost_store::StoreError;

/// Errors produced by the Discord adapter.
#[derive(Debug, thiserror::Error)]
pub enum DiscordError {
    #[error("serenity error: {0}")]
    Serenity(#[from] serenity::Error),

    #[error("no bot token configured")]
    NoToken,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("attachment download failed: {0}")]
    Download(#[from] reqwest::Error),
}

impl DiscordError {
    /// Stable code for logs. Validation failures keep their own code.
    pub fn code(&self) -> &'static str {
        match self {
            DiscordError::Validation(e) | DiscordError::Store(StoreError::Validation(e)) => e.code(),
            DiscordError::Serenity(_) => "DISCORD_API",
            DiscordError::NoToken => "NO_TOKEN",
            DiscordError::Store(_) => "STORE",
            DiscordError::Download(_) => "DOWNLOAD",
        }
    }

    /// Text shown to the user who ran the command.
    pub fn user_message(&self) -> String {
        match self {
            DiscordError::Validation(e) => format!("\u{274c} {e}"),
            DiscordError::Store(StoreError::Validation(e)) => format!("\u{274c} {e}"),
            DiscordError::Download(_) => {
                "\u{274c} Could not download an attachment. Please try again.".to_string()
            }
            _ => "\u{274c} Something went wrong while scheduling the post.".to_string(),
        }
    }
}
