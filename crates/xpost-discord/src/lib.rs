//! Discord front end: `/post` and `/help` slash commands, approval buttons,
//! and the operations-channel notification sink.

pub mod adapter;
pub mod approval;
pub mod attach;
pub mod commands;
pub mod context;
pub mod embed;
pub mod error;
pub mod handler;
pub mod sink;

pub use adapter::DiscordAdapter;
pub use context::BotState;
pub use error::DiscordError;
pub use sink::DiscordSink;
