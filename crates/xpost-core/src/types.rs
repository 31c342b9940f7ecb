use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Row id of a scheduled post (SQLite INTEGER PRIMARY KEY, monotonic).
pub type PostId = i64;

/// References back to the chat message that created a post.
///
/// Opaque strings; the store never interprets them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalRefs {
    pub discord_message_id: Option<String>,
    pub guild_id: Option<String>,
    pub channel_id: Option<String>,
}

/// Input for creating a post.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub content: String,
    pub scheduled_time: DateTime<Utc>,
    pub refs: ExternalRefs,
    pub has_images: bool,
}

/// A persisted scheduled post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledPost {
    pub id: PostId,
    pub content: String,
    /// Due-comparison key.
    pub scheduled_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Set exactly once, together with `is_posted`.
    pub posted_at: Option<DateTime<Utc>>,
    pub is_posted: bool,
    pub has_images: bool,
    pub refs: ExternalRefs,
}

impl ScheduledPost {
    /// Unpublished and at or past its scheduled time.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_posted && self.scheduled_time <= now
    }
}

/// An image attached to a post, stored on local disk until published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostImage {
    pub id: i64,
    pub post_id: PostId,
    pub file_path: String,
    pub original_filename: String,
    pub file_size: u64,
}

/// An attachment written to disk but not yet linked to a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedImage {
    pub file_path: String,
    pub original_filename: String,
    pub file_size: u64,
}

/// A peer vote on a scheduled post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalKind {
    Good,
    Bad,
}

impl fmt::Display for ApprovalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApprovalKind::Good => "good",
            ApprovalKind::Bad => "bad",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ApprovalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "good" => Ok(ApprovalKind::Good),
            "bad" => Ok(ApprovalKind::Bad),
            other => Err(format!("unknown approval type: {other}")),
        }
    }
}

/// Aggregate vote counts for one post. Missing rows count as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalCounts {
    pub good: u32,
    pub bad: u32,
}
