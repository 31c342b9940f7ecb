//! Embeds for the confirmation message, `/help`, and the operations channel.
//!
//! Everything is first built as a plain [`EmbedSpec`] so the text can be
//! checked without a gateway connection, then converted to a serenity builder.

use chrono::{DateTime, Local, Utc};
use serenity::builder::{CreateEmbed, CreateEmbedFooter};
use serenity::model::Timestamp;

use xpost_core::date_parse::supported_formats;
use xpost_core::{ApprovalCounts, Notification, ScheduledPost};

pub const COLOR_BRAND: u32 = 0x1DA1F2;
pub const COLOR_SUCCESS: u32 = 0x00FF00;
pub const COLOR_FAILURE: u32 = 0xFF0000;
pub const COLOR_ERROR: u32 = 0xFFFF00;

/// Discord caps embed descriptions at 4096 characters.
const MAX_DESCRIPTION: usize = 4000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedSpec {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub fields: Vec<(String, String, bool)>,
    pub footer: Option<String>,
    pub timestamped: bool,
}

impl EmbedSpec {
    fn new(title: &str, description: String, color: u32) -> Self {
        Self {
            title: title.to_string(),
            description: truncate(&description, MAX_DESCRIPTION),
            color,
            fields: Vec::new(),
            footer: None,
            timestamped: false,
        }
    }

    fn field(mut self, name: &str, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push((name.to_string(), value.into(), inline));
        self
    }

    /// Convert to a serenity `CreateEmbed` builder.
    pub fn to_create_embed(&self) -> CreateEmbed {
        let mut e = CreateEmbed::new()
            .title(&self.title)
            .description(&self.description)
            .colour(self.color);
        for (name, value, inline) in &self.fields {
            e = e.field(name, value, *inline);
        }
        if let Some(ref f) = self.footer {
            e = e.footer(CreateEmbedFooter::new(f));
        }
        if self.timestamped {
            e = e.timestamp(Timestamp::now());
        }
        e
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push('\u{2026}');
    out
}

/// Scheduled time as shown to users, in the bot's local timezone.
pub fn display_time(t: DateTime<Utc>) -> String {
    t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// The message posted when a post is scheduled, re-rendered on every vote.
pub fn confirmation(post: &ScheduledPost, image_count: usize, counts: ApprovalCounts) -> EmbedSpec {
    let description = format!(
        "**Content:**\n{}\n\n**Scheduled for:**\n{}",
        post.content,
        display_time(post.scheduled_time)
    );
    let mut spec = EmbedSpec::new("\u{1f4dd} Post scheduled", description, COLOR_BRAND);
    if image_count > 0 {
        spec = spec.field("\u{1f5bc}\u{fe0f} Images", image_count.to_string(), false);
    }
    spec = spec
        .field("\u{1f44d} Good", counts.good.to_string(), true)
        .field("\u{1f44e} Bad", counts.bad.to_string(), true);
    spec.footer = Some(format!("Post #{}", post.id));
    spec
}

pub fn help() -> EmbedSpec {
    let examples = "\
• `/post content:\"Hello!\" time:\"30分後\"`\n\
• `/post content:\"Daily update\" time:\"14:30\"`\n\
• `/post content:\"Teaser\" time:\"01/15 10:00\"`\n\
• `/post content:\"Launch day\" time:\"2025-01-20 15:30\" image1:<file>`";

    let mut spec = EmbedSpec::new(
        "\u{1f916} XPostPlanner",
        "Schedule posts to X (Twitter) and collect team feedback before they go out.".to_string(),
        COLOR_BRAND,
    )
    .field(
        "\u{1f4dd} Scheduling",
        "`/post content:<text> time:<when> [image1..image4]`\nUp to 4 images (jpg, jpeg, png, gif, webp; 10 MB each).",
        false,
    )
    .field("\u{1f4c5} Time formats", supported_formats(), false)
    .field("\u{1f4a1} Examples", examples, false)
    .field(
        "\u{1f465} Approval",
        "Press \u{1f44d} or \u{1f44e} on a scheduled post to vote. Votes are advisory; \
         the post is published at its scheduled time either way.",
        false,
    );
    spec.footer = Some("XPostPlanner".to_string());
    spec
}

/// Operations-channel report for one notification.
pub fn notification(n: &Notification) -> EmbedSpec {
    let mut spec = match n {
        Notification::Published { post, external_id } => EmbedSpec::new(
            "\u{2705} Post published",
            format!("**Content:**\n{}\n\n**Post ID:** {external_id}", post.content),
            COLOR_SUCCESS,
        ),
        Notification::Failed { post, reason } => EmbedSpec::new(
            "\u{274c} Post failed",
            format!(
                "**Content:**\n{}\n\n**Scheduled for:** {}\n**Reason:** {reason}\n\nIt will be retried on the next check.",
                post.content,
                display_time(post.scheduled_time)
            ),
            COLOR_FAILURE,
        ),
        Notification::SchedulerError { message } => EmbedSpec::new(
            "\u{26a0}\u{fe0f} Scheduler error",
            format!("**Error:**\n{message}"),
            COLOR_ERROR,
        ),
    };
    spec.timestamped = true;
    spec
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use xpost_core::ExternalRefs;

    fn post() -> ScheduledPost {
        let at = Utc.with_ymd_and_hms(2025, 1, 20, 6, 30, 0).unwrap();
        ScheduledPost {
            id: 42,
            content: "Launch day".into(),
            scheduled_time: at,
            created_at: at,
            posted_at: None,
            is_posted: false,
            has_images: false,
            refs: ExternalRefs::default(),
        }
    }

    #[test]
    fn confirmation_shows_counts_and_post_id() {
        let spec = confirmation(&post(), 0, ApprovalCounts { good: 2, bad: 1 });
        assert!(spec.description.contains("Launch day"));
        assert!(spec.description.contains(&display_time(post().scheduled_time)));
        assert_eq!(spec.fields.len(), 2);
        assert_eq!(spec.fields[0], ("\u{1f44d} Good".into(), "2".into(), true));
        assert_eq!(spec.fields[1].1, "1");
        assert_eq!(spec.footer.as_deref(), Some("Post #42"));
    }

    #[test]
    fn confirmation_lists_images_when_present() {
        let spec = confirmation(&post(), 3, ApprovalCounts::default());
        assert_eq!(spec.fields[0].1, "3");
        assert_eq!(spec.fields.len(), 3);
    }

    #[test]
    fn notification_colours_by_kind() {
        let ok = notification(&Notification::Published {
            post: post(),
            external_id: "185".into(),
        });
        assert_eq!(ok.color, COLOR_SUCCESS);
        assert!(ok.description.contains("185"));
        assert!(ok.timestamped);

        let failed = notification(&Notification::Failed {
            post: post(),
            reason: "API error (503)".into(),
        });
        assert_eq!(failed.color, COLOR_FAILURE);
        assert!(failed.description.contains("503"));

        let err = notification(&Notification::SchedulerError {
            message: "database is locked".into(),
        });
        assert_eq!(err.color, COLOR_ERROR);
        assert!(err.description.contains("database is locked"));
    }

    #[test]
    fn long_content_is_truncated() {
        let mut p = post();
        p.content = "x".repeat(5000);
        let spec = confirmation(&p, 0, ApprovalCounts::default());
        assert!(spec.description.chars().count() <= MAX_DESCRIPTION + 1);
        assert!(spec.description.ends_with('\u{2026}'));
    }

    #[test]
    fn help_includes_time_formats() {
        let spec = help();
        assert!(spec.fields.iter().any(|(_, v, _)| v.contains("分後")));
    }
}
