//! Discord slash commands: `/post` and `/help`.
//!
//! Registration happens in `ready()`. Interactions are dispatched from
//! `interaction_create` in the event handler.

use std::sync::Arc;

use chrono::{DateTime, Local, TimeZone, Utc};
use serenity::builder::{
    CreateCommand, CreateCommandOption, CreateInteractionResponse,
    CreateInteractionResponseMessage, EditInteractionResponse,
};
use serenity::model::application::{CommandInteraction, CommandOptionType, ResolvedValue};
use serenity::model::channel::Attachment;
use serenity::model::id::GuildId;
use serenity::prelude::Context;
use tracing::{info, warn};

use xpost_core::date_parse::resolve_schedule_time;
use xpost_core::{ApprovalCounts, ExternalRefs, NewPost, ScheduledPost, ValidationError};
use xpost_store::{cleanup_images, StoreError};

use crate::approval;
use crate::attach::{check_attachments, describe, save_attachments};
use crate::context::BotState;
use crate::embed;
use crate::error::DiscordError;

/// Attachment option names on `/post`.
const IMAGE_OPTIONS: [&str; 4] = ["image1", "image2", "image3", "image4"];

/// Register slash commands per guild when `guild_id` is set, globally otherwise.
pub async fn register_commands(ctx: &Context, guild_id: Option<GuildId>) {
    let mut post = CreateCommand::new("post")
        .description("Schedule a post to X (Twitter)")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "content", "Post text")
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "time",
                "When to post, e.g. 14:30, 30分後, +2h, 2025-01-20 15:30",
            )
            .required(true),
        );
    for (i, name) in IMAGE_OPTIONS.iter().enumerate() {
        post = post.add_option(
            CreateCommandOption::new(
                CommandOptionType::Attachment,
                *name,
                format!("Image {}", i + 1),
            )
            .required(false),
        );
    }

    let commands = vec![
        post,
        CreateCommand::new("help").description("How to use the bot and supported time formats"),
    ];

    match guild_id {
        Some(gid) => match gid.set_commands(&ctx.http, commands).await {
            Ok(cmds) => info!(guild = %gid, count = cmds.len(), "registered guild slash commands"),
            Err(e) => warn!(guild = %gid, error = %e, "failed to register guild commands"),
        },
        None => {
            match serenity::model::application::Command::set_global_commands(&ctx.http, commands)
                .await
            {
                Ok(cmds) => info!(count = cmds.len(), "registered global slash commands"),
                Err(e) => warn!(error = %e, "failed to register global slash commands"),
            }
        }
    }
}

/// Dispatch a slash command interaction to the appropriate handler.
pub async fn handle_interaction(app: &Arc<BotState>, ctx: &Context, command: &CommandInteraction) {
    let result = match command.data.name.as_str() {
        "post" => handle_post(app, ctx, command).await,
        "help" => handle_help(ctx, command).await,
        _ => {
            respond_ephemeral(ctx, command, "Unknown command.").await;
            Ok(())
        }
    };

    if let Err(e) = result {
        warn!(command = %command.data.name, error = %e, "slash command error");
    }
}

/// Check the text fields of a `/post` request and resolve the schedule time
/// relative to `now`.
pub fn validate_request<Tz: TimeZone>(
    content: &str,
    time: &str,
    now: &DateTime<Tz>,
) -> Result<(String, DateTime<Utc>), ValidationError>
where
    Tz::Offset: std::fmt::Display,
{
    let content = content.trim();
    if content.is_empty() {
        return Err(ValidationError::EmptyContent);
    }
    let at = resolve_schedule_time(time, now)?;
    Ok((content.to_string(), at))
}

/// `/post content time [image1..image4]`
async fn handle_post(
    app: &Arc<BotState>,
    ctx: &Context,
    command: &CommandInteraction,
) -> Result<(), DiscordError> {
    let mut content = "";
    let mut time = "";
    let mut attachments: Vec<&Attachment> = Vec::new();
    for opt in command.data.options() {
        match opt.value {
            ResolvedValue::String(s) if opt.name == "content" => content = s,
            ResolvedValue::String(s) if opt.name == "time" => time = s,
            ResolvedValue::Attachment(a) if IMAGE_OPTIONS.contains(&opt.name) => {
                attachments.push(a)
            }
            _ => {}
        }
    }

    // Defer the response: downloads can exceed the 3 s interaction deadline.
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let (post, image_count) = match schedule(app, command, content, time, &attachments).await {
        Ok(v) => v,
        Err(e) => {
            warn!(user = %command.user.id, code = e.code(), error = %e, "post rejected");
            command
                .edit_response(&ctx.http, EditInteractionResponse::new().content(e.user_message()))
                .await?;
            return Ok(());
        }
    };

    let embed = embed::confirmation(&post, image_count, ApprovalCounts::default());
    let message = command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new()
                .embed(embed.to_create_embed())
                .components(vec![approval::buttons()]),
        )
        .await?;
    app.store.set_message_ref(post.id, &message.id.to_string())?;

    info!(
        post_id = post.id,
        message_id = %message.id,
        images = image_count,
        user = %command.user.id,
        "post scheduled via /post"
    );
    Ok(())
}

async fn schedule(
    app: &Arc<BotState>,
    command: &CommandInteraction,
    content: &str,
    time: &str,
    attachments: &[&Attachment],
) -> Result<(ScheduledPost, usize), DiscordError> {
    let (content, scheduled_time) = validate_request(content, time, &Local::now())?;
    check_attachments(&app.images, &describe(attachments), app.max_attachments)?;
    let saved = save_attachments(&app.images, attachments).await?;

    let new_post = NewPost {
        content,
        scheduled_time,
        refs: ExternalRefs {
            discord_message_id: None,
            guild_id: command.guild_id.map(|g| g.to_string()),
            channel_id: Some(command.channel_id.to_string()),
        },
        has_images: !saved.is_empty(),
    };
    let id = match app.store.create_post_with_images(&new_post, &saved) {
        Ok(id) => id,
        Err(e) => {
            let paths: Vec<String> = saved.into_iter().map(|s| s.file_path).collect();
            cleanup_images(&paths).await;
            return Err(e.into());
        }
    };
    let post = app
        .store
        .get_post(id)?
        .ok_or(StoreError::PostNotFound { id })?;
    Ok((post, saved.len()))
}

/// `/help`: usage, time formats and examples (ephemeral).
async fn handle_help(ctx: &Context, command: &CommandInteraction) -> Result<(), DiscordError> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed::help().to_create_embed())
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

/// Send an ephemeral response to a slash command (only visible to the invoker).
async fn respond_ephemeral(ctx: &Context, command: &CommandInteraction, content: &str) {
    let _ = command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await;
}
