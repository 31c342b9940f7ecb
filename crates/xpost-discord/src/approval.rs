//! 👍 / 👎 buttons on the confirmation message.
//!
//! The post is looked up by the message the button belongs to, so votes keep
//! working after a bot restart.

use std::sync::Arc;

use serenity::builder::{
    CreateActionRow, CreateButton, CreateInteractionResponse, CreateInteractionResponseFollowup,
    CreateInteractionResponseMessage,
};
use serenity::model::application::{ButtonStyle, ComponentInteraction};
use serenity::prelude::Context;
use tracing::{info, warn};

use xpost_core::ApprovalKind;
use xpost_store::StoreError;

use crate::context::BotState;
use crate::embed;
use crate::error::DiscordError;

pub const GOOD_BUTTON: &str = "approval_good";
pub const BAD_BUTTON: &str = "approval_bad";

pub fn buttons() -> CreateActionRow {
    CreateActionRow::Buttons(vec![
        CreateButton::new(GOOD_BUTTON)
            .emoji('\u{1f44d}')
            .style(ButtonStyle::Success),
        CreateButton::new(BAD_BUTTON)
            .emoji('\u{1f44e}')
            .style(ButtonStyle::Danger),
    ])
}

pub fn kind_for(custom_id: &str) -> Option<ApprovalKind> {
    match custom_id {
        GOOD_BUTTON => Some(ApprovalKind::Good),
        BAD_BUTTON => Some(ApprovalKind::Bad),
        _ => None,
    }
}

pub async fn handle_component(app: &Arc<BotState>, ctx: &Context, component: &ComponentInteraction) {
    if let Err(e) = handle_vote(app, ctx, component).await {
        warn!(custom_id = %component.data.custom_id, code = e.code(), error = %e, "approval button error");
        respond_ephemeral(ctx, component, &vote_failure_text(&e)).await;
    }
}

/// Reply shown to a voter whose vote could not be recorded.
fn vote_failure_text(e: &DiscordError) -> String {
    match e {
        DiscordError::Store(StoreError::PostNotFound { .. }) => "\u{274c} Post not found.".to_string(),
        _ => "\u{274c} Could not record your vote. Please try again.".to_string(),
    }
}

async fn handle_vote(
    app: &Arc<BotState>,
    ctx: &Context,
    component: &ComponentInteraction,
) -> Result<(), DiscordError> {
    let Some(kind) = kind_for(&component.data.custom_id) else {
        return Ok(());
    };

    let message_id = component.message.id.to_string();
    let Some(post) = app.store.get_post_by_message_id(&message_id)? else {
        respond_ephemeral(ctx, component, "\u{274c} Post not found.").await;
        return Ok(());
    };
    if post.is_posted {
        respond_ephemeral(
            ctx,
            component,
            "This post has already been published. Voting is closed.",
        )
        .await;
        return Ok(());
    }

    let user_id = component.user.id.to_string();
    app.store.upsert_approval(post.id, &user_id, kind)?;
    let counts = app.store.get_approval_counts(post.id)?;
    let image_count = app.store.get_images(post.id)?.len();
    info!(post_id = post.id, user = %user_id, %kind, good = counts.good, bad = counts.bad, "vote recorded");

    let embed = embed::confirmation(&post, image_count, counts);
    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::UpdateMessage(
                CreateInteractionResponseMessage::new()
                    .embed(embed.to_create_embed())
                    .components(vec![buttons()]),
            ),
        )
        .await?;

    let ack = match kind {
        ApprovalKind::Good => "\u{1f44d} Good!",
        ApprovalKind::Bad => "\u{1f44e} Bad!",
    };
    component
        .create_followup(
            &ctx.http,
            CreateInteractionResponseFollowup::new()
                .content(ack)
                .ephemeral(true),
        )
        .await?;
    Ok(())
}

async fn respond_ephemeral(ctx: &Context, component: &ComponentInteraction, content: &str) {
    let _ = component
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
