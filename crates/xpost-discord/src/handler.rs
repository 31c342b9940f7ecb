use std::sync::Arc;

use serenity::all::ActivityData;
use serenity::async_trait;
use serenity::model::application::Interaction;
use serenity::model::gateway::Ready;
use serenity::model::id::GuildId;
use serenity::model::user::OnlineStatus;
use serenity::prelude::{Context, EventHandler};
use tracing::info;

use xpost_core::config::DiscordConfig;

use crate::context::BotState;

/// Serenity event handler for the scheduling UI.
pub struct DiscordHandler {
    pub app: Arc<BotState>,
    pub config: DiscordConfig,
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        ctx.set_presence(
            Some(ActivityData::watching("scheduled posts")),
            OnlineStatus::Online,
        );
        info!(name = %ready.user.name, guilds = ready.guilds.len(), "Discord bot connected");

        crate::commands::register_commands(&ctx, self.config.guild_id.filter(|id| *id != 0).map(GuildId::new)).await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => {
                crate::commands::handle_interaction(&self.app, &ctx, &command).await;
            }
            Interaction::Component(component) => {
                crate::approval::handle_component(&self.app, &ctx, &component).await;
            }
            _ => {}
        }
    }
}
