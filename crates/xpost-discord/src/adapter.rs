use std::sync::Arc;
use std::time::Duration;

use serenity::model::gateway::GatewayIntents;
use serenity::Client;
use tracing::{error, info, warn};

use xpost_core::config::DiscordConfig;

use crate::context::BotState;
use crate::error::DiscordError;
use crate::handler::DiscordHandler;

/// Discord UI adapter.
///
/// Wraps a serenity `Client` and drives the event loop, reconnecting whenever
/// the gateway drops.
pub struct DiscordAdapter {
    app: Arc<BotState>,
    config: DiscordConfig,
}

impl DiscordAdapter {
    pub fn new(config: &DiscordConfig, app: Arc<BotState>) -> Result<Self, DiscordError> {
        if config.bot_token.trim().is_empty() {
            return Err(DiscordError::NoToken);
        }
        Ok(Self {
            app,
            config: config.clone(),
        })
    }

    /// Connect to Discord and keep reconnecting whenever the gateway drops.
    ///
    /// Never returns; stop it by dropping or aborting the task.
    pub async fn run(self) {
        // Slash commands and buttons arrive as interactions; no message intents needed.
        let intents = GatewayIntents::GUILDS;

        loop {
            let mut client = match self.build_client(intents).await {
                Ok(c) => c,
                Err(e) => {
                    error!("Discord: connect failed ({e}), retrying in 30s");
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    continue;
                }
            };

            info!("Discord: gateway connecting");
            if let Err(e) = client.start().await {
                warn!("Discord: gateway error ({e}), reconnecting in 5s");
            } else {
                info!("Discord: gateway stopped cleanly, reconnecting in 5s");
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    }

    async fn build_client(&self, intents: GatewayIntents) -> Result<Client, serenity::Error> {
        let handler = DiscordHandler {
            app: Arc::clone(&self.app),
            config: self.config.clone(),
        };

        Client::builder(&self.config.bot_token, intents)
            .event_handler(handler)
            .await
    }
}
