//! Operations-channel delivery of publish notifications.

use std::sync::Arc;

use async_trait::async_trait;
use serenity::builder::CreateMessage;
use serenity::http::Http;
use serenity::model::id::ChannelId;
use tracing::debug;

use xpost_core::{DeliveryError, Notification, NotificationSink};

use crate::embed;

/// Posts each [`Notification`] as a colour-coded embed to one channel.
///
/// Uses the REST client only, so it works before and across gateway
/// reconnects.
pub struct DiscordSink {
    http: Arc<Http>,
    channel_id: ChannelId,
}

impl DiscordSink {
    pub fn new(token: &str, channel_id: u64) -> Self {
        Self::with_http(Arc::new(Http::new(token)), channel_id)
    }

    pub fn with_http(http: Arc<Http>, channel_id: u64) -> Self {
        Self {
            http,
            channel_id: ChannelId::new(channel_id),
        }
    }
}

#[async_trait]
impl NotificationSink for DiscordSink {
    fn name(&self) -> &str {
        "discord"
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let embed = embed::notification(notification).to_create_embed();
        self.channel_id
            .send_message(&self.http, CreateMessage::new().embed(embed))
            .await
            .map_err(|e| DeliveryError(e.to_string()))?;
        debug!(channel_id = %self.channel_id, kind = notification.kind(), "notification posted");
        Ok(())
    }
}
