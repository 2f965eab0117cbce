use async_trait::async_trait;
use castkeeper_core::config::ListenerSettings;
use castkeeper_core::entities::GoLiveNotice;
use castkeeper_core::ports::Notifier;
use castkeeper_core::Error;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::network::build_webhook_client;

const EMBED_COLOR: u32 = 16711680;
const THUMBNAIL_SIZE: (u32, u32) = (800, 450);

#[derive(Debug, Serialize, PartialEq)]
struct WebhookPayload {
    content: String,
    embeds: Vec<Embed>,
    username: String,
}

#[derive(Debug, Serialize, PartialEq)]
struct Embed {
    title: String,
    url: String,
    color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<EmbedImage>,
}

#[derive(Debug, Serialize, PartialEq)]
struct EmbedImage {
    url: String,
}

/// Posts go-live notices to a Discord webhook.
pub struct DiscordWebhookNotifier {
    client: Client,
    webhook_url: Option<String>,
    role: Option<String>,
    stream_url: Option<String>,
}

impl DiscordWebhookNotifier {
    pub fn new(settings: &ListenerSettings) -> Result<Self, Error> {
        Ok(Self {
            client: build_webhook_client()?,
            webhook_url: settings.discord_webhook_url.clone(),
            role: settings.notify_role.clone(),
            stream_url: settings.stream_url.clone(),
        })
    }

    fn build_payload(&self, notice: &GoLiveNotice) -> WebhookPayload {
        let content = match &self.role {
            Some(role) => format!(
                "Hey <@&{}>, {} is live now! Come and watch...",
                role, notice.broadcaster_name
            ),
            None => format!("{} is live now! Come and watch...", notice.broadcaster_name),
        };
        let url = self.stream_url.clone().unwrap_or_else(|| {
            format!(
                "https://twitch.tv/{}",
                notice.broadcaster_name.to_lowercase()
            )
        });
        let image = notice.thumbnail_url.as_ref().map(|template| EmbedImage {
            url: template
                .replace("{width}", &THUMBNAIL_SIZE.0.to_string())
                .replace("{height}", &THUMBNAIL_SIZE.1.to_string()),
        });

        WebhookPayload {
            content,
            embeds: vec![Embed {
                title: notice.title.clone(),
                url,
                color: EMBED_COLOR,
                image,
            }],
            username: format!("Twitch - {}", notice.broadcaster_name),
        }
    }
}

#[async_trait]
impl Notifier for DiscordWebhookNotifier {
    #[instrument(skip(self, notice), fields(broadcaster = %notice.broadcaster_name))]
    async fn notify_live(&self, notice: &GoLiveNotice) -> Result<(), Error> {
        let Some(webhook_url) = &self.webhook_url else {
            warn!("stream is live, but no notification is sent because no webhook url is configured");
            return Ok(());
        };

        let response = self
            .client
            .post(webhook_url)
            .json(&self.build_payload(notice))
            .send()
            .await
            .map_err(|e| Error::Notification(format!("webhook request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Notification(format!(
                "webhook answered with status {}",
                status.as_u16()
            )));
        }

        info!(status = status.as_u16(), "sent go-live notification");
        Ok(())
    }
}
