use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, OnceCell};
use tracing::{error, info, instrument, warn};

use crate::auth_provider::AuthProviderAdapter;
use crate::config::Settings;
use crate::entities::ServiceName;
use crate::error::Error;
use crate::orchestrator::IntentSender;
use crate::ports::{ChatClient, ChatClientFactory, ChatEvent};
use crate::services::lifecycle::Lifecycle;
use crate::services::{ReconnectPolicy, ServiceFacade};
use crate::status::StatusRegistry;

/// Credentials expiring sooner than this are called out when the bot starts.
const EXPIRY_WARNING_WINDOW: Duration = Duration::from_secs(12 * 60 * 60);

/// Chat bot façade: owns the single chat client and mirrors its callbacks
/// into the status registry.
pub struct BotService {
    me: Weak<BotService>,
    lifecycle: Lifecycle,
    auth: Arc<AuthProviderAdapter>,
    factory: Arc<dyn ChatClientFactory>,
    client: OnceCell<Arc<dyn ChatClient>>,
    channel: String,
    prefix: String,
}

impl BotService {
    pub fn new(
        settings: &Settings,
        auth: Arc<AuthProviderAdapter>,
        factory: Arc<dyn ChatClientFactory>,
        registry: Arc<StatusRegistry>,
        intents: IntentSender,
    ) -> Arc<Self> {
        let reconnect = settings
            .bot
            .reconnect
            .then(|| ReconnectPolicy::from_settings(&settings.reconnect));

        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            lifecycle: Lifecycle::new(ServiceName::Bot, registry, intents, reconnect),
            auth,
            factory,
            client: OnceCell::new(),
            channel: settings.platform.channel.clone(),
            prefix: settings.bot.prefix.clone(),
        })
    }

    /// The chat client, created on first use and kept for the process lifetime.
    pub async fn get_instance(&self) -> Result<Arc<dyn ChatClient>, Error> {
        self.client
            .get_or_try_init(|| async {
                let (events_tx, events_rx) = mpsc::unbounded_channel();
                let client = self
                    .factory
                    .create(self.auth.get_instance(), vec![self.channel.clone()], events_tx)
                    .await?;
                self.spawn_event_pump(events_rx);
                info!(channel = %self.channel, "chat client created");
                Ok::<_, Error>(client)
            })
            .await
            .cloned()
    }

    /// Post a message to the configured channel.
    pub async fn say(&self, text: &str) -> Result<(), Error> {
        if !self.lifecycle.is_running() {
            return Err(Error::NotRunning(ServiceName::Bot));
        }
        self.get_instance().await?.say(&self.channel, text).await
    }

    fn spawn_event_pump(&self, mut events: mpsc::UnboundedReceiver<ChatEvent>) {
        let me = self.me.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(service) = me.upgrade() else {
                    break;
                };
                service.handle_event(event);
            }
        });
    }

    pub(crate) fn handle_event(&self, event: ChatEvent) {
        match event {
            ChatEvent::Connected => info!("chatbot connected to chat"),
            ChatEvent::AuthenticationSuccess => {
                info!("chatbot authenticated successfully");
                self.lifecycle.connected();
            }
            ChatEvent::AuthenticationFailure { text, retry_count } => {
                error!(attempt = retry_count, reason = %text, "chatbot authentication failed");
                self.lifecycle.authentication_failed(text);
            }
            ChatEvent::Disconnected { manually, reason } => {
                let reason = reason.unwrap_or_else(|| "UNKNOWN".to_string());
                info!(manually, reason = %reason, "chatbot disconnected from chat");
                self.lifecycle.disconnected(reason, manually);
            }
            ChatEvent::Message(message) => {
                // Commands are answered by the command handlers, not logged here
                if message.text.starts_with(&self.prefix) {
                    return;
                }
                info!("{}::{}", message.user_name, message.text);
            }
        }
    }

    async fn warn_if_expiring(&self) {
        let Some(credential) = self.auth.get_instance().current_credential().await else {
            return;
        };
        if credential.expires_within(EXPIRY_WARNING_WINDOW) {
            warn!(
                expires_at_ms = credential.expires_at(),
                "access token expires within 12 hours"
            );
        }
    }
}

#[async_trait]
impl ServiceFacade for BotService {
    fn name(&self) -> ServiceName {
        self.lifecycle.service()
    }

    #[instrument(skip(self), fields(service = "bot"))]
    async fn start(&self) -> Result<(), Error> {
        let _guard = self.lifecycle.begin_start()?;
        self.warn_if_expiring().await;
        let client = self.get_instance().await?;
        client.connect().await
    }

    #[instrument(skip(self), fields(service = "bot"))]
    async fn stop(&self) -> Result<(), Error> {
        self.lifecycle.begin_stop()?;
        let client = self
            .client
            .get()
            .cloned()
            .ok_or(Error::NotRunning(ServiceName::Bot))?;
        client.disconnect().await
    }

    fn report_missing_credential(&self) {
        self.lifecycle.missing_credential();
    }
}
