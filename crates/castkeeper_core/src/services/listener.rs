use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::{mpsc, OnceCell};
use tracing::{error, info, instrument, warn};

use crate::auth_provider::AuthProviderAdapter;
use crate::config::Settings;
use crate::entities::{GoLiveNotice, ServiceName};
use crate::error::Error;
use crate::orchestrator::IntentSender;
use crate::ports::{
    EventSubClient, EventSubClientFactory, Notifier, PlatformEvent, SubscriptionKind,
};
use crate::services::lifecycle::Lifecycle;
use crate::services::{ReconnectPolicy, ServiceFacade};
use crate::status::StatusRegistry;

const SUBSCRIPTIONS: [SubscriptionKind; 3] = [
    SubscriptionKind::ChannelFollow,
    SubscriptionKind::StreamOnline,
    SubscriptionKind::StreamOffline,
];

/// Live-event listener façade: owns the single subscription client and
/// mirrors its socket callbacks into the status registry.
pub struct ListenerService {
    me: Weak<ListenerService>,
    lifecycle: Lifecycle,
    auth: Arc<AuthProviderAdapter>,
    factory: Arc<dyn EventSubClientFactory>,
    notifier: Option<Arc<dyn Notifier>>,
    client: OnceCell<Arc<dyn EventSubClient>>,
    channel: String,
}

impl ListenerService {
    pub fn new(
        settings: &Settings,
        auth: Arc<AuthProviderAdapter>,
        factory: Arc<dyn EventSubClientFactory>,
        notifier: Option<Arc<dyn Notifier>>,
        registry: Arc<StatusRegistry>,
        intents: IntentSender,
    ) -> Arc<Self> {
        let reconnect = settings
            .listener
            .reconnect
            .then(|| ReconnectPolicy::from_settings(&settings.reconnect));

        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            lifecycle: Lifecycle::new(ServiceName::Listener, registry, intents, reconnect),
            auth,
            factory,
            notifier,
            client: OnceCell::new(),
            channel: settings.platform.channel.clone(),
        })
    }

    /// The subscription client, created on first use with stale
    /// subscriptions cleared and the typed subscriptions registered once.
    pub async fn get_instance(&self) -> Result<Arc<dyn EventSubClient>, Error> {
        self.client
            .get_or_try_init(|| async {
                let (events_tx, events_rx) = mpsc::unbounded_channel();
                let client = self
                    .factory
                    .create(self.auth.get_instance(), events_tx)
                    .await?;

                client.delete_all_subscriptions().await?;
                let broadcaster_id = self.auth.user_id();
                for kind in SUBSCRIPTIONS {
                    client.subscribe(kind, broadcaster_id).await?;
                }

                self.spawn_event_pump(events_rx);
                info!(broadcaster_id = %broadcaster_id, "event listener created");
                Ok::<_, Error>(client)
            })
            .await
            .cloned()
    }

    fn spawn_event_pump(&self, mut events: mpsc::UnboundedReceiver<PlatformEvent>) {
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

    pub(crate) fn handle_event(&self, event: PlatformEvent) {
        match event {
            PlatformEvent::UserSocketConnect { user_id } => {
                info!(user_id = %user_id, "event listener connected");
                self.lifecycle.connected();
            }
            PlatformEvent::UserSocketDisconnect { user_id, error } => {
                let reason = error.unwrap_or_else(|| "Disconnected".to_string());
                info!(user_id = %user_id, reason = %reason, "event listener disconnected");
                self.lifecycle.disconnected(reason, false);
            }
            PlatformEvent::ChannelFollow { user_name } => {
                info!("{} now follows {}", user_name, self.channel);
            }
            PlatformEvent::StreamOnline {
                broadcaster_name,
                stream,
            } => {
                info!("{} is now live", broadcaster_name);
                self.announce_live(broadcaster_name, stream);
            }
            PlatformEvent::StreamOffline { broadcaster_name } => {
                info!("{} is now offline", broadcaster_name);
            }
        }
    }

    fn announce_live(&self, broadcaster_name: String, stream: Option<crate::ports::StreamInfo>) {
        let Some(notifier) = self.notifier.clone() else {
            warn!(
                broadcaster = %broadcaster_name,
                "stream went live, but no notifier is configured"
            );
            return;
        };
        let Some(stream) = stream else {
            return;
        };

        let notice = GoLiveNotice {
            broadcaster_name,
            title: stream.title,
            thumbnail_url: stream.thumbnail_url,
        };
        tokio::spawn(async move {
            if let Err(e) = notifier.notify_live(&notice).await {
                error!(error = %e, "go-live notification failed");
            }
        });
    }
}

#[async_trait]
impl ServiceFacade for ListenerService {
    fn name(&self) -> ServiceName {
        self.lifecycle.service()
    }

    #[instrument(skip(self), fields(service = "listener"))]
    async fn start(&self) -> Result<(), Error> {
        let _guard = self.lifecycle.begin_start()?;
        let client = self.get_instance().await?;
        client.start().await
    }

    #[instrument(skip(self), fields(service = "listener"))]
    async fn stop(&self) -> Result<(), Error> {
        self.lifecycle.begin_stop()?;
        let client = self
            .client
            .get()
            .cloned()
            .ok_or(Error::NotRunning(ServiceName::Listener))?;
        client.stop().await
    }

    fn report_missing_credential(&self) {
        self.lifecycle.missing_credential();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Credential, Intent, RunStatus};
    use crate::orchestrator::{intent_channel, IntentReceiver};
    use crate::ports::StreamInfo;
    use crate::testing::{
        valid_token, wait_for_status, FakeEventSubFactory, FakeOauthClient,
        MemoryCredentialStore, RecordingNotifier,
    };
    use std::time::Duration;

    struct Harness {
        listener: Arc<ListenerService>,
        factory: Arc<FakeEventSubFactory>,
        notifier: Arc<RecordingNotifier>,
        registry: Arc<StatusRegistry>,
        intents: IntentReceiver,
    }

    fn harness(reconnect: bool) -> Harness {
        let mut settings = Settings::default();
        settings.platform.channel = "castkeeper".to_string();
        settings.platform.channel_id = "4242".to_string();
        settings.listener.reconnect = reconnect;
        settings.reconnect.base_delay_ms = 1;
        settings.reconnect.max_delay_ms = 5;

        let store = Arc::new(MemoryCredentialStore::with(Credential::Structured(
            valid_token("abc"),
        )));
        let auth = Arc::new(AuthProviderAdapter::new(
            store,
            Arc::new(FakeOauthClient::new()),
            &settings.platform,
        ));
        let factory = Arc::new(FakeEventSubFactory::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let registry = Arc::new(StatusRegistry::new());
        let (sender, receiver) = intent_channel();

        let listener = ListenerService::new(
            &settings,
            auth,
            factory.clone(),
            Some(notifier.clone()),
            registry.clone(),
            sender,
        );
        Harness {
            listener,
            factory,
            notifier,
            registry,
            intents: receiver,
        }
    }

    #[tokio::test]
    async fn test_instance_registers_subscriptions_once() {
        let h = harness(false);
        h.listener.get_instance().await.unwrap();
        h.listener.get_instance().await.unwrap();

        assert_eq!(h.factory.created(), 1);
        assert_eq!(h.factory.cleared(), 1);
        assert_eq!(
            h.factory.subscriptions(),
            vec![
                (SubscriptionKind::ChannelFollow, "4242".to_string()),
                (SubscriptionKind::StreamOnline, "4242".to_string()),
                (SubscriptionKind::StreamOffline, "4242".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_start_and_stop_cycle() {
        let h = harness(false);
        h.listener.start().await.unwrap();
        assert!(wait_for_status(&h.registry, ServiceName::Listener, RunStatus::Running).await);

        assert!(matches!(
            h.listener.start().await,
            Err(Error::AlreadyRunning(ServiceName::Listener))
        ));

        h.listener.stop().await.unwrap();
        assert!(wait_for_status(&h.registry, ServiceName::Listener, RunStatus::Stopped).await);
        assert_eq!(
            h.registry.status_of(ServiceName::Listener).reason.as_deref(),
            Some("Disconnected")
        );
        assert!(matches!(
            h.listener.stop().await,
            Err(Error::NotRunning(ServiceName::Listener))
        ));
    }

    #[tokio::test]
    async fn test_socket_drop_requests_restart_through_orchestrator() {
        let mut h = harness(true);
        h.listener.start().await.unwrap();
        assert!(wait_for_status(&h.registry, ServiceName::Listener, RunStatus::Running).await);

        h.factory.emit(PlatformEvent::UserSocketDisconnect {
            user_id: "4242".to_string(),
            error: Some("keepalive timeout".to_string()),
        });

        let intent = tokio::time::timeout(Duration::from_secs(1), h.intents.recv())
            .await
            .unwrap();
        assert_eq!(intent, Some(Intent::Start(ServiceName::Listener)));
        assert_eq!(
            h.registry.status_of(ServiceName::Listener).reason.as_deref(),
            Some("keepalive timeout")
        );
    }

    #[tokio::test]
    async fn test_stream_online_sends_notice() {
        let h = harness(false);
        h.listener.handle_event(PlatformEvent::StreamOnline {
            broadcaster_name: "Castkeeper".to_string(),
            stream: Some(StreamInfo {
                title: "Friday build".to_string(),
                thumbnail_url: Some("https://cdn.example/thumb.jpg".to_string()),
            }),
        });

        for _ in 0..100 {
            if !h.notifier.notices().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let notices = h.notifier.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].title, "Friday build");
        assert_eq!(notices[0].broadcaster_name, "Castkeeper");
    }

    #[tokio::test]
    async fn test_stream_online_without_stream_info_is_skipped() {
        let h = harness(false);
        h.listener.handle_event(PlatformEvent::StreamOnline {
            broadcaster_name: "Castkeeper".to_string(),
            stream: None,
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(h.notifier.notices().is_empty());
    }
}
