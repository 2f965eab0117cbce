use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::auth_provider::AuthProviderAdapter;
use crate::config::Settings;
use crate::entities::{Intent, ServiceName, StatusSnapshot};
use crate::error::Error;
use crate::orchestrator::{intent_channel, IntentReceiver, IntentSender, Orchestrator};
use crate::ports::{
    ChatClientFactory, CredentialStore, EventSubClientFactory, Notifier, OauthClient,
};
use crate::services::{BotService, ListenerService};
use crate::status::StatusRegistry;

/// External clients an embedding binary plugs into the runtime.
pub struct Collaborators {
    pub chat: Arc<dyn ChatClientFactory>,
    pub events: Arc<dyn EventSubClientFactory>,
    pub notifier: Option<Arc<dyn Notifier>>,
}

/// The process-scoped singletons, built once and shared by reference.
pub struct Runtime {
    store: Arc<dyn CredentialStore>,
    registry: Arc<StatusRegistry>,
    auth: Arc<AuthProviderAdapter>,
    bot: Arc<BotService>,
    listener: Arc<ListenerService>,
    orchestrator: Arc<Orchestrator>,
    intents: IntentSender,
}

impl Runtime {
    pub fn new(
        settings: &Settings,
        store: Arc<dyn CredentialStore>,
        oauth: Arc<dyn OauthClient>,
        collaborators: Collaborators,
    ) -> (Self, IntentReceiver) {
        let registry = Arc::new(StatusRegistry::new());
        let auth = Arc::new(AuthProviderAdapter::new(
            store.clone(),
            oauth,
            &settings.platform,
        ));
        let (intents, receiver) = intent_channel();

        let bot = BotService::new(
            settings,
            auth.clone(),
            collaborators.chat,
            registry.clone(),
            intents.clone(),
        );
        let listener = ListenerService::new(
            settings,
            auth.clone(),
            collaborators.events,
            collaborators.notifier,
            registry.clone(),
            intents.clone(),
        );
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            registry.clone(),
            auth.clone(),
            bot.clone(),
            listener.clone(),
        ));

        let runtime = Self {
            store,
            registry,
            auth,
            bot,
            listener,
            orchestrator,
            intents,
        };
        (runtime, receiver)
    }

    /// Start consuming intents.
    pub fn spawn(&self, receiver: IntentReceiver) -> JoinHandle<()> {
        self.orchestrator.clone().spawn(receiver)
    }

    /// Ask for both services to start, as on process boot.
    pub fn boot(&self) -> Result<(), Error> {
        info!("booting services");
        for service in ServiceName::ALL {
            self.intents.emit(Intent::Start(service))?;
        }
        Ok(())
    }

    pub fn status(&self) -> StatusSnapshot {
        self.registry.get()
    }

    pub fn intents(&self) -> IntentSender {
        self.intents.clone()
    }

    pub fn registry(&self) -> Arc<StatusRegistry> {
        self.registry.clone()
    }

    pub fn store(&self) -> Arc<dyn CredentialStore> {
        self.store.clone()
    }

    pub fn auth(&self) -> Arc<AuthProviderAdapter> {
        self.auth.clone()
    }

    pub fn bot(&self) -> Arc<BotService> {
        self.bot.clone()
    }

    pub fn listener(&self) -> Arc<ListenerService> {
        self.listener.clone()
    }
}
