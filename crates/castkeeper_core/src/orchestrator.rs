use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::auth_provider::AuthProviderAdapter;
use crate::entities::{Intent, ServiceName};
use crate::error::Error;
use crate::ports::CredentialStore;
use crate::services::ServiceFacade;
use crate::status::StatusRegistry;

/// Sending half of the intent bus. Emitting never waits for the handler.
#[derive(Debug, Clone)]
pub struct IntentSender {
    tx: mpsc::UnboundedSender<Intent>,
}

impl IntentSender {
    pub fn emit(&self, intent: Intent) -> Result<(), Error> {
        debug!(intent = %intent, "intent emitted");
        self.tx.send(intent).map_err(|_| Error::ChannelClosed)
    }
}

#[derive(Debug)]
pub struct IntentReceiver {
    rx: mpsc::UnboundedReceiver<Intent>,
}

impl IntentReceiver {
    pub async fn recv(&mut self) -> Option<Intent> {
        self.rx.recv().await
    }
}

pub fn intent_channel() -> (IntentSender, IntentReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (IntentSender { tx }, IntentReceiver { rx })
}

/// Drives both services from intents, checking the credential and the
/// registry before asking a façade to act.
pub struct Orchestrator {
    store: Arc<dyn CredentialStore>,
    registry: Arc<StatusRegistry>,
    auth: Arc<AuthProviderAdapter>,
    bot: Arc<dyn ServiceFacade>,
    listener: Arc<dyn ServiceFacade>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        registry: Arc<StatusRegistry>,
        auth: Arc<AuthProviderAdapter>,
        bot: Arc<dyn ServiceFacade>,
        listener: Arc<dyn ServiceFacade>,
    ) -> Self {
        Self {
            store,
            registry,
            auth,
            bot,
            listener,
        }
    }

    /// Consume intents until every sender is gone. Each intent is handled on
    /// its own task so a slow start never holds up the other service.
    pub fn spawn(self: Arc<Self>, mut intents: IntentReceiver) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(intent) = intents.recv().await {
                let orchestrator = self.clone();
                tokio::spawn(async move { orchestrator.dispatch(intent).await });
            }
            debug!("intent bus closed");
        })
    }

    /// Handle one intent, logging instead of propagating failures.
    pub async fn dispatch(&self, intent: Intent) {
        if let Err(e) = self.handle(intent).await {
            error!(intent = %intent, error = %e, "intent handler failed");
        }
    }

    async fn handle(&self, intent: Intent) -> Result<(), Error> {
        match intent {
            Intent::Start(service) => self.start(service).await,
            Intent::Stop(service) => self.facade(service).stop().await,
        }
    }

    async fn start(&self, service: ServiceName) -> Result<(), Error> {
        if self.registry.status_of(service).is_running() {
            info!(service = %service, "already running, skipping start");
            return Ok(());
        }

        let facade = self.facade(service);
        if self.store.get_credential().is_none() {
            facade.report_missing_credential();
            warn!(service = %service, "no access token provided, not starting");
            return Ok(());
        }

        self.auth.ensure_user().await?;
        facade.start().await
    }

    fn facade(&self, service: ServiceName) -> &Arc<dyn ServiceFacade> {
        match service {
            ServiceName::Bot => &self.bot,
            ServiceName::Listener => &self.listener,
        }
    }
}
