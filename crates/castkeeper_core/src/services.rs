mod bot;
mod lifecycle;
mod listener;
mod reconnect;

use async_trait::async_trait;

use crate::entities::ServiceName;
use crate::error::Error;

pub use bot::BotService;
pub use listener::ListenerService;
pub use reconnect::ReconnectPolicy;

/// Start/stop surface of one long-lived service, as driven by the orchestrator.
#[async_trait]
pub trait ServiceFacade: Send + Sync {
    fn name(&self) -> ServiceName;

    /// Fails when the service is already running or starting.
    async fn start(&self) -> Result<(), Error>;

    /// Fails when the service isn't running.
    async fn stop(&self) -> Result<(), Error>;

    /// Record that a start was refused for lack of a credential.
    fn report_missing_credential(&self);
}
