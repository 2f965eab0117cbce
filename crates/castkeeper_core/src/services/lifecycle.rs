use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::entities::{Intent, RunStatus, ServiceName, ServiceStatus};
use crate::error::Error;
use crate::orchestrator::IntentSender;
use crate::services::ReconnectPolicy;
use crate::status::StatusRegistry;

/// Start/stop guards and status bookkeeping shared by both façades.
pub(crate) struct Lifecycle {
    service: ServiceName,
    registry: Arc<StatusRegistry>,
    intents: IntentSender,
    reconnect: Option<ReconnectPolicy>,
    in_flight: AtomicBool,
    stop_requested: AtomicBool,
    attempts: AtomicU32,
}

/// Clears the in-flight flag when the start sequence ends, however it ends.
pub(crate) struct StartGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl Lifecycle {
    pub(crate) fn new(
        service: ServiceName,
        registry: Arc<StatusRegistry>,
        intents: IntentSender,
        reconnect: Option<ReconnectPolicy>,
    ) -> Self {
        Self {
            service,
            registry,
            intents,
            reconnect,
            in_flight: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            attempts: AtomicU32::new(0),
        }
    }

    pub(crate) fn service(&self) -> ServiceName {
        self.service
    }

    pub(crate) fn is_running(&self) -> bool {
        self.registry.status_of(self.service).is_running()
    }

    pub(crate) fn begin_start(&self) -> Result<StartGuard<'_>, Error> {
        if self.is_running() {
            warn!(service = %self.service, "already running and can't be initialized twice");
            return Err(Error::AlreadyRunning(self.service));
        }
        if self.in_flight.swap(true, Ordering::SeqCst) {
            warn!(service = %self.service, "start already in progress");
            return Err(Error::StartInFlight(self.service));
        }
        self.stop_requested.store(false, Ordering::SeqCst);
        Ok(StartGuard {
            flag: &self.in_flight,
        })
    }

    pub(crate) fn begin_stop(&self) -> Result<(), Error> {
        if !self.is_running() {
            warn!(service = %self.service, "isn't running and therefore can't be stopped");
            return Err(Error::NotRunning(self.service));
        }
        self.stop_requested.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub(crate) fn missing_credential(&self) {
        let reason = format!(
            "Didn't start {} because no access token was provided",
            self.service
        );
        self.registry.update(
            self.service,
            ServiceStatus::new(RunStatus::StoppedNoCredential, reason),
        );
    }

    pub(crate) fn connected(&self) {
        self.attempts.store(0, Ordering::SeqCst);
        self.registry.update(
            self.service,
            ServiceStatus::new(RunStatus::Running, "Connected successfully"),
        );
    }

    pub(crate) fn authentication_failed(&self, reason: String) {
        self.registry.update(
            self.service,
            ServiceStatus::new(RunStatus::StoppedInvalidCredential, reason),
        );
    }

    /// Record the disconnect and, unless it was asked for, route a reconnect
    /// back through the orchestrator.
    pub(crate) fn disconnected(&self, reason: String, manually: bool) {
        self.registry
            .update(self.service, ServiceStatus::new(RunStatus::Stopped, reason));

        let requested = self.stop_requested.swap(false, Ordering::SeqCst);
        if requested || manually {
            return;
        }
        let Some(policy) = self.reconnect else {
            return;
        };

        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let Some(delay) = policy.delay_for(attempt) else {
            error!(
                service = %self.service,
                attempts = policy.max_attempts,
                "giving up on reconnecting"
            );
            return;
        };

        info!(service = %self.service, attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
        let intents = self.intents.clone();
        let service = self.service;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = intents.emit(Intent::Start(service)) {
                warn!(service = %service, error = %e, "couldn't emit reconnect intent");
            }
        });
    }
}
