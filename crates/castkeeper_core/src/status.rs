use std::sync::RwLock;

use tracing::debug;

use crate::entities::{ServiceName, ServiceStatus, StatusSnapshot};

/// Run state of every service, keyed by service name.
///
/// Only the service façades write to it; everyone else reads snapshots.
#[derive(Debug, Default)]
pub struct StatusRegistry {
    inner: RwLock<StatusSnapshot>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the full mapping. Never mutates.
    pub fn get(&self) -> StatusSnapshot {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn status_of(&self, service: ServiceName) -> ServiceStatus {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(service)
            .clone()
    }

    /// Replace one entry as a single assignment.
    pub(crate) fn update(&self, service: ServiceName, status: ServiceStatus) {
        debug!(service = %service, status = ?status.status, reason = ?status.reason, "status updated");
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .set(service, status);
    }
}
