//! Scoped log handle.
//!
//! Every decision the engine takes is attributed to the blueprint, resource
//! and lease it concerns. A [`ScopeLog`] carries that attribution explicitly
//! and narrows it with [`ScopeLog::with_resource`] / [`ScopeLog::with_lease`].
//! Messages go to `tracing` and, best effort, to the persisted `logs` table.
//!
//! Persisting a message opens its own write transaction, so a `ScopeLog`
//! must not be written to while a [`berth_state::StateTxn`] is open on the
//! same task.

use tracing::{info, warn};

use berth_core::{LeaseId, LogEntry, ResourceId, epoch_secs};
use berth_state::StateStore;

#[derive(Clone)]
pub struct ScopeLog {
    store: Option<StateStore>,
    blueprint_id: Option<String>,
    resource_id: Option<ResourceId>,
    lease_id: Option<LeaseId>,
}

impl ScopeLog {
    /// A handle that persists to `store`, with no attribution yet.
    pub fn new(store: StateStore) -> Self {
        Self {
            store: Some(store),
            blueprint_id: None,
            resource_id: None,
            lease_id: None,
        }
    }

    /// A handle that only emits tracing events.
    pub fn detached() -> Self {
        Self {
            store: None,
            blueprint_id: None,
            resource_id: None,
            lease_id: None,
        }
    }

    pub fn with_blueprint(&self, blueprint_id: &str) -> Self {
        Self {
            blueprint_id: Some(blueprint_id.to_string()),
            ..self.clone()
        }
    }

    pub fn with_resource(&self, resource_id: ResourceId) -> Self {
        Self {
            resource_id: Some(resource_id),
            ..self.clone()
        }
    }

    pub fn with_lease(&self, lease_id: LeaseId) -> Self {
        Self {
            lease_id: Some(lease_id),
            ..self.clone()
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        info!(
            blueprint = self.blueprint_id.as_deref().unwrap_or("-"),
            resource = ?self.resource_id,
            lease = ?self.lease_id,
            "{message}"
        );
        self.persist(message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(
            blueprint = self.blueprint_id.as_deref().unwrap_or("-"),
            resource = ?self.resource_id,
            lease = ?self.lease_id,
            "{message}"
        );
        self.persist(message);
    }

    fn persist(&self, message: String) {
        let Some(store) = &self.store else {
            return;
        };
        let mut entry = LogEntry {
            id: 0,
            epoch: epoch_secs(),
            blueprint_id: self.blueprint_id.clone(),
            resource_id: self.resource_id,
            lease_id: self.lease_id,
            message,
        };
        if let Err(e) = store.append_log(&mut entry) {
            warn!(error = %e, "failed to persist log entry");
        }
    }
}

impl std::fmt::Debug for ScopeLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeLog")
            .field("blueprint_id", &self.blueprint_id)
            .field("resource_id", &self.resource_id)
            .field("lease_id", &self.lease_id)
            .finish()
    }
}
