//! Context handed to strategies while they provision.

use tracing::debug;

use berth_core::{LeaseId, Resource, ResourceId, ResourceStatus};
use berth_state::StateStore;

use crate::blueprint::destroy_resource;
use crate::error::{EngineError, EngineResult};
use crate::log::ScopeLog;
use crate::poll::{PollConfig, poll_until};

/// What a strategy may use during a slow extension point: the store (for
/// reads), the polling budget, and a log handle attributed to the
/// resource and lease being worked on.
#[derive(Clone, Debug)]
pub struct ProvisionScope {
    store: StateStore,
    poll: PollConfig,
    log: ScopeLog,
}

impl ProvisionScope {
    pub fn new(store: StateStore, poll: PollConfig, log: ScopeLog) -> Self {
        Self { store, poll, log }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn poll(&self) -> &PollConfig {
        &self.poll
    }

    pub fn log(&self) -> &ScopeLog {
        &self.log
    }

    /// Wait for a resource still being provisioned elsewhere to open.
    ///
    /// Fails if the resource disappears, stops counting toward capacity
    /// (closing, broken, destroyed) or the polling deadline passes.
    pub async fn wait_until_open(&self, resource_id: ResourceId) -> EngineResult<Resource> {
        let what = format!("waiting for resource {resource_id} to open");
        let store = &self.store;
        poll_until(&self.poll, &what, move || async move {
            let resource = store
                .get_resource(resource_id)?
                .ok_or(EngineError::NoSuchResource(resource_id))?;
            match resource.status {
                ResourceStatus::Open => Ok(Some(resource)),
                ResourceStatus::Allocating | ResourceStatus::Pending => {
                    debug!(resource = resource_id, status = %resource.status, "resource not open yet");
                    Ok(None)
                }
                status => Err(EngineError::InvalidTransition(format!(
                    "resource {resource_id} became {status} while waiting for it to open"
                ))),
            }
        })
        .await
    }

    /// Give up on a resource whose backing has disappeared. Its leases
    /// are broken with `reason`.
    pub fn destroy_resource(
        &self,
        resource_id: ResourceId,
        reason: &str,
    ) -> EngineResult<Vec<LeaseId>> {
        let broken = destroy_resource(&self.store, resource_id, reason)?;
        self.log
            .with_resource(resource_id)
            .warn(format!("resource destroyed: {reason}"));
        Ok(broken)
    }
}
