//! Allocator: binds pending leases to resources.
//!
//! For each pending lease the allocator, holding the global allocator lock:
//!
//! 1. tries every compatible `open` resource of the lease's type, in random
//!    order, until one admits the lease;
//! 2. failing that, tries `pending` resources still being provisioned;
//! 3. failing that, picks an enabled blueprint with room in its pool,
//!    creates an `allocating` resource and admits the lease onto it.
//!
//! The lock is dropped before any slow provisioning or teardown. A new
//! resource is allocated outside the lock, and the lease is acquired last.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use berth_core::{Lease, LeaseId, LeaseStatus, Resource, ResourceId, ResourceStatus};
use berth_state::{LockService, StateStore};

use crate::blueprint::{Blueprint, break_lease};
use crate::error::{EngineError, EngineResult};
use crate::log::ScopeLog;
use crate::registry::BlueprintRegistry;

/// Name of the advisory lock serializing allocation decisions.
pub const ALLOCATOR_LOCK: &str = "berth.allocator";

/// Outcome of offering a lease to the existing resources of one status.
enum Placement {
    Bound(Arc<Blueprint>, Resource),
    /// The strategy's capacity check failed. The lease is broken and the
    /// resource may need reclaiming once the lock is released.
    Failed {
        blueprint: Arc<Blueprint>,
        resource_id: ResourceId,
        err: EngineError,
    },
    Unplaced,
}

pub struct Allocator {
    registry: Arc<BlueprintRegistry>,
    locks: Arc<dyn LockService>,
    lock_timeout: Duration,
}

impl Allocator {
    pub fn new(
        registry: Arc<BlueprintRegistry>,
        locks: Arc<dyn LockService>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            locks,
            lock_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<BlueprintRegistry> {
        &self.registry
    }

    fn store(&self) -> &StateStore {
        self.registry.store()
    }

    /// Allocate and acquire a lease. A lease that is not `pending` is left
    /// alone.
    ///
    /// Any error is returned after the lease, if still live, has been
    /// marked broken with the error message. Nothing is retried.
    pub async fn allocate(&self, lease_id: LeaseId) -> EngineResult<()> {
        let result = self.allocate_lease(lease_id).await;
        if let Err(err) = &result {
            match break_lease(self.store(), lease_id, &err.to_string()) {
                Ok(Some(_)) => ScopeLog::new(self.store().clone())
                    .with_lease(lease_id)
                    .warn(format!("allocation failed: {err}")),
                Ok(None) => {}
                Err(break_err) => {
                    warn!(lease = lease_id, error = %break_err, "failed to mark lease broken");
                }
            }
        }
        result
    }

    async fn allocate_lease(&self, lease_id: LeaseId) -> EngineResult<()> {
        let guard = self
            .locks
            .acquire(ALLOCATOR_LOCK, self.lock_timeout)
            .await?;

        let mut lease = self
            .store()
            .get_lease(lease_id)?
            .ok_or(EngineError::NoSuchLease(lease_id))?;
        if lease.status != LeaseStatus::Pending {
            debug!(lease = lease_id, status = %lease.status, "lease is not pending, nothing to do");
            return Ok(());
        }

        let log = ScopeLog::new(self.store().clone()).with_lease(lease_id);
        let blueprints = self.registry.for_type(&lease.resource_type);
        log.info(format!(
            "allocating {} lease, {} candidate blueprints",
            lease.resource_type,
            blueprints.len()
        ));

        let mut bound = None;
        for status in [ResourceStatus::Open, ResourceStatus::Pending] {
            match self.allocate_on_existing(&blueprints, status, &mut lease)? {
                Placement::Bound(blueprint, resource) => {
                    bound = Some((blueprint, resource));
                    break;
                }
                Placement::Failed {
                    blueprint,
                    resource_id,
                    err,
                } => {
                    drop(guard);
                    blueprint.reclaim(resource_id).await;
                    return Err(err);
                }
                Placement::Unplaced => {}
            }
        }

        if let Some((blueprint, resource)) = bound {
            drop(guard);
            log.with_resource(resource.id)
                .info(format!("lease bound to {} resource", resource.status));
            return blueprint.acquire_lease(&resource, &mut lease).await;
        }

        let mut eligible = Vec::new();
        for blueprint in &blueprints {
            if !blueprint.is_enabled() {
                debug!(blueprint = %blueprint.id(), "blueprint disabled");
                continue;
            }
            if !blueprint.can_allocate_resource_for_lease(&lease) {
                debug!(blueprint = %blueprint.id(), "blueprint cannot build a resource for lease");
                continue;
            }
            if !blueprint.can_allocate_more_resources()? {
                debug!(blueprint = %blueprint.id(), "blueprint pool is full");
                continue;
            }
            eligible.push(blueprint.clone());
        }

        if eligible.is_empty() {
            drop(guard);
            let reason = if blueprints.is_empty() {
                format!("no blueprint provides {} resources", lease.resource_type)
            } else {
                format!(
                    "no blueprint can allocate a {} resource for this lease",
                    lease.resource_type
                )
            };
            break_lease(self.store(), lease_id, &reason)?;
            log.warn(reason);
            return Ok(());
        }

        let blueprint = eligible[fastrand::usize(..eligible.len())].clone();
        let mut resource = blueprint.new_resource();
        self.store().insert_resource(&mut resource)?;
        let log = log.with_resource(resource.id);
        log.info(format!("created resource with blueprint {}", blueprint.id()));

        match blueprint.allocate_lease(&resource, &mut lease) {
            Ok(true) => {}
            Ok(false) => {
                self.discard(&blueprint, resource.id);
                return Err(EngineError::ContractViolation(format!(
                    "blueprint {} created resource {} but would not lease against it",
                    blueprint.id(),
                    resource.id
                )));
            }
            Err(err) => {
                self.discard(&blueprint, resource.id);
                return Err(err);
            }
        }

        let mut resource = blueprint.initialize_pending_resource(resource.id, &lease)?;
        drop(guard);

        if let Err(err) = blueprint.allocate_resource(&mut resource, &lease).await {
            if matches!(err, EngineError::Strategy(_)) {
                self.discard(&blueprint, resource.id);
            }
            return Err(err);
        }

        blueprint.acquire_lease(&resource, &mut lease).await
    }

    /// Try to admit `lease` onto an existing resource in `status`.
    fn allocate_on_existing(
        &self,
        blueprints: &[Arc<Blueprint>],
        status: ResourceStatus,
        lease: &mut Lease,
    ) -> EngineResult<Placement> {
        let resources = self
            .store()
            .resources_with_status(Some(&lease.resource_type), &[status])?;

        let mut candidates: Vec<(Arc<Blueprint>, Resource)> = resources
            .into_iter()
            .filter_map(|resource| {
                let blueprint = blueprints.iter().find(|b| b.id() == resource.blueprint_id)?;
                blueprint
                    .filter_resource(&resource, lease)
                    .then(|| (blueprint.clone(), resource))
            })
            .collect();
        fastrand::shuffle(&mut candidates);

        debug!(
            lease = lease.id,
            %status,
            candidates = candidates.len(),
            "trying existing resources"
        );

        for (blueprint, resource) in candidates {
            match blueprint.allocate_lease(&resource, lease) {
                Ok(true) => return Ok(Placement::Bound(blueprint, resource)),
                Ok(false) => {}
                Err(err @ EngineError::Strategy(_)) => {
                    return Ok(Placement::Failed {
                        blueprint,
                        resource_id: resource.id,
                        err,
                    });
                }
                Err(err) => return Err(err),
            }
        }
        Ok(Placement::Unplaced)
    }

    /// Remove a resource row that never reached `open`.
    fn discard(&self, blueprint: &Blueprint, resource_id: ResourceId) {
        match self.store().delete_resource(resource_id) {
            Ok(_) => blueprint
                .log()
                .with_resource(resource_id)
                .warn("discarded resource that failed to allocate"),
            Err(err) => {
                warn!(resource = resource_id, error = %err, "failed to discard resource");
            }
        }
    }
}
