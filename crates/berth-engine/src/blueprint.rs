//! Blueprint contract and the lease/resource lifecycle engine.
//!
//! A [`BlueprintImplementation`] is a provisioning strategy: it decides
//! which leases fit which resources and does the slow work of bringing
//! resources up and handing leases out. [`Blueprint`] wraps one configured
//! instance of a strategy and owns every state transition, so strategies
//! never write lease or resource status themselves.
//!
//! # Locking
//!
//! Admission, release and the move to `closing` each run inside a single
//! [`StateTxn`], which is the row-lock scope: the capacity snapshot a
//! decision sees is the one its write lands on. Strategy extension points
//! that may block (`execute_*`) always run with no transaction open.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use berth_core::attributes::{has_requirements, parse_custom_attributes};
use berth_core::config::BlueprintConfig;
use berth_core::{
    Attributes, Lease, LeaseId, LeaseStatus, Resource, ResourceId, ResourceStatus, epoch_secs,
};
use berth_state::{StateStore, StateTxn};

use crate::context::AllocationContext;
use crate::error::{EngineError, EngineResult};
use crate::interface::CommandInterface;
use crate::log::ScopeLog;
use crate::poll::PollConfig;
use crate::scope::ProvisionScope;

/// Broken reason recorded on leases still queued on a closing resource.
pub const RESOURCE_CLOSED_REASON: &str = "resource forcibly closed";

/// Extension points a provisioning strategy fills in.
///
/// The cheap, synchronous hooks run while the engine holds a lock or an
/// open transaction and must not touch the state store. The `execute_*`
/// hooks run with nothing held and may take as long as they need.
#[async_trait]
pub trait BlueprintImplementation: Send + Sync {
    /// Registry key, e.g. `local-directory`.
    fn kind(&self) -> &'static str;

    fn is_enabled(&self) -> bool {
        true
    }

    /// Whether the engine should match a lease's `attr_*` requirements
    /// against the blueprint's configured attributes before asking
    /// [`BlueprintImplementation::can_allocate_lease`].
    fn supports_custom_attributes(&self) -> bool {
        true
    }

    /// Whether the pool may grow. `pool` holds this blueprint's
    /// capacity-counting resources.
    fn can_allocate_more_resources(&self, pool: &[Resource], now: u64) -> bool;

    /// Whether a new resource could be built to satisfy `lease`.
    fn can_allocate_resource_for_lease(&self, _lease: &Lease) -> bool {
        true
    }

    /// Compatibility between an existing resource and a lease. No capacity
    /// checks here; those belong in `should_allocate_lease`.
    fn can_allocate_lease(&self, _resource: &Resource, _lease: &Lease) -> bool {
        true
    }

    /// Capacity check run under the resource's row lock.
    fn should_allocate_lease(
        &self,
        context: &AllocationContext,
        resource: &Resource,
        lease: &Lease,
    ) -> anyhow::Result<bool>;

    /// Asked when a resource holds no leases.
    fn should_close_unleased_resource(
        &self,
        context: &AllocationContext,
        resource: &Resource,
    ) -> anyhow::Result<bool>;

    /// Attribute setup for a resource that is about to become `pending`,
    /// so other workers' compatibility checks accept it early.
    fn initialize_pending_resource(&self, _resource: &mut Resource, _lease: &Lease) {}

    /// Resources that exist outside the engine and are registered `open`
    /// when the blueprint loads, as `(name, attributes)`.
    fn preallocated_resources(&self) -> Vec<(String, Attributes)> {
        Vec::new()
    }

    /// Bring a resource up. On success the resource must be `open`.
    async fn execute_allocate_resource(
        &self,
        scope: &ProvisionScope,
        resource: &mut Resource,
        lease: &Lease,
    ) -> anyhow::Result<()>;

    /// Hand a lease out on a resource. Attributes set on `lease` are kept
    /// once the lease becomes active.
    async fn execute_acquire_lease(
        &self,
        scope: &ProvisionScope,
        resource: &Resource,
        lease: &mut Lease,
    ) -> anyhow::Result<()>;

    /// Best-effort cleanup after a lease is released.
    async fn execute_release_lease(
        &self,
        _scope: &ProvisionScope,
        _resource: &Resource,
        _lease: &Lease,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Best-effort teardown of a closing resource.
    async fn execute_close_resource(
        &self,
        _scope: &ProvisionScope,
        _resource: &Resource,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn interface(
        &self,
        _resource: &Resource,
        _lease: &Lease,
        kind: &str,
    ) -> EngineResult<Box<dyn CommandInterface>> {
        Err(EngineError::NoInterface(kind.to_string()))
    }
}

fn transition_lease(lease: &mut Lease, next: LeaseStatus) -> EngineResult<()> {
    if !lease.status.can_transition_to(next) {
        return Err(EngineError::InvalidTransition(format!(
            "lease {} cannot go from {} to {next}",
            lease.id, lease.status
        )));
    }
    lease.status = next;
    Ok(())
}

fn transition_resource(resource: &mut Resource, next: ResourceStatus) -> EngineResult<()> {
    if !resource.status.can_transition_to(next) {
        return Err(EngineError::InvalidTransition(format!(
            "resource {} cannot go from {} to {next}",
            resource.id, resource.status
        )));
    }
    resource.status = next;
    Ok(())
}

/// Divert a lease to `broken` unless it already reached a terminal status.
///
/// Returns the updated lease, or `None` if it was missing or terminal.
pub fn break_lease(
    store: &StateStore,
    lease_id: LeaseId,
    reason: &str,
) -> EngineResult<Option<Lease>> {
    let txn = store.begin()?;
    let Some(mut lease) = txn.get_lease(lease_id)? else {
        return Ok(None);
    };
    if lease.status.is_terminal() {
        return Ok(None);
    }
    lease.mark_broken(reason);
    txn.put_lease(&lease)?;
    txn.commit()?;
    warn!(lease = lease_id, reason, "lease broken");
    Ok(Some(lease))
}

/// Mark a resource `destroyed` after its backing went away, breaking
/// every lease still bound to it.
///
/// Returns the ids of the broken leases. Terminal resources are left alone.
pub fn destroy_resource(
    store: &StateStore,
    resource_id: ResourceId,
    reason: &str,
) -> EngineResult<Vec<LeaseId>> {
    let txn = store.begin()?;
    let mut resource = txn
        .get_resource(resource_id)?
        .ok_or(EngineError::NoSuchResource(resource_id))?;
    if resource.status.is_terminal() {
        return Ok(Vec::new());
    }
    transition_resource(&mut resource, ResourceStatus::Destroyed)?;
    txn.put_resource(&resource)?;

    let mut broken = Vec::new();
    for mut lease in txn.leases_for_resource(resource_id, &LeaseStatus::LOAD)? {
        lease.mark_broken(reason);
        txn.put_lease(&lease)?;
        broken.push(lease.id);
    }
    txn.commit()?;
    warn!(resource = resource_id, leases = broken.len(), reason, "resource destroyed");
    Ok(broken)
}

/// Leases found on a resource as it moved to `closing`.
struct ClosingLeases {
    active: Vec<Lease>,
    broken: Vec<LeaseId>,
}

/// One configured blueprint instance: a strategy plus its settings.
pub struct Blueprint {
    id: String,
    name: String,
    resource_type: String,
    enabled: bool,
    custom_attributes: Attributes,
    implementation: Arc<dyn BlueprintImplementation>,
    store: StateStore,
    poll: PollConfig,
    log: ScopeLog,
}

impl Blueprint {
    pub fn new(
        config: &BlueprintConfig,
        implementation: Arc<dyn BlueprintImplementation>,
        store: StateStore,
        poll: PollConfig,
    ) -> Self {
        let log = ScopeLog::new(store.clone()).with_blueprint(&config.id);
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            resource_type: config.resource_type.clone(),
            enabled: config.is_enabled(),
            custom_attributes: parse_custom_attributes(config.attributes.as_deref()),
            implementation,
            store,
            poll,
            log,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn kind(&self) -> &'static str {
        self.implementation.kind()
    }

    /// Enabled in configuration and by the strategy itself.
    pub fn is_enabled(&self) -> bool {
        self.enabled && self.implementation.is_enabled()
    }

    pub fn log(&self) -> &ScopeLog {
        &self.log
    }

    fn scope(&self, resource_id: ResourceId, lease_id: Option<LeaseId>) -> ProvisionScope {
        let mut log = self.log.with_resource(resource_id);
        if let Some(lease_id) = lease_id {
            log = log.with_lease(lease_id);
        }
        ProvisionScope::new(self.store.clone(), self.poll, log)
    }

    /// An unsaved `allocating` resource row owned by this blueprint.
    pub fn new_resource(&self) -> Resource {
        Resource::new(&self.id, &self.resource_type, &self.name)
    }

    /// Cheap compatibility check between an existing resource and a lease.
    pub fn filter_resource(&self, resource: &Resource, lease: &Lease) -> bool {
        if resource.blueprint_id != self.id {
            return false;
        }
        if self.implementation.supports_custom_attributes()
            && !has_requirements(&lease.attributes, &self.custom_attributes)
        {
            debug!(
                blueprint = %self.id,
                resource = resource.id,
                lease = lease.id,
                "custom attribute requirements not met"
            );
            return false;
        }
        self.implementation.can_allocate_lease(resource, lease)
    }

    /// This blueprint's capacity-counting resources.
    pub fn pool(&self) -> EngineResult<Vec<Resource>> {
        Ok(self
            .store
            .list_resources()?
            .into_iter()
            .filter(|r| r.blueprint_id == self.id && r.status.counts_toward_capacity())
            .collect())
    }

    pub fn can_allocate_more_resources(&self) -> EngineResult<bool> {
        let pool = self.pool()?;
        Ok(self
            .implementation
            .can_allocate_more_resources(&pool, epoch_secs()))
    }

    pub fn can_allocate_resource_for_lease(&self, lease: &Lease) -> bool {
        if self.implementation.supports_custom_attributes()
            && !has_requirements(&lease.attributes, &self.custom_attributes)
        {
            return false;
        }
        self.implementation.can_allocate_resource_for_lease(lease)
    }

    // ── Leases ─────────────────────────────────────────────────────

    /// Try to admit a pending lease onto `resource`.
    ///
    /// On admission the lease is bound and `acquiring`, and `lease` is
    /// updated to match. A rejection leaves everything untouched. If the
    /// strategy's capacity check fails the lease is broken; the resource
    /// may then be idle, and the caller reclaims it with
    /// [`Blueprint::reclaim`] once it holds no lock.
    pub fn allocate_lease(&self, resource: &Resource, lease: &mut Lease) -> EngineResult<bool> {
        let log = self.log.with_resource(resource.id).with_lease(lease.id);
        match self.admit(resource.id, lease.id) {
            Ok(Some(admitted)) => {
                *lease = admitted;
                log.info("lease admitted");
                Ok(true)
            }
            Ok(None) => {
                debug!(blueprint = %self.id, resource = resource.id, lease = lease.id, "lease not admitted");
                Ok(false)
            }
            Err(EngineError::Strategy(err)) => {
                let reason = err.to_string();
                log.warn(format!("admission check failed: {reason}"));
                if let Some(broken) = break_lease(&self.store, lease.id, &reason)? {
                    *lease = broken;
                }
                Err(EngineError::Strategy(err))
            }
            Err(err) => Err(err),
        }
    }

    /// The admission transaction. Returns the bound lease if admitted.
    fn admit(&self, resource_id: ResourceId, lease_id: LeaseId) -> EngineResult<Option<Lease>> {
        let txn = self.store.begin()?;
        let resource = txn
            .get_resource(resource_id)?
            .ok_or(EngineError::NoSuchResource(resource_id))?;
        if resource.blueprint_id != self.id {
            return Err(EngineError::InvalidTransition(format!(
                "resource {resource_id} belongs to blueprint {}, not {}",
                resource.blueprint_id, self.id
            )));
        }
        if !resource.status.counts_toward_capacity() {
            return Ok(None);
        }

        let stored = txn
            .get_lease(lease_id)?
            .ok_or(EngineError::NoSuchLease(lease_id))?;
        if stored.status != LeaseStatus::Pending || stored.resource_id.is_some() {
            return Err(EngineError::InvalidTransition(format!(
                "lease {lease_id} is {} and cannot be admitted",
                stored.status
            )));
        }

        let snapshot = txn.capacity_snapshot(&self.id)?;
        let context = AllocationContext::new(snapshot, resource_id, epoch_secs());

        let mut candidate = stored;
        candidate.resource_id = Some(resource_id);
        transition_lease(&mut candidate, LeaseStatus::Acquiring)?;

        if !self
            .implementation
            .should_allocate_lease(&context, &resource, &candidate)?
        {
            return Ok(None);
        }

        txn.put_lease(&candidate)?;
        txn.commit()?;
        Ok(Some(candidate))
    }

    /// Hand an admitted lease out and make it active.
    ///
    /// The strategy works on an in-progress copy; its attributes are merged
    /// into the stored lease only if the lease is still `acquiring` when the
    /// strategy returns.
    pub async fn acquire_lease(&self, resource: &Resource, lease: &mut Lease) -> EngineResult<()> {
        if lease.status != LeaseStatus::Acquiring || lease.resource_id != Some(resource.id) {
            return Err(EngineError::InvalidTransition(format!(
                "lease {} is {} on {:?} and cannot be acquired on resource {}",
                lease.id, lease.status, lease.resource_id, resource.id
            )));
        }

        let scope = self.scope(resource.id, Some(lease.id));
        scope.log().info("acquiring lease");

        let mut in_progress = lease.clone();
        if let Err(err) = self
            .implementation
            .execute_acquire_lease(&scope, resource, &mut in_progress)
            .await
        {
            let reason = err.to_string();
            scope.log().warn(format!("lease acquisition failed: {reason}"));
            if let Some(broken) = break_lease(&self.store, lease.id, &reason)? {
                *lease = broken;
            }
            self.reclaim(resource.id).await;
            return Err(EngineError::Strategy(err));
        }

        *lease = self.activate(lease.id, in_progress.attributes)?;
        scope.log().info("lease active");
        Ok(())
    }

    fn activate(&self, lease_id: LeaseId, attributes: Attributes) -> EngineResult<Lease> {
        let txn = self.store.begin()?;
        let mut lease = txn
            .get_lease(lease_id)?
            .ok_or(EngineError::NoSuchLease(lease_id))?;
        if lease.status != LeaseStatus::Acquiring {
            return Err(EngineError::InvalidTransition(format!(
                "lease {lease_id} became {} while being acquired",
                lease.status
            )));
        }
        lease.attributes = attributes;
        transition_lease(&mut lease, LeaseStatus::Active)?;
        txn.put_lease(&lease)?;
        txn.commit()?;
        Ok(lease)
    }

    /// Release an active lease.
    ///
    /// Unless the release comes from the resource closing, the strategy's
    /// cleanup runs afterwards and the resource is reclaimed if idle.
    pub async fn release_lease(
        &self,
        resource: &Resource,
        lease: &mut Lease,
        caused_by_closing_resource: bool,
    ) -> EngineResult<()> {
        if lease.resource_id != Some(resource.id) {
            return Err(EngineError::InvalidTransition(format!(
                "lease {} is not bound to resource {}",
                lease.id, resource.id
            )));
        }

        *lease = self.mark_released(lease.id)?;
        let scope = self.scope(resource.id, Some(lease.id));

        if caused_by_closing_resource {
            scope.log().info("lease released by resource closure");
            return Ok(());
        }
        scope.log().info("lease released");

        if let Err(err) = self
            .implementation
            .execute_release_lease(&scope, resource, lease)
            .await
        {
            scope.log().warn(format!("lease cleanup failed: {err}"));
        }

        self.close_resource_if_desired(resource.id).await?;
        Ok(())
    }

    fn mark_released(&self, lease_id: LeaseId) -> EngineResult<Lease> {
        let txn = self.store.begin()?;
        let mut lease = txn
            .get_lease(lease_id)?
            .ok_or(EngineError::NoSuchLease(lease_id))?;
        if lease.status != LeaseStatus::Active {
            return Err(EngineError::LeaseNotActive(lease_id));
        }
        transition_lease(&mut lease, LeaseStatus::Released)?;
        txn.put_lease(&lease)?;
        txn.commit()?;
        Ok(lease)
    }

    /// A stable handle for running commands against an active lease.
    pub fn interface(
        &self,
        resource: &Resource,
        lease: &Lease,
        kind: &str,
    ) -> EngineResult<Box<dyn CommandInterface>> {
        if lease.status != LeaseStatus::Active {
            return Err(EngineError::LeaseNotActive(lease.id));
        }
        if lease.resource_id != Some(resource.id) {
            return Err(EngineError::InvalidTransition(format!(
                "lease {} is not bound to resource {}",
                lease.id, resource.id
            )));
        }
        self.implementation.interface(resource, lease, kind)
    }

    // ── Resources ──────────────────────────────────────────────────

    /// Run the strategy's provisioning for a `pending` resource.
    ///
    /// The strategy must leave the resource `open`; anything else is a
    /// contract violation and the resource is marked `broken`.
    pub async fn allocate_resource(&self, resource: &mut Resource, lease: &Lease) -> EngineResult<()> {
        let scope = self.scope(resource.id, Some(lease.id));
        scope.log().info("allocating resource");

        self.implementation
            .execute_allocate_resource(&scope, resource, lease)
            .await?;

        if resource.status != ResourceStatus::Open {
            let message = format!(
                "blueprint {} left resource {} {} after allocation instead of open",
                self.id, resource.id, resource.status
            );
            scope.log().warn(&message);
            self.mark_resource_broken(resource.id)?;
            return Err(EngineError::ContractViolation(message));
        }

        let superseded = {
            let txn = self.store.begin()?;
            let current = txn
                .get_resource(resource.id)?
                .ok_or(EngineError::NoSuchResource(resource.id))?;
            if matches!(
                current.status,
                ResourceStatus::Allocating | ResourceStatus::Pending
            ) {
                txn.put_resource(resource)?;
                txn.commit()?;
                None
            } else {
                Some(current.status)
            }
        };

        if let Some(status) = superseded {
            // Closed while provisioning: tear down what was just built.
            scope.log().warn(format!("resource became {status} while being allocated"));
            if let Err(err) = self
                .implementation
                .execute_close_resource(&scope, resource)
                .await
            {
                scope.log().warn(format!("resource teardown failed: {err}"));
            }
            return Err(EngineError::InvalidTransition(format!(
                "resource {} became {status} while being allocated",
                resource.id
            )));
        }

        scope.log().info("resource open");
        Ok(())
    }

    /// Flip a freshly admitted `allocating` resource to `pending` and let
    /// the strategy set up the attributes other workers filter on.
    pub fn initialize_pending_resource(
        &self,
        resource_id: ResourceId,
        lease: &Lease,
    ) -> EngineResult<Resource> {
        let txn = self.store.begin()?;
        let mut resource = txn
            .get_resource(resource_id)?
            .ok_or(EngineError::NoSuchResource(resource_id))?;
        transition_resource(&mut resource, ResourceStatus::Pending)?;
        self.implementation
            .initialize_pending_resource(&mut resource, lease);
        txn.put_resource(&resource)?;
        txn.commit()?;
        Ok(resource)
    }

    fn mark_resource_broken(&self, resource_id: ResourceId) -> EngineResult<()> {
        let txn = self.store.begin()?;
        if let Some(mut resource) = txn.get_resource(resource_id)? {
            if !resource.status.is_terminal() {
                transition_resource(&mut resource, ResourceStatus::Broken)?;
                txn.put_resource(&resource)?;
                txn.commit()?;
            }
        }
        Ok(())
    }

    /// Close a resource and everything leased on it.
    ///
    /// Returns false if the resource was already closing or terminal.
    pub async fn close_resource(&self, resource_id: ResourceId) -> EngineResult<bool> {
        let (resource, leases) = {
            let txn = self.store.begin()?;
            let mut resource = txn
                .get_resource(resource_id)?
                .ok_or(EngineError::NoSuchResource(resource_id))?;
            if resource.status == ResourceStatus::Closing || resource.status.is_terminal() {
                debug!(resource = resource_id, status = %resource.status, "resource already closing");
                return Ok(false);
            }
            let leases = self.mark_closing(&txn, &mut resource)?;
            txn.commit()?;
            (resource, leases)
        };

        self.finish_close(resource, leases).await?;
        Ok(true)
    }

    /// Close a resource if it holds no leases and the strategy agrees.
    ///
    /// Only `open` resources are considered; resources still being
    /// provisioned are left to their allocator. The idle check and the move
    /// to `closing` happen in one transaction, so a lease admitted
    /// concurrently is either counted or refused.
    pub async fn close_resource_if_desired(&self, resource_id: ResourceId) -> EngineResult<bool> {
        let (resource, leases) = {
            let txn = self.store.begin()?;
            let Some(mut resource) = txn.get_resource(resource_id)? else {
                return Ok(false);
            };
            if resource.status != ResourceStatus::Open {
                return Ok(false);
            }

            let snapshot = txn.capacity_snapshot(&self.id)?;
            let context = AllocationContext::new(snapshot, resource_id, epoch_secs());
            if context.lease_count() > 0 {
                return Ok(false);
            }
            if !self
                .implementation
                .should_close_unleased_resource(&context, &resource)?
            {
                return Ok(false);
            }

            let leases = self.mark_closing(&txn, &mut resource)?;
            txn.commit()?;
            (resource, leases)
        };

        self.log
            .with_resource(resource_id)
            .info("resource is idle and no longer needed");
        self.finish_close(resource, leases).await?;
        Ok(true)
    }

    /// Reclaim after a failure; errors are logged, not returned.
    /// Close `resource_id` if it has become idle, logging any failure.
    pub async fn reclaim(&self, resource_id: ResourceId) {
        if let Err(err) = self.close_resource_if_desired(resource_id).await {
            self.log
                .with_resource(resource_id)
                .warn(format!("failed to reclaim resource: {err}"));
        }
    }

    /// Move to `closing` and break every lease not yet active.
    fn mark_closing(&self, txn: &StateTxn, resource: &mut Resource) -> EngineResult<ClosingLeases> {
        transition_resource(resource, ResourceStatus::Closing)?;
        txn.put_resource(resource)?;

        let mut leases = ClosingLeases {
            active: Vec::new(),
            broken: Vec::new(),
        };
        for mut lease in txn.leases_for_resource(resource.id, &LeaseStatus::LOAD)? {
            if lease.status == LeaseStatus::Active {
                leases.active.push(lease);
            } else {
                lease.mark_broken(RESOURCE_CLOSED_REASON);
                txn.put_lease(&lease)?;
                leases.broken.push(lease.id);
            }
        }
        Ok(leases)
    }

    async fn finish_close(&self, resource: Resource, leases: ClosingLeases) -> EngineResult<()> {
        let scope = self.scope(resource.id, None);
        scope.log().info(format!(
            "closing resource with {} active and {} queued leases",
            leases.active.len(),
            leases.broken.len()
        ));
        for lease_id in leases.broken {
            scope.log().with_lease(lease_id).warn(RESOURCE_CLOSED_REASON);
        }

        for lease in leases.active {
            match self.mark_released(lease.id) {
                Ok(_) => scope
                    .log()
                    .with_lease(lease.id)
                    .info("lease released by resource closure"),
                Err(EngineError::LeaseNotActive(id)) => {
                    debug!(lease = id, "lease already released");
                }
                Err(err) => return Err(err),
            }
        }

        if let Err(err) = self
            .implementation
            .execute_close_resource(&scope, &resource)
            .await
        {
            scope.log().warn(format!("resource teardown failed: {err}"));
        }

        {
            let txn = self.store.begin()?;
            if let Some(mut current) = txn.get_resource(resource.id)? {
                if current.status == ResourceStatus::Closing {
                    transition_resource(&mut current, ResourceStatus::Closed)?;
                    txn.put_resource(&current)?;
                    txn.commit()?;
                }
            }
        }

        scope.log().info("resource closed");
        Ok(())
    }

    /// Register this blueprint's preallocated resources that are not in
    /// the pool yet. Returns how many were added.
    pub fn seed_resources(&self) -> EngineResult<usize> {
        let declared = self.implementation.preallocated_resources();
        if declared.is_empty() {
            return Ok(0);
        }

        let mut added = Vec::new();
        {
            let txn = self.store.begin()?;
            let existing: Vec<String> = txn
                .resources()?
                .into_iter()
                .filter(|r| r.blueprint_id == self.id && r.status.counts_toward_capacity())
                .map(|r| r.name)
                .collect();

            for (name, attributes) in declared {
                if existing.contains(&name) {
                    continue;
                }
                let mut resource = self.new_resource();
                resource.name = name;
                resource.attributes = attributes;
                resource.status = ResourceStatus::Open;
                txn.insert_resource(&mut resource)?;
                added.push(resource.id);
            }
            txn.commit()?;
        }

        for id in &added {
            self.log.with_resource(*id).info("preallocated resource registered");
        }
        Ok(added.len())
    }
}

impl std::fmt::Debug for Blueprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blueprint")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("resource_type", &self.resource_type)
            .field("enabled", &self.enabled)
            .finish()
    }
}
