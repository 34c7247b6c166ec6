//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;

use berth_core::config::BlueprintConfig;
use berth_core::{Lease, LeaseStatus, Resource, ResourceStatus};
use berth_engine::*;
use berth_state::{LocalLockService, LockService, StateStore};
use tokio::sync::Notify;

/// Strategy that provisions instantly and delegates decisions to a policy.
///
/// The switches make individual hooks misbehave.
pub struct PoolStrategy {
    policy: Box<dyn PoolPolicy>,
    pub fail_allocate: AtomicBool,
    pub allocations: AtomicUsize,
    pub teardowns: AtomicUsize,
    /// `should_allocate_lease` fails.
    pub fail_admission: AtomicBool,
    /// `should_allocate_lease` turns every lease away.
    pub refuse_admission: AtomicBool,
    /// Provisioning returns without opening the resource.
    pub leave_pending: AtomicBool,
    /// Provisioning waits for [`PoolStrategy::finish_allocation`].
    pub hold_allocation: AtomicBool,
    allocation_gate: Notify,
    teardown_locks: Mutex<Option<Arc<dyn LockService>>>,
    /// Whether the allocator lock was free during the last teardown.
    pub allocator_lock_free_at_teardown: Mutex<Option<bool>>,
}

impl PoolStrategy {
    pub fn new(policy: impl PoolPolicy + 'static) -> Arc<Self> {
        Arc::new(Self {
            policy: Box::new(policy),
            fail_allocate: AtomicBool::new(false),
            allocations: AtomicUsize::new(0),
            teardowns: AtomicUsize::new(0),
            fail_admission: AtomicBool::new(false),
            refuse_admission: AtomicBool::new(false),
            leave_pending: AtomicBool::new(false),
            hold_allocation: AtomicBool::new(false),
            allocation_gate: Notify::new(),
            teardown_locks: Mutex::new(None),
            allocator_lock_free_at_teardown: Mutex::new(None),
        })
    }

    /// Try the allocator lock from inside every teardown.
    pub fn check_lock_at_teardown(&self, locks: Arc<dyn LockService>) {
        *self.teardown_locks.lock().unwrap() = Some(locks);
    }

    pub fn finish_allocation(&self) {
        self.allocation_gate.notify_one();
    }
}

#[async_trait]
impl BlueprintImplementation for PoolStrategy {
    fn kind(&self) -> &'static str {
        "pool"
    }

    fn can_allocate_more_resources(&self, pool: &[Resource], now: u64) -> bool {
        self.policy.can_allocate_more_resources(pool, now)
    }

    fn should_allocate_lease(
        &self,
        context: &AllocationContext,
        resource: &Resource,
        _lease: &Lease,
    ) -> anyhow::Result<bool> {
        if self.fail_admission.load(Ordering::SeqCst) {
            bail!("capacity check failed");
        }
        if self.refuse_admission.load(Ordering::SeqCst) {
            return Ok(false);
        }
        Ok(self.policy.should_allocate_lease(context, resource))
    }

    fn should_close_unleased_resource(
        &self,
        context: &AllocationContext,
        resource: &Resource,
    ) -> anyhow::Result<bool> {
        Ok(self.policy.should_close_unleased_resource(context, resource))
    }

    fn initialize_pending_resource(&self, resource: &mut Resource, _lease: &Lease) {
        resource.set_attribute("initialized", true);
    }

    async fn execute_allocate_resource(
        &self,
        _scope: &ProvisionScope,
        resource: &mut Resource,
        _lease: &Lease,
    ) -> anyhow::Result<()> {
        self.allocations.fetch_add(1, Ordering::SeqCst);
        if self.fail_allocate.load(Ordering::SeqCst) {
            bail!("quota exceeded");
        }
        if self.hold_allocation.load(Ordering::SeqCst) {
            self.allocation_gate.notified().await;
        }
        tokio::task::yield_now().await;
        resource.set_attribute("path", format!("/pool/{}", resource.id));
        if !self.leave_pending.load(Ordering::SeqCst) {
            resource.status = ResourceStatus::Open;
        }
        Ok(())
    }

    async fn execute_acquire_lease(
        &self,
        scope: &ProvisionScope,
        resource: &Resource,
        lease: &mut Lease,
    ) -> anyhow::Result<()> {
        let resource = scope.wait_until_open(resource.id).await?;
        let root = resource.attribute_str("path").unwrap_or("/pool");
        lease.set_attribute("path", format!("{root}/{}", lease.id));
        Ok(())
    }

    async fn execute_close_resource(
        &self,
        _scope: &ProvisionScope,
        _resource: &Resource,
    ) -> anyhow::Result<()> {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        let locks = self.teardown_locks.lock().unwrap().clone();
        if let Some(locks) = locks {
            let free = locks
                .acquire(ALLOCATOR_LOCK, Duration::from_millis(50))
                .await
                .is_ok();
            *self.allocator_lock_free_at_teardown.lock().unwrap() = Some(free);
        }
        Ok(())
    }
}

pub fn fast_poll() -> PollConfig {
    PollConfig {
        interval: Duration::from_millis(1),
        max_interval: Duration::from_millis(10),
        deadline: Duration::from_secs(5),
    }
}

pub fn min_max(min: u32, max: Option<u32>, per: u32) -> MinMaxPolicy {
    MinMaxPolicy {
        min_count: min,
        max_count: max,
        leases_per_resource: per,
    }
}

pub fn blueprint_config(id: &str, resource_type: &str) -> BlueprintConfig {
    BlueprintConfig {
        id: id.to_string(),
        name: format!("{id} pool"),
        implementation: "pool".to_string(),
        resource_type: resource_type.to_string(),
        enabled: None,
        attributes: None,
        policy: None,
        details: None,
    }
}

pub struct Harness {
    pub store: StateStore,
    pub locks: Arc<LocalLockService>,
    pub registry: Arc<BlueprintRegistry>,
    pub allocator: Arc<Allocator>,
}

/// An allocator over in-memory state with one `storage` blueprint `bp`.
pub fn harness(strategy: Arc<PoolStrategy>) -> Harness {
    harness_with(vec![(blueprint_config("bp", "storage"), strategy)])
}

pub fn harness_with(blueprints: Vec<(BlueprintConfig, Arc<PoolStrategy>)>) -> Harness {
    harness_on(StateStore::open_in_memory().unwrap(), blueprints)
}

pub fn harness_on(
    store: StateStore,
    blueprints: Vec<(BlueprintConfig, Arc<PoolStrategy>)>,
) -> Harness {
    let mut registry = BlueprintRegistry::new(store.clone(), fast_poll());
    for (config, strategy) in blueprints {
        registry.add(&config, strategy).unwrap();
    }
    let registry = Arc::new(registry);
    let locks = Arc::new(LocalLockService::new());
    let allocator = Arc::new(Allocator::new(
        registry.clone(),
        locks.clone(),
        Duration::from_secs(5),
    ));
    Harness {
        store,
        locks,
        registry,
        allocator,
    }
}

impl Harness {
    pub fn blueprint(&self) -> Arc<Blueprint> {
        self.registry.require("bp").unwrap()
    }

    /// Persist a pending lease.
    pub fn pending(&self, resource_type: &str) -> Lease {
        let mut lease = Lease::new(resource_type);
        self.store.insert_lease(&mut lease).unwrap();
        lease
    }

    /// Run the allocator on a fresh lease and return its stored state.
    pub async fn allocate(&self, resource_type: &str) -> Lease {
        let lease = self.pending(resource_type);
        self.allocator.allocate(lease.id).await.unwrap();
        self.store.get_lease(lease.id).unwrap().unwrap()
    }

    /// Insert an open resource owned by `bp`.
    pub fn open_resource(&self, created_at: u64) -> Resource {
        let mut resource = self.blueprint().new_resource();
        resource.status = ResourceStatus::Open;
        resource.created_at = created_at;
        self.store.insert_resource(&mut resource).unwrap();
        resource
    }

    pub fn resource(&self, id: u64) -> Resource {
        self.store.get_resource(id).unwrap().unwrap()
    }

    pub fn lease(&self, id: u64) -> Lease {
        self.store.get_lease(id).unwrap().unwrap()
    }

    /// Poll until some resource is in `status` and return it.
    pub async fn resource_in(&self, status: ResourceStatus) -> Resource {
        loop {
            let found = self
                .store
                .list_resources()
                .unwrap()
                .into_iter()
                .find(|r| r.status == status);
            if let Some(resource) = found {
                return resource;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Poll until the stored lease `id` reaches `status`.
    pub async fn wait_for_lease(&self, id: u64, status: LeaseStatus) {
        while self.store.get_lease(id).unwrap().map(|l| l.status) != Some(status) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}
