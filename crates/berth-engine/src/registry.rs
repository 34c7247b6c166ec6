//! Blueprint registry: configured blueprints grouped by resource type.
//!
//! Strategies are registered by implementation key; [`BlueprintRegistry::load`]
//! then instantiates one [`Blueprint`] per configured `[[blueprint]]`.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use berth_core::config::BlueprintConfig;
use berth_core::{Lease, LeaseId, ResourceId, ResourceStatus};
use berth_state::StateStore;

use crate::blueprint::{Blueprint, BlueprintImplementation};
use crate::error::{EngineError, EngineResult};
use crate::interface::CommandInterface;
use crate::poll::PollConfig;

/// Builds a strategy instance from its blueprint configuration.
pub type ImplementationFactory = Arc<
    dyn Fn(&BlueprintConfig) -> anyhow::Result<Arc<dyn BlueprintImplementation>> + Send + Sync,
>;

pub struct BlueprintRegistry {
    store: StateStore,
    poll: PollConfig,
    factories: BTreeMap<String, ImplementationFactory>,
    blueprints: Vec<Arc<Blueprint>>,
}

impl BlueprintRegistry {
    pub fn new(store: StateStore, poll: PollConfig) -> Self {
        Self {
            store,
            poll,
            factories: BTreeMap::new(),
            blueprints: Vec::new(),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn poll(&self) -> &PollConfig {
        &self.poll
    }

    /// Register a strategy under an implementation key.
    pub fn register_implementation<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&BlueprintConfig) -> anyhow::Result<Arc<dyn BlueprintImplementation>>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(kind.to_string(), Arc::new(factory));
    }

    pub fn implementations(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Instantiate every configured blueprint.
    pub fn load(&mut self, configs: &[BlueprintConfig]) -> EngineResult<()> {
        for config in configs {
            let factory = self
                .factories
                .get(&config.implementation)
                .cloned()
                .ok_or_else(|| EngineError::UnknownImplementation(config.implementation.clone()))?;
            let implementation = factory(config)?;
            self.add(config, implementation)?;
        }
        info!(blueprints = self.blueprints.len(), "blueprints loaded");
        Ok(())
    }

    /// Add one blueprint and register its preallocated resources.
    pub fn add(
        &mut self,
        config: &BlueprintConfig,
        implementation: Arc<dyn BlueprintImplementation>,
    ) -> EngineResult<Arc<Blueprint>> {
        if self.get(&config.id).is_some() {
            return Err(EngineError::DuplicateBlueprint(config.id.clone()));
        }

        let blueprint = Arc::new(Blueprint::new(
            config,
            implementation,
            self.store.clone(),
            self.poll,
        ));
        let seeded = blueprint.seed_resources()?;
        info!(
            blueprint = %blueprint.id(),
            kind = blueprint.kind(),
            resource_type = %blueprint.resource_type(),
            enabled = blueprint.is_enabled(),
            seeded,
            "blueprint registered"
        );
        self.blueprints.push(blueprint.clone());
        Ok(blueprint)
    }

    pub fn all(&self) -> &[Arc<Blueprint>] {
        &self.blueprints
    }

    pub fn get(&self, id: &str) -> Option<Arc<Blueprint>> {
        self.blueprints.iter().find(|b| b.id() == id).cloned()
    }

    pub fn require(&self, id: &str) -> EngineResult<Arc<Blueprint>> {
        self.get(id)
            .ok_or_else(|| EngineError::NoSuchBlueprint(id.to_string()))
    }

    /// Blueprints providing `resource_type`, enabled or not.
    pub fn for_type(&self, resource_type: &str) -> Vec<Arc<Blueprint>> {
        self.blueprints
            .iter()
            .filter(|b| b.resource_type() == resource_type)
            .cloned()
            .collect()
    }

    pub fn by_type(&self) -> BTreeMap<String, Vec<Arc<Blueprint>>> {
        let mut grouped: BTreeMap<String, Vec<Arc<Blueprint>>> = BTreeMap::new();
        for blueprint in &self.blueprints {
            grouped
                .entry(blueprint.resource_type().to_string())
                .or_default()
                .push(blueprint.clone());
        }
        grouped
    }

    // ── Management ─────────────────────────────────────────────────

    /// Release an active lease through the blueprint that owns its resource.
    pub async fn release_lease(&self, lease_id: LeaseId) -> EngineResult<Lease> {
        let mut lease = self
            .store
            .get_lease(lease_id)?
            .ok_or(EngineError::NoSuchLease(lease_id))?;
        let resource_id = lease
            .resource_id
            .ok_or(EngineError::LeaseNotActive(lease_id))?;
        let resource = self
            .store
            .get_resource(resource_id)?
            .ok_or(EngineError::NoSuchResource(resource_id))?;

        self.require(&resource.blueprint_id)?
            .release_lease(&resource, &mut lease, false)
            .await?;
        Ok(lease)
    }

    pub async fn close_resource(&self, resource_id: ResourceId) -> EngineResult<bool> {
        let resource = self
            .store
            .get_resource(resource_id)?
            .ok_or(EngineError::NoSuchResource(resource_id))?;
        self.require(&resource.blueprint_id)?
            .close_resource(resource_id)
            .await
    }

    /// Close every resource still counting toward capacity. Resources of
    /// blueprints that are no longer configured are skipped.
    pub async fn release_all_resources(&self) -> EngineResult<usize> {
        let resources = self
            .store
            .resources_with_status(None, &ResourceStatus::CAPACITY)?;

        let mut closed = 0;
        for resource in resources {
            let Some(blueprint) = self.get(&resource.blueprint_id) else {
                warn!(
                    resource = resource.id,
                    blueprint = %resource.blueprint_id,
                    "skipping resource of unconfigured blueprint"
                );
                continue;
            };
            if blueprint.close_resource(resource.id).await? {
                closed += 1;
            }
        }
        Ok(closed)
    }

    /// A command interface for an active lease.
    pub fn interface(&self, lease_id: LeaseId, kind: &str) -> EngineResult<Box<dyn CommandInterface>> {
        let lease = self
            .store
            .get_lease(lease_id)?
            .ok_or(EngineError::NoSuchLease(lease_id))?;
        let resource_id = lease
            .resource_id
            .ok_or(EngineError::LeaseNotActive(lease_id))?;
        let resource = self
            .store
            .get_resource(resource_id)?
            .ok_or(EngineError::NoSuchResource(resource_id))?;
        self.require(&resource.blueprint_id)?
            .interface(&resource, &lease, kind)
    }
}
