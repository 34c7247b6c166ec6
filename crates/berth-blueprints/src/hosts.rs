//! `preallocated-host`: a fixed set of hosts declared in configuration.
//!
//! ```toml
//! [[blueprint.details.hosts]]
//! name = "build-01"
//! path = "/srv/work"
//! platform = "linux"
//! attributes = { arch = "x86_64" }
//! ```
//!
//! Hosts are registered `open` when the blueprint loads. The pool never
//! grows or shrinks; each lease gets `<host path>/<lease id>`.

use std::collections::BTreeMap;

use anyhow::{Context, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use berth_core::attributes::{CUSTOM_PREFIX, has_requirements};
use berth_core::config::BlueprintConfig;
use berth_core::{Attributes, Lease, Resource};
use berth_engine::{
    AllocationContext, BlueprintImplementation, COMMAND_INTERFACE, CommandInterface, EngineError,
    EngineResult, ProvisionScope,
};
use berth_engine::interface::shell_quote;

use crate::command::LocalCommandInterface;

pub const PREALLOCATED_HOST: &str = "preallocated-host";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HostConfig {
    pub name: String,
    /// Directory leases are created under.
    pub path: String,
    pub platform: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl HostConfig {
    fn resource_attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("path".to_string(), Value::String(self.path.clone()));
        if let Some(platform) = &self.platform {
            attributes.insert("platform".to_string(), Value::String(platform.clone()));
        }
        for (key, value) in &self.attributes {
            attributes.insert(format!("{CUSTOM_PREFIX}{key}"), Value::String(value.clone()));
        }
        attributes
    }
}

#[derive(Debug)]
pub struct PreallocatedHosts {
    hosts: Vec<HostConfig>,
    leases_per_host: u32,
}

impl PreallocatedHosts {
    pub fn new(hosts: Vec<HostConfig>, leases_per_host: u32) -> Self {
        Self {
            hosts,
            leases_per_host,
        }
    }

    /// Hosts come from `details.hosts`; `policy.leases_per_resource`
    /// bounds concurrent leases per host and defaults to unlimited.
    pub fn from_config(config: &BlueprintConfig) -> anyhow::Result<Self> {
        let hosts: Vec<HostConfig> = match config.detail("hosts") {
            Some(value) => value
                .clone()
                .try_into::<Vec<HostConfig>>()
                .with_context(|| format!("blueprint {}: invalid details.hosts", config.id))?,
            None => Vec::new(),
        };
        if hosts.is_empty() {
            bail!("blueprint {}: no hosts declared", config.id);
        }
        let leases_per_host = config
            .policy
            .as_ref()
            .and_then(|p| p.leases_per_resource)
            .unwrap_or(u32::MAX);
        Ok(Self::new(hosts, leases_per_host))
    }

    pub fn hosts(&self) -> &[HostConfig] {
        &self.hosts
    }
}

#[async_trait]
impl BlueprintImplementation for PreallocatedHosts {
    fn kind(&self) -> &'static str {
        PREALLOCATED_HOST
    }

    fn supports_custom_attributes(&self) -> bool {
        false
    }

    fn can_allocate_more_resources(&self, _pool: &[Resource], _now: u64) -> bool {
        false
    }

    fn can_allocate_resource_for_lease(&self, _lease: &Lease) -> bool {
        false
    }

    fn can_allocate_lease(&self, resource: &Resource, lease: &Lease) -> bool {
        if let Some(platform) = lease.attribute_str("platform") {
            if resource.attribute_str("platform") != Some(platform) {
                return false;
            }
        }
        has_requirements(&lease.attributes, &resource.attributes)
    }

    fn should_allocate_lease(
        &self,
        context: &AllocationContext,
        _resource: &Resource,
        _lease: &Lease,
    ) -> anyhow::Result<bool> {
        Ok(context.lease_count() < self.leases_per_host)
    }

    fn should_close_unleased_resource(
        &self,
        _context: &AllocationContext,
        _resource: &Resource,
    ) -> anyhow::Result<bool> {
        Ok(false)
    }

    fn preallocated_resources(&self) -> Vec<(String, Attributes)> {
        self.hosts
            .iter()
            .map(|host| (host.name.clone(), host.resource_attributes()))
            .collect()
    }

    async fn execute_allocate_resource(
        &self,
        _scope: &ProvisionScope,
        _resource: &mut Resource,
        _lease: &Lease,
    ) -> anyhow::Result<()> {
        bail!("preallocated hosts are declared in configuration, not allocated")
    }

    async fn execute_acquire_lease(
        &self,
        scope: &ProvisionScope,
        resource: &Resource,
        lease: &mut Lease,
    ) -> anyhow::Result<()> {
        let root = resource
            .attribute_str("path")
            .with_context(|| format!("host {} has no path", resource.name))?;
        let path = format!("{}/{}", root.trim_end_matches('/'), lease.id);

        LocalCommandInterface::new()
            .execx(&format!("mkdir -p {}", shell_quote(&path)))
            .await?;
        scope
            .log()
            .info(format!("leased {path} on host {}", resource.name));

        lease.set_attribute("path", path);
        if let Some(platform) = resource.attribute_str("platform") {
            lease.set_attribute("platform", platform);
        }
        Ok(())
    }

    async fn execute_release_lease(
        &self,
        scope: &ProvisionScope,
        _resource: &Resource,
        lease: &Lease,
    ) -> anyhow::Result<()> {
        if let Some(path) = lease.attribute_str("path") {
            LocalCommandInterface::new()
                .execx(&format!("rm -rf {}", shell_quote(path)))
                .await?;
            scope.log().info(format!("removed {path}"));
        }
        Ok(())
    }

    fn interface(
        &self,
        _resource: &Resource,
        lease: &Lease,
        kind: &str,
    ) -> EngineResult<Box<dyn CommandInterface>> {
        if kind != COMMAND_INTERFACE {
            return Err(EngineError::NoInterface(kind.to_string()));
        }
        let path = lease
            .attribute_str("path")
            .ok_or_else(|| EngineError::NoInterface(format!("{kind}: lease {} has no path", lease.id)))?;
        Ok(Box::new(LocalCommandInterface::in_directory(path)))
    }
}
