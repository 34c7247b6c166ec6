//! `local-directory`: a pool of scratch directories.
//!
//! Each resource is `<root>/<resource id>`; each lease gets its own
//! `<resource path>/<lease id>` subdirectory. Pool sizing follows the
//! blueprint's `[blueprint.policy]`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use async_trait::async_trait;

use berth_core::config::BlueprintConfig;
use berth_core::{Lease, Resource, ResourceStatus};
use berth_engine::{
    AllocationContext, BlueprintImplementation, COMMAND_INTERFACE, CommandInterface, EngineError,
    EngineResult, PoolPolicy, ProvisionScope, policy_from_config,
};

use crate::command::LocalCommandInterface;

pub const LOCAL_DIRECTORY: &str = "local-directory";

#[derive(Debug)]
pub struct LocalDirectory {
    root: PathBuf,
    policy: Box<dyn PoolPolicy>,
}

impl LocalDirectory {
    pub fn new(root: impl Into<PathBuf>, policy: Box<dyn PoolPolicy>) -> Self {
        Self {
            root: root.into(),
            policy,
        }
    }

    /// Build from a blueprint's `details.root` and policy.
    pub fn from_config(config: &BlueprintConfig) -> anyhow::Result<Self> {
        let root = config
            .detail_str("root")
            .with_context(|| format!("blueprint {}: details.root is required", config.id))?;
        let policy = policy_from_config(config.policy.as_ref())
            .with_context(|| format!("blueprint {}: invalid policy", config.id))?;
        Ok(Self::new(root, policy))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Remove a directory tree, treating an already missing one as removed.
async fn remove_tree(path: &str) -> anyhow::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to remove {path}")),
    }
}

#[async_trait]
impl BlueprintImplementation for LocalDirectory {
    fn kind(&self) -> &'static str {
        LOCAL_DIRECTORY
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
        let path = self.root.join(resource.id.to_string());
        resource.set_attribute("path", path.display().to_string());
    }

    async fn execute_allocate_resource(
        &self,
        scope: &ProvisionScope,
        resource: &mut Resource,
        _lease: &Lease,
    ) -> anyhow::Result<()> {
        let path = self.root.join(resource.id.to_string());
        tokio::fs::create_dir_all(&path)
            .await
            .with_context(|| format!("failed to create {}", path.display()))?;

        resource.set_attribute("path", path.display().to_string());
        resource.status = ResourceStatus::Open;
        scope.log().info(format!("created directory {}", path.display()));
        Ok(())
    }

    async fn execute_acquire_lease(
        &self,
        scope: &ProvisionScope,
        resource: &Resource,
        lease: &mut Lease,
    ) -> anyhow::Result<()> {
        let resource = scope.wait_until_open(resource.id).await?;
        let root = resource
            .attribute_str("path")
            .with_context(|| format!("resource {} has no path", resource.id))?;

        if !tokio::fs::try_exists(root).await.unwrap_or(false) {
            let reason = format!("directory {root} disappeared");
            scope.destroy_resource(resource.id, &reason)?;
            bail!(reason);
        }

        let path = Path::new(root).join(lease.id.to_string());
        tokio::fs::create_dir_all(&path)
            .await
            .with_context(|| format!("failed to create {}", path.display()))?;

        lease.set_attribute("path", path.display().to_string());
        Ok(())
    }

    async fn execute_release_lease(
        &self,
        scope: &ProvisionScope,
        _resource: &Resource,
        lease: &Lease,
    ) -> anyhow::Result<()> {
        if let Some(path) = lease.attribute_str("path") {
            remove_tree(path).await?;
            scope.log().info(format!("removed {path}"));
        }
        Ok(())
    }

    async fn execute_close_resource(
        &self,
        scope: &ProvisionScope,
        resource: &Resource,
    ) -> anyhow::Result<()> {
        if let Some(path) = resource.attribute_str("path") {
            remove_tree(path).await?;
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
