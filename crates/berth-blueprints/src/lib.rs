//! berth-blueprints: concrete provisioning strategies.
//!
//! # Strategies
//!
//! ```text
//!   local-directory     pool of directories under a root, sized by
//!                       [blueprint.policy]; one subdirectory per lease
//!   preallocated-host   fixed hosts declared in [[blueprint.details.hosts]],
//!                       matched on platform and attr_* requirements
//! ```
//!
//! Both hand out a [`LocalCommandInterface`] rooted at the lease's
//! directory.

pub mod command;
pub mod directory;
pub mod hosts;

use std::sync::Arc;

use berth_engine::{BlueprintImplementation, BlueprintRegistry};

pub use command::LocalCommandInterface;
pub use directory::{LOCAL_DIRECTORY, LocalDirectory};
pub use hosts::{HostConfig, PREALLOCATED_HOST, PreallocatedHosts};

/// Register every strategy in this crate under its implementation key.
pub fn register_all(registry: &mut BlueprintRegistry) {
    registry.register_implementation(LOCAL_DIRECTORY, |config| {
        let strategy: Arc<dyn BlueprintImplementation> =
            Arc::new(LocalDirectory::from_config(config)?);
        Ok(strategy)
    });
    registry.register_implementation(PREALLOCATED_HOST, |config| {
        let strategy: Arc<dyn BlueprintImplementation> =
            Arc::new(PreallocatedHosts::from_config(config)?);
        Ok(strategy)
    });
}
