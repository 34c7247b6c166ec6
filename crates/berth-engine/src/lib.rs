//! berth-engine: resource allocation and lease lifecycle.
//!
//! Matches pending leases to resources under pool policies, drives leases
//! through `pending → acquiring → active → released` and resources through
//! `allocating → pending → open → closing → closed`, and keeps every
//! allocation decision atomic across concurrent workers.
//!
//! # Architecture
//!
//! ```text
//! WorkerPool ── LeaseQueue
//!   └── Allocator (global advisory lock for the decision window)
//!         └── BlueprintRegistry
//!               └── Blueprint (state machine, row-lock transactions)
//!                     └── dyn BlueprintImplementation (provisioning strategy)
//!                           └── PoolPolicy (min/max, expiry)
//! ```
//!
//! Strategies plug in through [`BlueprintImplementation`]; the engine owns
//! every status transition so a buggy strategy cannot leave a lease
//! stranded on a closed resource.

pub mod allocator;
pub mod blueprint;
pub mod context;
pub mod error;
pub mod interface;
pub mod log;
pub mod policy;
pub mod poll;
pub mod queue;
pub mod registry;
pub mod scope;

pub use allocator::{ALLOCATOR_LOCK, Allocator};
pub use blueprint::{
    Blueprint, BlueprintImplementation, RESOURCE_CLOSED_REASON, break_lease, destroy_resource,
};
pub use context::AllocationContext;
pub use error::{EngineError, EngineResult};
pub use interface::{COMMAND_INTERFACE, CommandInterface, CommandOutput, CommandSettings};
pub use log::ScopeLog;
pub use policy::{ExpiryPolicy, MinMaxPolicy, PoolPolicy, policy_from_config};
pub use poll::{PollConfig, poll_until};
pub use queue::{LeaseQueue, WorkerPool, wait_until_active};
pub use registry::{BlueprintRegistry, ImplementationFactory};
pub use scope::ProvisionScope;
