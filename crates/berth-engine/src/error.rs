//! Engine error types.

use thiserror::Error;

use berth_core::{LeaseId, ResourceId};

/// Errors that can occur while allocating, acquiring or releasing.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("state store error: {0}")]
    State(#[from] berth_state::StateError),

    /// A strategy extension point failed. The message is recorded verbatim
    /// as the broken reason of the affected lease.
    #[error(transparent)]
    Strategy(#[from] anyhow::Error),

    #[error("contract violation: {0}")]
    ContractViolation(String),

    #[error("lease {0} is not active")]
    LeaseNotActive(LeaseId),

    #[error("lease {lease} is broken: {reason}")]
    LeaseBroken { lease: LeaseId, reason: String },

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("lease not found: {0}")]
    NoSuchLease(LeaseId),

    #[error("resource not found: {0}")]
    NoSuchResource(ResourceId),

    #[error("blueprint not found: {0}")]
    NoSuchBlueprint(String),

    #[error("duplicate blueprint id {0:?}")]
    DuplicateBlueprint(String),

    #[error("unknown blueprint implementation: {0}")]
    UnknownImplementation(String),

    #[error("no {0:?} interface available")]
    NoInterface(String),

    #[error("timed out: {0}")]
    Timeout(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
