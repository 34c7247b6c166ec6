//! State store errors.
//!
//! redb reports failures through a different error type per operation;
//! `map_err!` flattens them into the variant for the
//! step that failed.

use std::time::Duration;

use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("cannot open state database: {0}")]
    Open(String),

    #[error("state transaction failed: {0}")]
    Transaction(String),

    #[error("state table unavailable: {0}")]
    Table(String),

    #[error("state read failed: {0}")]
    Read(String),

    #[error("state write failed: {0}")]
    Write(String),

    #[error("cannot encode record: {0}")]
    Serialize(String),

    #[error("corrupt record: {0}")]
    Deserialize(String),

    #[error("timed out after {waited:?} waiting for lock {name:?}")]
    LockTimeout { name: String, waited: Duration },
}
