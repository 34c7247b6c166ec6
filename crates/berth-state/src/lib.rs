//! berth-state: embedded state store for berth.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for resources, leases and log entries, plus the named advisory
//! locks the allocator serializes its decisions on.
//!
//! # Architecture
//!
//! All records are JSON-serialized into redb's `&[u8]` value columns and
//! keyed by numeric identities drawn from the `sequences` table.
//!
//! redb admits a single write transaction at a time. A [`StateTxn`] is
//! therefore the row-lock scope used for lease admission and release:
//! everything read through it is consistent with what it writes, and it
//! aborts when dropped without `commit()`.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| $crate::error::StateError::$variant(e.to_string())
    };
}

pub mod error;
pub mod lock;
pub mod store;
pub mod tables;
pub mod txn;

pub use error::{StateError, StateResult};
pub use lock::{LocalLockService, LockGuard, LockService};
pub use store::{LogFilter, StateStore};
pub use txn::{CapacitySnapshot, StateTxn};
