//! redb table definitions for the berth state store.
//!
//! Record tables use `u64` keys and `&[u8]` values (JSON-serialized types
//! from `berth-core`).

use redb::TableDefinition;

/// Resources keyed by resource id.
pub const RESOURCES: TableDefinition<u64, &[u8]> = TableDefinition::new("resources");

/// Leases keyed by lease id.
pub const LEASES: TableDefinition<u64, &[u8]> = TableDefinition::new("leases");

/// Log entries keyed by log id (insertion order).
pub const LOGS: TableDefinition<u64, &[u8]> = TableDefinition::new("logs");

/// Last issued id per record kind.
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

pub const RESOURCE_SEQUENCE: &str = "resources";
pub const LEASE_SEQUENCE: &str = "leases";
pub const LOG_SEQUENCE: &str = "logs";
