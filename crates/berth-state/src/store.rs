//! StateStore: redb-backed state persistence for berth.
//!
//! Provides typed reads over resources, leases and logs, single-record
//! writes that each run in their own transaction, and [`StateStore::begin`]
//! for multi-record work that must be atomic. The store supports both
//! on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadTransaction, ReadableDatabase};
use tracing::debug;

use berth_core::{
    Lease, LeaseId, LeaseStatus, LogEntry, Resource, ResourceId, ResourceStatus,
};

use crate::error::StateResult;
use crate::tables::*;
use crate::txn::{CapacitySnapshot, StateTxn, capacity_snapshot, get_record, scan_records};

/// Filter for [`StateStore::list_logs`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFilter<'a> {
    pub blueprint_id: Option<&'a str>,
    pub resource_id: Option<ResourceId>,
    pub lease_id: Option<LeaseId>,
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore").finish_non_exhaustive()
    }
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(RESOURCES).map_err(map_err!(Table))?;
        txn.open_table(LEASES).map_err(map_err!(Table))?;
        txn.open_table(LOGS).map_err(map_err!(Table))?;
        txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Begin an exclusive write transaction.
    pub fn begin(&self) -> StateResult<StateTxn> {
        StateTxn::begin(&self.db)
    }

    fn read<T>(&self, f: impl FnOnce(&ReadTransaction) -> StateResult<T>) -> StateResult<T> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        f(&txn)
    }

    // ── Resources ──────────────────────────────────────────────────

    pub fn get_resource(&self, id: ResourceId) -> StateResult<Option<Resource>> {
        self.read(|txn| {
            let table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
            get_record(&table, id)
        })
    }

    pub fn list_resources(&self) -> StateResult<Vec<Resource>> {
        self.read(|txn| {
            let table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
            scan_records(&table)
        })
    }

    /// Resources of a type whose status is one of `statuses`.
    pub fn resources_with_status(
        &self,
        resource_type: Option<&str>,
        statuses: &[ResourceStatus],
    ) -> StateResult<Vec<Resource>> {
        Ok(self
            .list_resources()?
            .into_iter()
            .filter(|r| resource_type.is_none_or(|t| r.resource_type == t))
            .filter(|r| statuses.contains(&r.status))
            .collect())
    }

    /// Insert a new resource in its own transaction, assigning its id.
    pub fn insert_resource(&self, resource: &mut Resource) -> StateResult<ResourceId> {
        let txn = self.begin()?;
        let id = txn.insert_resource(resource)?;
        txn.commit()?;
        debug!(resource = id, status = %resource.status, "resource stored");
        Ok(id)
    }

    pub fn put_resource(&self, resource: &Resource) -> StateResult<()> {
        let txn = self.begin()?;
        txn.put_resource(resource)?;
        txn.commit()
    }

    /// Delete a resource row. Returns true if it existed.
    pub fn delete_resource(&self, id: ResourceId) -> StateResult<bool> {
        let txn = self.begin()?;
        let existed = txn.delete_resource(id)?;
        txn.commit()?;
        debug!(resource = id, existed, "resource deleted");
        Ok(existed)
    }

    // ── Leases ─────────────────────────────────────────────────────

    pub fn get_lease(&self, id: LeaseId) -> StateResult<Option<Lease>> {
        self.read(|txn| {
            let table = txn.open_table(LEASES).map_err(map_err!(Table))?;
            get_record(&table, id)
        })
    }

    pub fn list_leases(&self) -> StateResult<Vec<Lease>> {
        self.read(|txn| {
            let table = txn.open_table(LEASES).map_err(map_err!(Table))?;
            scan_records(&table)
        })
    }

    pub fn leases_with_status(&self, statuses: &[LeaseStatus]) -> StateResult<Vec<Lease>> {
        Ok(self
            .list_leases()?
            .into_iter()
            .filter(|l| statuses.contains(&l.status))
            .collect())
    }

    pub fn leases_for_resource(&self, resource_id: ResourceId) -> StateResult<Vec<Lease>> {
        Ok(self
            .list_leases()?
            .into_iter()
            .filter(|l| l.resource_id == Some(resource_id))
            .collect())
    }

    /// Insert a new lease in its own transaction, assigning its id.
    pub fn insert_lease(&self, lease: &mut Lease) -> StateResult<LeaseId> {
        let txn = self.begin()?;
        let id = txn.insert_lease(lease)?;
        txn.commit()?;
        debug!(lease = id, resource_type = %lease.resource_type, "lease stored");
        Ok(id)
    }

    pub fn put_lease(&self, lease: &Lease) -> StateResult<()> {
        let txn = self.begin()?;
        txn.put_lease(lease)?;
        txn.commit()
    }

    // ── Aggregates ─────────────────────────────────────────────────

    /// Capacity facts for one blueprint, read from a consistent snapshot.
    pub fn capacity_snapshot(&self, blueprint_id: &str) -> StateResult<CapacitySnapshot> {
        self.read(|txn| {
            let resources = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
            let leases = txn.open_table(LEASES).map_err(map_err!(Table))?;
            capacity_snapshot(&resources, &leases, blueprint_id)
        })
    }

    // ── Logs ───────────────────────────────────────────────────────

    pub fn append_log(&self, entry: &mut LogEntry) -> StateResult<u64> {
        let txn = self.begin()?;
        let id = txn.insert_log(entry)?;
        txn.commit()?;
        Ok(id)
    }

    /// Log entries matching every set field of `filter`, oldest first,
    /// keeping at most the `limit` most recent.
    pub fn list_logs(&self, filter: LogFilter<'_>, limit: usize) -> StateResult<Vec<LogEntry>> {
        let entries: Vec<LogEntry> = self.read(|txn| {
            let table = txn.open_table(LOGS).map_err(map_err!(Table))?;
            scan_records(&table)
        })?;

        let mut matching: Vec<LogEntry> = entries
            .into_iter()
            .filter(|e| {
                filter
                    .blueprint_id
                    .is_none_or(|b| e.blueprint_id.as_deref() == Some(b))
                    && filter.resource_id.is_none_or(|r| e.resource_id == Some(r))
                    && filter.lease_id.is_none_or(|l| e.lease_id == Some(l))
            })
            .collect();

        if matching.len() > limit {
            matching.drain(..matching.len() - limit);
        }
        Ok(matching)
    }
}
