//! Write transactions and the record helpers shared by read paths.

use std::collections::BTreeMap;

use redb::{Database, ReadableTable, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;

use berth_core::{Lease, LeaseId, LeaseStatus, LogEntry, Resource, ResourceId};

use crate::error::StateResult;
use crate::tables::*;

/// Point-in-time capacity facts for one blueprint's pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapacitySnapshot {
    /// Resources of the blueprint in a capacity-counting status.
    pub open_resources: u32,
    /// Non-terminal, non-transient lease count per pool resource.
    /// Every pool resource has an entry, including idle ones.
    pub lease_counts: BTreeMap<ResourceId, u32>,
}

pub(crate) fn encode<T: Serialize>(value: &T) -> StateResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(map_err!(Serialize))
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

pub(crate) fn get_record<T, R>(table: &R, id: u64) -> StateResult<Option<T>>
where
    T: DeserializeOwned,
    R: ReadableTable<u64, &'static [u8]>,
{
    match table.get(id).map_err(map_err!(Read))? {
        Some(guard) => Ok(Some(decode(guard.value())?)),
        None => Ok(None),
    }
}

pub(crate) fn scan_records<T, R>(table: &R) -> StateResult<Vec<T>>
where
    T: DeserializeOwned,
    R: ReadableTable<u64, &'static [u8]>,
{
    let mut results = Vec::new();
    for entry in table.iter().map_err(map_err!(Read))? {
        let (_, value) = entry.map_err(map_err!(Read))?;
        results.push(decode(value.value())?);
    }
    Ok(results)
}

pub(crate) fn capacity_snapshot<R, L>(
    resources: &R,
    leases: &L,
    blueprint_id: &str,
) -> StateResult<CapacitySnapshot>
where
    R: ReadableTable<u64, &'static [u8]>,
    L: ReadableTable<u64, &'static [u8]>,
{
    let mut lease_counts: BTreeMap<ResourceId, u32> = scan_records::<Resource, _>(resources)?
        .into_iter()
        .filter(|r| r.blueprint_id == blueprint_id && r.status.counts_toward_capacity())
        .map(|r| (r.id, 0))
        .collect();

    for lease in scan_records::<Lease, _>(leases)? {
        if !lease.counts_toward_load() {
            continue;
        }
        if let Some(count) = lease.resource_id.and_then(|id| lease_counts.get_mut(&id)) {
            *count += 1;
        }
    }

    Ok(CapacitySnapshot {
        open_resources: lease_counts.len() as u32,
        lease_counts,
    })
}

/// An exclusive write transaction over the state store.
///
/// Dropping a `StateTxn` without calling [`StateTxn::commit`] aborts it.
/// redb serializes write transactions, so never hold one across an
/// `.await` or open a second one on the same thread while it is alive.
pub struct StateTxn {
    txn: WriteTransaction,
}

impl StateTxn {
    pub(crate) fn begin(db: &Database) -> StateResult<Self> {
        let txn = db.begin_write().map_err(map_err!(Transaction))?;
        Ok(Self { txn })
    }

    pub fn commit(self) -> StateResult<()> {
        self.txn.commit().map_err(map_err!(Transaction))
    }

    fn next_id(&self, sequence: &str) -> StateResult<u64> {
        let mut table = self.txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
        let current = table
            .get(sequence)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value())
            .unwrap_or(0);
        let next = current + 1;
        table.insert(sequence, next).map_err(map_err!(Write))?;
        Ok(next)
    }

    fn put_record<T: Serialize>(
        &self,
        definition: redb::TableDefinition<'static, u64, &'static [u8]>,
        id: u64,
        value: &T,
    ) -> StateResult<()> {
        let value = encode(value)?;
        let mut table = self.txn.open_table(definition).map_err(map_err!(Table))?;
        table
            .insert(id, value.as_slice())
            .map_err(map_err!(Write))?;
        Ok(())
    }

    // ── Resources ──────────────────────────────────────────────────

    pub fn get_resource(&self, id: ResourceId) -> StateResult<Option<Resource>> {
        let table = self.txn.open_table(RESOURCES).map_err(map_err!(Table))?;
        get_record(&table, id)
    }

    /// Insert a new resource, assigning its id.
    pub fn insert_resource(&self, resource: &mut Resource) -> StateResult<ResourceId> {
        resource.id = self.next_id(RESOURCE_SEQUENCE)?;
        self.put_record(RESOURCES, resource.id, resource)?;
        Ok(resource.id)
    }

    pub fn put_resource(&self, resource: &Resource) -> StateResult<()> {
        self.put_record(RESOURCES, resource.id, resource)
    }

    /// Delete a resource row. Returns true if it existed.
    pub fn delete_resource(&self, id: ResourceId) -> StateResult<bool> {
        let mut table = self.txn.open_table(RESOURCES).map_err(map_err!(Table))?;
        let existed = table.remove(id).map_err(map_err!(Write))?.is_some();
        Ok(existed)
    }

    pub fn resources(&self) -> StateResult<Vec<Resource>> {
        let table = self.txn.open_table(RESOURCES).map_err(map_err!(Table))?;
        scan_records(&table)
    }

    // ── Leases ─────────────────────────────────────────────────────

    pub fn get_lease(&self, id: LeaseId) -> StateResult<Option<Lease>> {
        let table = self.txn.open_table(LEASES).map_err(map_err!(Table))?;
        get_record(&table, id)
    }

    /// Insert a new lease, assigning its id.
    pub fn insert_lease(&self, lease: &mut Lease) -> StateResult<LeaseId> {
        lease.id = self.next_id(LEASE_SEQUENCE)?;
        self.put_record(LEASES, lease.id, lease)?;
        Ok(lease.id)
    }

    pub fn put_lease(&self, lease: &Lease) -> StateResult<()> {
        self.put_record(LEASES, lease.id, lease)
    }

    pub fn leases(&self) -> StateResult<Vec<Lease>> {
        let table = self.txn.open_table(LEASES).map_err(map_err!(Table))?;
        scan_records(&table)
    }

    /// Leases bound to a resource whose status is one of `statuses`.
    pub fn leases_for_resource(
        &self,
        resource_id: ResourceId,
        statuses: &[LeaseStatus],
    ) -> StateResult<Vec<Lease>> {
        Ok(self
            .leases()?
            .into_iter()
            .filter(|l| l.resource_id == Some(resource_id) && statuses.contains(&l.status))
            .collect())
    }

    // ── Aggregates ─────────────────────────────────────────────────

    pub fn capacity_snapshot(&self, blueprint_id: &str) -> StateResult<CapacitySnapshot> {
        let resources = self.txn.open_table(RESOURCES).map_err(map_err!(Table))?;
        let leases = self.txn.open_table(LEASES).map_err(map_err!(Table))?;
        capacity_snapshot(&resources, &leases, blueprint_id)
    }

    // ── Logs ───────────────────────────────────────────────────────

    pub fn insert_log(&self, entry: &mut LogEntry) -> StateResult<u64> {
        entry.id = self.next_id(LOG_SEQUENCE)?;
        self.put_record(LOGS, entry.id, entry)?;
        Ok(entry.id)
    }
}
