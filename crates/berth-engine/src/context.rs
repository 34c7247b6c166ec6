//! Allocation context: the capacity facts an admission decision sees.

use berth_core::ResourceId;
use berth_state::CapacitySnapshot;

/// Point-in-time view of one blueprint's pool, centred on the resource
/// being decided about.
///
/// Built from a [`CapacitySnapshot`] read inside the same transaction that
/// will record the decision, so it is never stale within that scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationContext {
    snapshot: CapacitySnapshot,
    resource_id: ResourceId,
    now: u64,
}

impl AllocationContext {
    pub fn new(snapshot: CapacitySnapshot, resource_id: ResourceId, now: u64) -> Self {
        Self {
            snapshot,
            resource_id,
            now,
        }
    }

    /// Unix seconds at which the snapshot was taken.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Capacity-counting resources in the blueprint's pool.
    pub fn open_resources(&self) -> u32 {
        self.snapshot.open_resources
    }

    /// Load on the resource this context was computed for.
    pub fn lease_count(&self) -> u32 {
        self.lease_count_of(self.resource_id)
    }

    pub fn lease_count_of(&self, resource_id: ResourceId) -> u32 {
        self.snapshot
            .lease_counts
            .get(&resource_id)
            .copied()
            .unwrap_or(0)
    }

    /// The pool resource with the fewest leases, lowest id first on ties.
    pub fn least_loaded_resource(&self) -> Option<ResourceId> {
        self.snapshot
            .lease_counts
            .iter()
            .min_by_key(|(id, count)| (**count, **id))
            .map(|(id, _)| *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(counts: &[(ResourceId, u32)], current: ResourceId) -> AllocationContext {
        let snapshot = CapacitySnapshot {
            open_resources: counts.len() as u32,
            lease_counts: counts.iter().copied().collect(),
        };
        AllocationContext::new(snapshot, current, 1000)
    }

    #[test]
    fn counts_for_current_and_other_resources() {
        let ctx = context(&[(1, 2), (2, 0)], 1);
        assert_eq!(ctx.open_resources(), 2);
        assert_eq!(ctx.lease_count(), 2);
        assert_eq!(ctx.lease_count_of(2), 0);
        assert_eq!(ctx.lease_count_of(9), 0);
    }

    #[test]
    fn least_loaded_breaks_ties_by_lowest_id() {
        assert_eq!(context(&[(3, 1), (1, 1), (2, 1)], 3).least_loaded_resource(), Some(1));
        assert_eq!(context(&[(1, 2), (2, 1), (3, 1)], 1).least_loaded_resource(), Some(2));
        assert_eq!(context(&[], 1).least_loaded_resource(), None);
    }
}
