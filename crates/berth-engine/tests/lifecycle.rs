//! End-to-end lease lifecycle through the allocator.
//!
//! Every test runs against an in-memory state store with a single
//! `storage` blueprint whose strategy provisions instantly.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use berth_core::{LeaseStatus, ResourceStatus};
use berth_engine::{EngineError, ExpiryPolicy, LeaseQueue, RESOURCE_CLOSED_REASON};
use berth_state::StateStore;

use common::*;

#[tokio::test]
async fn first_lease_provisions_a_resource() {
    let h = harness(PoolStrategy::new(min_max(0, Some(2), 1)));

    let lease = h.allocate("storage").await;
    assert_eq!(lease.status, LeaseStatus::Active);

    let resource = h.resource(lease.resource_id.unwrap());
    assert_eq!(resource.status, ResourceStatus::Open);
    assert_eq!(resource.attribute("initialized"), Some(&serde_json::json!(true)));
    assert_eq!(
        lease.attribute_str("path"),
        Some(format!("/pool/{}/{}", resource.id, lease.id).as_str())
    );
}

#[tokio::test]
async fn pool_grows_then_overflows_onto_least_loaded() {
    let h = harness(PoolStrategy::new(min_max(1, Some(2), 1)));

    let a = h.allocate("storage").await;
    let b = h.allocate("storage").await;
    let r1 = a.resource_id.unwrap();
    let r2 = b.resource_id.unwrap();
    assert_ne!(r1, r2, "second lease should grow the pool");
    assert!(r1 < r2);

    // Pool is full and both resources hold one lease; the lowest id wins.
    let c = h.allocate("storage").await;
    assert_eq!(c.status, LeaseStatus::Active);
    assert_eq!(c.resource_id, Some(r1));

    let released = h.registry.release_lease(a.id).await.unwrap();
    assert_eq!(released.status, LeaseStatus::Released);
    assert_eq!(h.resource(r1).status, ResourceStatus::Open);
    assert_eq!(h.store.list_resources().unwrap().len(), 2);
}

#[tokio::test]
async fn idle_resource_above_minimum_closes_on_release() {
    let h = harness(PoolStrategy::new(min_max(0, Some(2), 1)));

    let lease = h.allocate("storage").await;
    let resource_id = lease.resource_id.unwrap();
    h.registry.release_lease(lease.id).await.unwrap();

    assert_eq!(h.resource(resource_id).status, ResourceStatus::Closed);
    assert_eq!(h.lease(lease.id).status, LeaseStatus::Released);
}

#[tokio::test]
async fn saturated_pool_tie_break_is_deterministic() {
    let h = harness(PoolStrategy::new(min_max(0, Some(3), 1)));

    let mut pool = Vec::new();
    for _ in 0..3 {
        pool.push(h.allocate("storage").await.resource_id.unwrap());
    }
    pool.sort_unstable();
    pool.dedup();
    assert_eq!(pool.len(), 3);

    // Candidates are shuffled, yet overflow always lands on the least
    // loaded resource with the lowest id.
    for expected in pool.clone() {
        let lease = h.allocate("storage").await;
        assert_eq!(lease.resource_id, Some(expected));
    }
}

#[tokio::test]
async fn allocating_a_non_pending_lease_is_a_no_op() {
    let h = harness(PoolStrategy::new(min_max(0, Some(2), 1)));

    let lease = h.allocate("storage").await;
    let resources = h.store.list_resources().unwrap();

    h.allocator.allocate(lease.id).await.unwrap();
    h.allocator.allocate(lease.id).await.unwrap();

    assert_eq!(h.store.list_resources().unwrap(), resources);
    assert_eq!(h.lease(lease.id), lease);
}

#[tokio::test]
async fn unknown_resource_type_breaks_the_lease() {
    let h = harness(PoolStrategy::new(min_max(0, Some(2), 1)));

    let lease = h.allocate("gpu").await;
    assert_eq!(lease.status, LeaseStatus::Broken);
    assert_eq!(
        lease.broken_reason.as_deref(),
        Some("no blueprint provides gpu resources")
    );
    assert!(h.store.list_resources().unwrap().is_empty());
}

#[tokio::test]
async fn exhausted_blueprint_breaks_the_lease() {
    let h = harness(PoolStrategy::new(min_max(0, Some(0), 1)));

    let lease = h.allocate("storage").await;
    assert_eq!(lease.status, LeaseStatus::Broken);
    assert_eq!(
        lease.broken_reason.as_deref(),
        Some("no blueprint can allocate a storage resource for this lease")
    );
}

#[tokio::test]
async fn custom_attribute_mismatch_breaks_the_lease() {
    let mut config = blueprint_config("bp", "storage");
    config.attributes = Some("region=eu".to_string());
    let h = harness_with(vec![(config, PoolStrategy::new(min_max(0, Some(2), 1)))]);

    let lease = {
        let mut lease = berth_core::Lease::new("storage");
        lease.set_attribute("attr_region", "us");
        h.store.insert_lease(&mut lease).unwrap();
        lease
    };
    h.allocator.allocate(lease.id).await.unwrap();
    assert_eq!(h.lease(lease.id).status, LeaseStatus::Broken);

    let matching = {
        let mut lease = berth_core::Lease::new("storage");
        lease.set_attribute("attr_region", "eu");
        h.store.insert_lease(&mut lease).unwrap();
        lease
    };
    h.allocator.allocate(matching.id).await.unwrap();
    assert_eq!(h.lease(matching.id).status, LeaseStatus::Active);
}

#[tokio::test]
async fn failed_provisioning_discards_resource_and_breaks_lease() {
    let strategy = PoolStrategy::new(min_max(0, Some(2), 1));
    strategy.fail_allocate.store(true, Ordering::SeqCst);
    let h = harness(strategy.clone());

    let lease = h.pending("storage");
    let err = h.allocator.allocate(lease.id).await.unwrap_err();
    assert!(matches!(err, EngineError::Strategy(_)));
    assert_eq!(strategy.allocations.load(Ordering::SeqCst), 1);

    assert!(h.store.list_resources().unwrap().is_empty());
    let lease = h.lease(lease.id);
    assert_eq!(lease.status, LeaseStatus::Broken);
    assert_eq!(lease.broken_reason.as_deref(), Some("quota exceeded"));

    // A later request is unaffected once the strategy recovers.
    strategy.fail_allocate.store(false, Ordering::SeqCst);
    assert_eq!(h.allocate("storage").await.status, LeaseStatus::Active);
}

#[tokio::test]
async fn resource_refusing_its_creating_lease_is_discarded() {
    let strategy = PoolStrategy::new(min_max(0, Some(2), 1));
    strategy.refuse_admission.store(true, Ordering::SeqCst);
    let h = harness(strategy.clone());

    let lease = h.pending("storage");
    let err = h.allocator.allocate(lease.id).await.unwrap_err();
    assert!(matches!(err, EngineError::ContractViolation(_)), "{err}");

    assert!(h.store.list_resources().unwrap().is_empty());
    assert_eq!(strategy.allocations.load(Ordering::SeqCst), 0);
    let lease = h.lease(lease.id);
    assert_eq!(lease.status, LeaseStatus::Broken);
    assert!(lease.broken_reason.unwrap().contains("would not lease against it"));
}

#[tokio::test]
async fn resource_left_pending_breaks_every_lease_waiting_on_it() {
    let strategy = PoolStrategy::new(min_max(0, Some(1), 2));
    strategy.leave_pending.store(true, Ordering::SeqCst);
    strategy.hold_allocation.store(true, Ordering::SeqCst);
    let h = harness(strategy.clone());

    let creator = h.pending("storage").id;
    let first = tokio::spawn({
        let allocator = h.allocator.clone();
        async move { allocator.allocate(creator).await }
    });
    let resource = h.resource_in(ResourceStatus::Pending).await;

    let queued = h.pending("storage").id;
    let second = tokio::spawn({
        let allocator = h.allocator.clone();
        async move { allocator.allocate(queued).await }
    });
    h.wait_for_lease(queued, LeaseStatus::Acquiring).await;
    assert_eq!(h.lease(queued).resource_id, Some(resource.id));

    strategy.finish_allocation();
    assert!(matches!(
        first.await.unwrap(),
        Err(EngineError::ContractViolation(_))
    ));
    assert!(second.await.unwrap().is_err());

    assert_eq!(h.resource(resource.id).status, ResourceStatus::Broken);
    assert_eq!(h.lease(creator).status, LeaseStatus::Broken);
    let queued = h.lease(queued);
    assert_eq!(queued.status, LeaseStatus::Broken);
    assert!(
        queued
            .broken_reason
            .unwrap()
            .contains("while waiting for it to open")
    );
}

#[tokio::test]
async fn resource_closed_while_provisioning_is_torn_down_again() {
    let strategy = PoolStrategy::new(min_max(0, Some(1), 1));
    strategy.hold_allocation.store(true, Ordering::SeqCst);
    let h = harness(strategy.clone());

    let lease_id = h.pending("storage").id;
    let allocation = tokio::spawn({
        let allocator = h.allocator.clone();
        async move { allocator.allocate(lease_id).await }
    });
    let resource = h.resource_in(ResourceStatus::Pending).await;

    assert!(h.registry.close_resource(resource.id).await.unwrap());
    assert_eq!(strategy.teardowns.load(Ordering::SeqCst), 1);

    strategy.finish_allocation();
    assert!(matches!(
        allocation.await.unwrap(),
        Err(EngineError::InvalidTransition(_))
    ));
    assert_eq!(strategy.teardowns.load(Ordering::SeqCst), 2);
    assert_eq!(h.resource(resource.id).status, ResourceStatus::Closed);
    let lease = h.lease(lease_id);
    assert_eq!(lease.status, LeaseStatus::Broken);
    assert_eq!(lease.broken_reason.as_deref(), Some(RESOURCE_CLOSED_REASON));
}

#[tokio::test]
async fn failed_admission_reclaims_after_releasing_the_lock() {
    let strategy = PoolStrategy::new(min_max(0, Some(2), 1));
    let h = harness(strategy.clone());
    strategy.check_lock_at_teardown(h.locks.clone());
    let resource = h.open_resource(berth_core::types::epoch_secs());
    strategy.fail_admission.store(true, Ordering::SeqCst);

    let lease = h.pending("storage");
    let err = h.allocator.allocate(lease.id).await.unwrap_err();
    assert!(matches!(err, EngineError::Strategy(_)), "{err}");

    let lease = h.lease(lease.id);
    assert_eq!(lease.status, LeaseStatus::Broken);
    assert_eq!(lease.broken_reason.as_deref(), Some("capacity check failed"));

    // Idle above the minimum, so the teardown ran, and with the lock free.
    assert_eq!(h.resource(resource.id).status, ResourceStatus::Closed);
    assert_eq!(
        *strategy.allocator_lock_free_at_teardown.lock().unwrap(),
        Some(true)
    );
}

#[tokio::test]
async fn lease_queues_onto_pending_resource() {
    let h = harness(PoolStrategy::new(min_max(0, Some(1), 2)));

    let mut pending = h.blueprint().new_resource();
    pending.status = ResourceStatus::Pending;
    h.store.insert_resource(&mut pending).unwrap();

    let opener = {
        let store = h.store.clone();
        let mut resource = pending.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            resource.status = ResourceStatus::Open;
            resource.set_attribute("path", "/pool/late");
            store.put_resource(&resource).unwrap();
        })
    };

    let lease = h.allocate("storage").await;
    opener.await.unwrap();

    assert_eq!(lease.status, LeaseStatus::Active);
    assert_eq!(lease.resource_id, Some(pending.id));
    assert_eq!(
        lease.attribute_str("path"),
        Some(format!("/pool/late/{}", lease.id).as_str())
    );
    assert_eq!(h.store.list_resources().unwrap().len(), 1);
}

#[tokio::test]
async fn close_resource_leaves_no_live_leases() {
    let h = harness(PoolStrategy::new(min_max(1, Some(1), 3)));

    let a = h.allocate("storage").await;
    let b = h.allocate("storage").await;
    let resource_id = a.resource_id.unwrap();
    assert_eq!(b.resource_id, Some(resource_id));

    // A third lease admitted but not yet acquired.
    let mut queued = h.pending("storage");
    let resource = h.resource(resource_id);
    assert!(h.blueprint().allocate_lease(&resource, &mut queued).unwrap());
    assert_eq!(queued.status, LeaseStatus::Acquiring);

    assert!(h.registry.close_resource(resource_id).await.unwrap());
    assert!(!h.registry.close_resource(resource_id).await.unwrap());

    assert_eq!(h.resource(resource_id).status, ResourceStatus::Closed);
    for lease in h.store.leases_for_resource(resource_id).unwrap() {
        assert!(lease.status.is_terminal(), "lease {} is {}", lease.id, lease.status);
    }
    assert_eq!(h.lease(a.id).status, LeaseStatus::Released);
    let queued = h.lease(queued.id);
    assert_eq!(queued.status, LeaseStatus::Broken);
    assert_eq!(queued.broken_reason.as_deref(), Some(RESOURCE_CLOSED_REASON));
}

#[tokio::test]
async fn expired_resource_closes_despite_minimum() {
    let h = harness(PoolStrategy::new(ExpiryPolicy::new(
        min_max(5, Some(5), 1),
        Duration::from_secs(3600),
    )));

    let old = h.open_resource(1);
    let lease = h.allocate("storage").await;
    assert_eq!(lease.resource_id, Some(old.id));

    h.registry.release_lease(lease.id).await.unwrap();
    assert_eq!(h.resource(old.id).status, ResourceStatus::Closed);

    // A fresh resource under the same policy stays open below the minimum.
    let lease = h.allocate("storage").await;
    let fresh = lease.resource_id.unwrap();
    assert_ne!(fresh, old.id);
    h.registry.release_lease(lease.id).await.unwrap();
    assert_eq!(h.resource(fresh).status, ResourceStatus::Open);
}

#[tokio::test]
async fn release_all_resources_closes_the_pool() {
    let h = harness(PoolStrategy::new(min_max(2, Some(2), 1)));
    let a = h.allocate("storage").await;
    let b = h.allocate("storage").await;

    assert_eq!(h.registry.release_all_resources().await.unwrap(), 2);
    for lease in [a, b] {
        assert_eq!(h.lease(lease.id).status, LeaseStatus::Released);
        assert_eq!(h.resource(lease.resource_id.unwrap()).status, ResourceStatus::Closed);
    }
    assert_eq!(h.registry.release_all_resources().await.unwrap(), 0);
}

#[tokio::test]
async fn pending_leases_resume_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("berth.redb");

    let (active, pending) = {
        let h = harness_on(
            StateStore::open(&path).unwrap(),
            vec![(blueprint_config("bp", "storage"), PoolStrategy::new(min_max(1, Some(2), 2)))],
        );
        (h.allocate("storage").await, h.pending("storage"))
    };

    let h = harness_on(
        StateStore::open(&path).unwrap(),
        vec![(blueprint_config("bp", "storage"), PoolStrategy::new(min_max(1, Some(2), 2)))],
    );
    let queue = LeaseQueue::new(h.store.clone());
    assert_eq!(queue.enqueue_pending().unwrap(), 1);
    let next = queue.next().await.unwrap();
    assert_eq!(next, pending.id);

    h.allocator.allocate(next).await.unwrap();
    let resumed = h.lease(pending.id);
    assert_eq!(resumed.status, LeaseStatus::Active);
    assert_eq!(resumed.resource_id, active.resource_id);
    assert_eq!(h.store.list_resources().unwrap().len(), 1);
}
