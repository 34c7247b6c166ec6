//! Pool policies: reusable capacity and reclamation decisions.
//!
//! A policy answers three questions for a blueprint:
//!
//! - can the pool grow by another resource?
//! - should this lease be admitted onto this resource?
//! - should this idle resource be closed?
//!
//! [`MinMaxPolicy`] keeps a warm pool between `min_count` and `max_count`
//! resources and spreads leases evenly once the pool is saturated.
//! [`ExpiryPolicy`] layers an age limit on top of it. Strategies hold a
//! policy built by [`policy_from_config`] and delegate to it.

use std::fmt::Debug;
use std::time::Duration;

use tracing::debug;

use berth_core::Resource;
use berth_core::config::PolicyConfig;

use crate::context::AllocationContext;

/// Admission and reclamation decisions for one blueprint's pool.
///
/// These run while the admission transaction is open: they must be cheap
/// and must not touch the state store.
pub trait PoolPolicy: Send + Sync + Debug {
    /// Whether another resource may be created given the current pool of
    /// capacity-counting resources.
    fn can_allocate_more_resources(&self, pool: &[Resource], now: u64) -> bool;

    fn should_allocate_lease(&self, context: &AllocationContext, resource: &Resource) -> bool;

    /// Asked only for resources that currently hold no leases.
    fn should_close_unleased_resource(
        &self,
        context: &AllocationContext,
        resource: &Resource,
    ) -> bool;
}

/// Build the policy described by a blueprint's `[blueprint.policy]` table.
pub fn policy_from_config(config: Option<&PolicyConfig>) -> anyhow::Result<Box<dyn PoolPolicy>> {
    let Some(config) = config else {
        return Ok(Box::new(MinMaxPolicy::default()));
    };

    let min_max = MinMaxPolicy {
        min_count: config.min_count.unwrap_or(0),
        max_count: config.max_count,
        leases_per_resource: config.leases_per_resource.unwrap_or(1),
    };

    Ok(match config.expiry()? {
        Some(expiry) => Box::new(ExpiryPolicy::new(min_max, expiry)),
        None => Box::new(min_max),
    })
}

// ── Min/Max ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinMaxPolicy {
    /// Idle resources are kept while the pool is at or below this size.
    pub min_count: u32,
    /// Hard pool size limit. `None` means unbounded.
    pub max_count: Option<u32>,
    /// Soft per-resource lease cap, exceeded only once the pool is full.
    pub leases_per_resource: u32,
}

impl Default for MinMaxPolicy {
    fn default() -> Self {
        Self {
            min_count: 0,
            max_count: None,
            leases_per_resource: 1,
        }
    }
}

impl PoolPolicy for MinMaxPolicy {
    fn can_allocate_more_resources(&self, pool: &[Resource], _now: u64) -> bool {
        let Some(max) = self.max_count else {
            debug!(pool = pool.len(), "no maximum resource limit");
            return true;
        };
        let permitted = (pool.len() as u64) < u64::from(max);
        debug!(pool = pool.len(), max, permitted, "checked pool size");
        permitted
    }

    fn should_allocate_lease(&self, context: &AllocationContext, resource: &Resource) -> bool {
        let leases = context.lease_count();
        if leases < self.leases_per_resource {
            debug!(
                resource = resource.id,
                leases,
                limit = self.leases_per_resource,
                "resource has room for another lease"
            );
            return true;
        }

        // At the soft cap. Prefer growing the pool while it may still grow.
        match self.max_count {
            None => {
                debug!(resource = resource.id, leases, "resource full, pool unbounded");
                return false;
            }
            Some(max) if context.open_resources() < max => {
                debug!(
                    resource = resource.id,
                    leases,
                    open = context.open_resources(),
                    max,
                    "resource full, pool can still grow"
                );
                return false;
            }
            Some(_) => {}
        }

        // Pool saturated: overflow goes to the least loaded resource only.
        let chosen = context.least_loaded_resource();
        debug!(resource = resource.id, ?chosen, "pool saturated, least loaded wins");
        chosen == Some(resource.id)
    }

    fn should_close_unleased_resource(
        &self,
        context: &AllocationContext,
        _resource: &Resource,
    ) -> bool {
        context.open_resources() > self.min_count
    }
}

// ── Min/Max/Expiry ─────────────────────────────────────────────────

/// [`MinMaxPolicy`] plus a maximum resource age.
///
/// Expired resources stop counting toward the pool limit so replacements
/// can be created early. They refuse further leases once they hold any,
/// and are closed as soon as they go idle regardless of `min_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    inner: MinMaxPolicy,
    expiry: Duration,
}

impl ExpiryPolicy {
    pub fn new(inner: MinMaxPolicy, expiry: Duration) -> Self {
        Self { inner, expiry }
    }

    pub fn is_expired(&self, resource: &Resource, now: u64) -> bool {
        resource.age_at(now) > self.expiry.as_secs()
    }
}

impl PoolPolicy for ExpiryPolicy {
    fn can_allocate_more_resources(&self, pool: &[Resource], now: u64) -> bool {
        let Some(max) = self.inner.max_count else {
            return true;
        };
        let live = pool.iter().filter(|r| !self.is_expired(r, now)).count();
        let permitted = (live as u64) < u64::from(max);
        debug!(
            pool = pool.len(),
            live,
            max,
            permitted,
            "checked pool size excluding expired resources"
        );
        permitted
    }

    fn should_allocate_lease(&self, context: &AllocationContext, resource: &Resource) -> bool {
        // An idle expired resource takes one lease so that its release
        // later observes it empty and closes it.
        if context.lease_count() == 0 {
            return self.inner.should_allocate_lease(context, resource);
        }
        if self.is_expired(resource, context.now()) {
            debug!(resource = resource.id, "resource expired, refusing lease");
            return false;
        }
        self.inner.should_allocate_lease(context, resource)
    }

    fn should_close_unleased_resource(
        &self,
        context: &AllocationContext,
        resource: &Resource,
    ) -> bool {
        if self.is_expired(resource, context.now()) {
            debug!(resource = resource.id, "resource expired, closing");
            return true;
        }
        self.inner.should_close_unleased_resource(context, resource)
    }
}
