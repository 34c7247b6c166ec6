//! Persisted record types for the berth state store.
//!
//! These types are JSON-serialized into redb value columns by
//! `berth-state`, keyed by their numeric identities.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::status::{LeaseStatus, ResourceStatus};

/// Unique identifier for a resource. Allocated from a persisted sequence.
pub type ResourceId = u64;

/// Unique identifier for a lease. Allocated from a persisted sequence.
pub type LeaseId = u64;

/// Identifier of a configured blueprint instance.
pub type BlueprintId = String;

/// Open-ended key/value attribute bag.
pub type Attributes = BTreeMap<String, Value>;

// ── Resource ──────────────────────────────────────────────────────

/// A provisioned (or provisionable) capacity unit owned by a blueprint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub blueprint_id: BlueprintId,
    /// Free-form resource type tag, e.g. `host` or `working-copy`.
    pub resource_type: String,
    pub name: String,
    pub status: ResourceStatus,
    #[serde(default)]
    pub attributes: Attributes,
    /// Unix timestamp (seconds) when the row was created.
    pub created_at: u64,
}

impl Resource {
    /// Build a fresh, unsaved resource row. The id is assigned on insert.
    pub fn new(blueprint_id: &str, resource_type: &str, name: &str) -> Self {
        Self {
            id: 0,
            blueprint_id: blueprint_id.to_string(),
            resource_type: resource_type.to_string(),
            name: name.to_string(),
            status: ResourceStatus::Allocating,
            attributes: Attributes::new(),
            created_at: epoch_secs(),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn set_attribute(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// Seconds elapsed since creation, as seen at `now`.
    pub fn age_at(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at)
    }
}

// ── Lease ─────────────────────────────────────────────────────────

/// A claim on capacity: a pending request, or a bound handle once acquired.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lease {
    pub id: LeaseId,
    /// Requested resource type.
    pub resource_type: String,
    /// Bound resource. Immutable once set.
    pub resource_id: Option<ResourceId>,
    pub status: LeaseStatus,
    /// Who requested the lease, if known.
    pub owner: Option<String>,
    /// Requirements while pending, provisioning results once active.
    #[serde(default)]
    pub attributes: Attributes,
    /// Set only when the lease is broken.
    pub broken_reason: Option<String>,
    /// Transient leases are ignored by capacity accounting.
    #[serde(default)]
    pub transient: bool,
    pub created_at: u64,
}

impl Lease {
    /// Build a fresh, unsaved pending lease for a resource type.
    pub fn new(resource_type: &str) -> Self {
        Self {
            id: 0,
            resource_type: resource_type.to_string(),
            resource_id: None,
            status: LeaseStatus::Pending,
            owner: None,
            attributes: Attributes::new(),
            broken_reason: None,
            transient: false,
            created_at: epoch_secs(),
        }
    }

    pub fn with_owner(mut self, owner: &str) -> Self {
        self.owner = Some(owner.to_string());
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn set_attribute(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// Divert the lease to `Broken`, recording a human-readable reason.
    pub fn mark_broken(&mut self, reason: impl Into<String>) {
        self.status = LeaseStatus::Broken;
        self.broken_reason = Some(reason.into());
    }

    /// Whether this lease contributes to a resource's load.
    pub fn counts_toward_load(&self) -> bool {
        !self.transient && self.status.counts_toward_load()
    }
}

// ── Log ───────────────────────────────────────────────────────────

/// A persisted log line attributed to a blueprint, resource and/or lease.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub id: u64,
    /// Unix timestamp (seconds).
    pub epoch: u64,
    pub blueprint_id: Option<BlueprintId>,
    pub resource_id: Option<ResourceId>,
    pub lease_id: Option<LeaseId>,
    pub message: String,
}

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
