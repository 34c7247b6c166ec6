//! Resource and lease status machines.
//!
//! ```text
//! Resource: Allocating → Pending → Open → Closing → Closed
//!           (any non-terminal) → Broken | Destroyed
//!
//! Lease:    Pending → Acquiring → Active → Released
//!           (any non-terminal) → Broken
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Row created under the allocation lock, not yet leasable by others.
    Allocating,
    /// Being provisioned; leases may queue onto it.
    Pending,
    Open,
    Closing,
    Closed,
    /// Provisioning contract violation.
    Broken,
    /// The strategy found its backing state gone.
    Destroyed,
}

impl ResourceStatus {
    pub const ALL: [ResourceStatus; 7] = [
        ResourceStatus::Allocating,
        ResourceStatus::Pending,
        ResourceStatus::Open,
        ResourceStatus::Closing,
        ResourceStatus::Closed,
        ResourceStatus::Broken,
        ResourceStatus::Destroyed,
    ];

    /// Statuses that count toward a blueprint's pool size.
    pub const CAPACITY: [ResourceStatus; 3] = [
        ResourceStatus::Allocating,
        ResourceStatus::Pending,
        ResourceStatus::Open,
    ];

    pub fn counts_toward_capacity(self) -> bool {
        Self::CAPACITY.contains(&self)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ResourceStatus::Closed | ResourceStatus::Broken | ResourceStatus::Destroyed
        )
    }

    pub fn can_transition_to(self, next: ResourceStatus) -> bool {
        use ResourceStatus::*;

        if self.is_terminal() {
            return false;
        }
        match next {
            Broken | Destroyed => true,
            Pending => self == Allocating,
            Open => self == Pending || self == Allocating,
            Closing => matches!(self, Allocating | Pending | Open),
            Closed => self == Closing,
            Allocating => false,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ResourceStatus::Allocating => "Allocating",
            ResourceStatus::Pending => "Pending",
            ResourceStatus::Open => "Open",
            ResourceStatus::Closing => "Closing",
            ResourceStatus::Closed => "Closed",
            ResourceStatus::Broken => "Broken",
            ResourceStatus::Destroyed => "Destroyed",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle status of a lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseStatus {
    Pending,
    Acquiring,
    Active,
    Released,
    Broken,
}

impl LeaseStatus {
    pub const ALL: [LeaseStatus; 5] = [
        LeaseStatus::Pending,
        LeaseStatus::Acquiring,
        LeaseStatus::Active,
        LeaseStatus::Released,
        LeaseStatus::Broken,
    ];

    /// Statuses that count toward a resource's lease load.
    pub const LOAD: [LeaseStatus; 3] = [
        LeaseStatus::Pending,
        LeaseStatus::Acquiring,
        LeaseStatus::Active,
    ];

    pub fn counts_toward_load(self) -> bool {
        Self::LOAD.contains(&self)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LeaseStatus::Released | LeaseStatus::Broken)
    }

    pub fn can_transition_to(self, next: LeaseStatus) -> bool {
        use LeaseStatus::*;

        match (self, next) {
            (Pending, Acquiring) | (Acquiring, Active) | (Active, Released) => true,
            (from, Broken) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LeaseStatus::Pending => "Pending",
            LeaseStatus::Acquiring => "Acquiring",
            LeaseStatus::Active => "Active",
            LeaseStatus::Released => "Released",
            LeaseStatus::Broken => "Broken",
        }
    }
}

impl fmt::Display for LeaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
