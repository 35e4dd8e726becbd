//! Core types for device inventory and attachment tracking

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier for one physical accelerator device
pub type DeviceId = u32;

/// Identifier for a compiled session (assigned at session creation)
pub type SessionId = u64;

/// Ownership state of one device in the inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    /// Not owned by any session
    Free,
    /// Claimed by a reservation, not yet attached to a session
    Reserved,
    /// Attached to exactly one session
    Attached,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceState::Free => write!(f, "free"),
            DeviceState::Reserved => write!(f, "reserved"),
            DeviceState::Attached => write!(f, "attached"),
        }
    }
}

/// Bootstrap description of one physical device
///
/// Supplied by a [`DeviceInventoryProvider`](super::DeviceInventoryProvider)
/// at registry construction; treated as read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: DeviceId,
    /// Physical capacity units (e.g., cores per device)
    pub capacity_units: u32,
}

impl DeviceDescriptor {
    pub fn new(id: DeviceId, capacity_units: u32) -> Self {
        DeviceDescriptor { id, capacity_units }
    }
}

/// An ordered group of devices reserved together as one atomic unit
///
/// A model requiring N devices gets them as one replica group; the set is
/// always attached and released as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSet {
    ids: Vec<DeviceId>,
}

impl DeviceSet {
    pub(crate) fn new(ids: Vec<DeviceId>) -> Self {
        DeviceSet { ids }
    }

    pub fn ids(&self) -> &[DeviceId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.ids.contains(&id)
    }

    /// True if the two sets share any device
    pub fn overlaps(&self, other: &DeviceSet) -> bool {
        self.ids.iter().any(|id| other.contains(*id))
    }
}

impl fmt::Display for DeviceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.ids.iter().map(|id| id.to_string()).collect();
        write!(f, "{{{}}}", ids.join(","))
    }
}

/// Read-only view of one device for observability tooling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub id: DeviceId,
    pub capacity_units: u32,
    pub state: DeviceState,
    pub owner: Option<SessionId>,
}

/// Reservation/release counters for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationStats {
    /// Total successful reservations
    pub total_reservations: usize,
    /// Total release operations that freed at least one device
    pub total_releases: usize,
    /// Peak devices simultaneously out of the Free state
    pub peak_claimed: usize,
    /// Devices currently out of the Free state
    pub current_claimed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_state_display() {
        assert_eq!(DeviceState::Free.to_string(), "free");
        assert_eq!(DeviceState::Reserved.to_string(), "reserved");
        assert_eq!(DeviceState::Attached.to_string(), "attached");
    }

    #[test]
    fn test_device_set_membership() {
        let a = DeviceSet::new(vec![0, 1]);
        let b = DeviceSet::new(vec![2, 3]);
        let c = DeviceSet::new(vec![1, 2]);

        assert_eq!(a.len(), 2);
        assert!(a.contains(0));
        assert!(!a.contains(2));
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(b.overlaps(&c));
    }

    #[test]
    fn test_device_set_display() {
        let set = DeviceSet::new(vec![0, 1, 2]);
        assert_eq!(set.to_string(), "{0,1,2}");
    }
}
