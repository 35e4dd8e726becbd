//! Device inventory bootstrap
//!
//! The registry does not discover hardware itself; an inventory provider
//! (a fleet daemon, a CLI, or a static count) supplies the initial device
//! list at process start. Cross-process arbitration stays with the external
//! device daemon.

use super::types::DeviceDescriptor;

/// Environment variable overriding the static device count
const DEVICE_COUNT_ENV: &str = "AOTFORGE_DEVICE_COUNT";

/// Source of the initial device inventory
pub trait DeviceInventoryProvider: Send + Sync {
    /// Enumerate the physical devices visible to this process
    fn devices(&self) -> Vec<DeviceDescriptor>;
}

/// Fixed-size inventory with uniform capacity per device
#[derive(Debug, Clone)]
pub struct StaticInventory {
    count: usize,
    capacity_units: u32,
}

impl StaticInventory {
    pub fn new(count: usize) -> Self {
        StaticInventory {
            count,
            capacity_units: 1,
        }
    }

    /// Set the capacity units reported for every device
    pub fn with_capacity_units(mut self, capacity_units: u32) -> Self {
        self.capacity_units = capacity_units;
        self
    }
}

impl DeviceInventoryProvider for StaticInventory {
    fn devices(&self) -> Vec<DeviceDescriptor> {
        (0..self.count)
            .map(|id| DeviceDescriptor::new(id as u32, self.capacity_units))
            .collect()
    }
}

/// Inventory sized from `AOTFORGE_DEVICE_COUNT`, defaulting to one device
#[derive(Debug, Clone, Default)]
pub struct EnvInventory;

impl EnvInventory {
    pub fn new() -> Self {
        EnvInventory
    }
}

impl DeviceInventoryProvider for EnvInventory {
    fn devices(&self) -> Vec<DeviceDescriptor> {
        let count = std::env::var(DEVICE_COUNT_ENV)
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(1);
        StaticInventory::new(count).devices()
    }
}
