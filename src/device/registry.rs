//! Process-wide device attachment registry
//!
//! The registry is the single mutation point for shared device state.
//! Reservation, attachment, and release all go through one internal mutex,
//! preserving the invariant that no two sessions ever hold overlapping
//! devices. It only arbitrates within its own process; cross-process
//! contention is handled by the external device daemon.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::error::{AotForgeError, ForgeResult};

use super::inventory::DeviceInventoryProvider;
use super::types::{
    DeviceDescriptor, DeviceId, DeviceSet, DeviceSnapshot, DeviceState, ReservationStats,
    SessionId,
};

#[derive(Debug)]
struct DeviceSlot {
    descriptor: DeviceDescriptor,
    state: DeviceState,
    owner: Option<SessionId>,
}

#[derive(Debug)]
struct RegistryInner {
    // Ordered by device id so contiguous runs are well defined
    devices: Vec<DeviceSlot>,
    stats: ReservationStats,
}

/// Process-wide inventory of devices and their owning sessions
#[derive(Debug)]
pub struct DeviceRegistry {
    inner: Mutex<RegistryInner>,
}

impl DeviceRegistry {
    /// Build a registry from an inventory provider
    pub fn new(provider: &dyn DeviceInventoryProvider) -> Self {
        let mut descriptors = provider.devices();
        descriptors.sort_by_key(|d| d.id);

        let devices = descriptors
            .into_iter()
            .map(|descriptor| DeviceSlot {
                descriptor,
                state: DeviceState::Free,
                owner: None,
            })
            .collect::<Vec<_>>();

        info!(device_count = devices.len(), "device registry initialized");

        DeviceRegistry {
            inner: Mutex::new(RegistryInner {
                devices,
                stats: ReservationStats::default(),
            }),
        }
    }

    /// Atomically reserve `count` contiguous free devices
    ///
    /// Fails with `InsufficientDevices` if fewer than `count` devices are
    /// free anywhere, or if no contiguous free run of that length exists.
    /// Never returns a partial reservation; on failure the inventory is
    /// unchanged.
    pub fn reserve(&self, count: usize) -> ForgeResult<DeviceSet> {
        if count == 0 {
            return Err(AotForgeError::InvalidConfiguration(
                "cannot reserve zero devices".to_string(),
            ));
        }

        let mut inner = self.inner.lock()?;
        let free = inner
            .devices
            .iter()
            .filter(|d| d.state == DeviceState::Free)
            .count();
        if free < count {
            return Err(AotForgeError::InsufficientDevices {
                requested: count,
                free,
            });
        }

        let start = find_free_run(&inner.devices, count).ok_or(
            // Enough free devices exist but no contiguous run of the
            // requested length; surfaced the same way as exhaustion.
            AotForgeError::InsufficientDevices {
                requested: count,
                free,
            },
        )?;

        let mut ids = Vec::with_capacity(count);
        for slot in inner.devices[start..start + count].iter_mut() {
            slot.state = DeviceState::Reserved;
            ids.push(slot.descriptor.id);
        }

        inner.stats.total_reservations += 1;
        inner.stats.current_claimed += count;
        inner.stats.peak_claimed = inner.stats.peak_claimed.max(inner.stats.current_claimed);

        let set = DeviceSet::new(ids);
        debug!(devices = %set, "reserved device set");
        Ok(set)
    }

    /// Transition a reserved set to attached, recording the owning session
    pub fn attach(&self, set: &DeviceSet, session: SessionId) -> ForgeResult<()> {
        let mut inner = self.inner.lock()?;

        // Validate the whole set before mutating anything
        for id in set.ids() {
            let slot = slot_for(&inner.devices, *id)?;
            if slot.state != DeviceState::Reserved {
                return Err(AotForgeError::InvalidStateTransition {
                    from: slot.state.to_string(),
                    operation: format!("attach device {}", id),
                });
            }
        }

        for id in set.ids() {
            let slot = slot_for_mut(&mut inner.devices, *id)?;
            slot.state = DeviceState::Attached;
            slot.owner = Some(session);
        }

        debug!(devices = %set, session, "attached device set");
        Ok(())
    }

    /// Return a set's devices to the free state
    ///
    /// Idempotent: releasing an already-free set is a no-op, not an error.
    pub fn release(&self, set: &DeviceSet) -> ForgeResult<()> {
        let mut inner = self.inner.lock()?;

        let mut freed = 0usize;
        for id in set.ids() {
            let slot = slot_for_mut(&mut inner.devices, *id)?;
            if slot.state != DeviceState::Free {
                slot.state = DeviceState::Free;
                slot.owner = None;
                freed += 1;
            }
        }

        if freed > 0 {
            inner.stats.total_releases += 1;
            inner.stats.current_claimed = inner.stats.current_claimed.saturating_sub(freed);
            debug!(devices = %set, freed, "released device set");
        }
        Ok(())
    }

    /// Number of devices currently free
    pub fn free_count(&self) -> ForgeResult<usize> {
        let inner = self.inner.lock()?;
        Ok(inner
            .devices
            .iter()
            .filter(|d| d.state == DeviceState::Free)
            .count())
    }

    /// Total number of devices in the inventory
    pub fn total_count(&self) -> ForgeResult<usize> {
        Ok(self.inner.lock()?.devices.len())
    }

    /// Read-only view of every device for observability tooling
    pub fn inventory_snapshot(&self) -> ForgeResult<Vec<DeviceSnapshot>> {
        let inner = self.inner.lock()?;
        Ok(inner
            .devices
            .iter()
            .map(|slot| DeviceSnapshot {
                id: slot.descriptor.id,
                capacity_units: slot.descriptor.capacity_units,
                state: slot.state,
                owner: slot.owner,
            })
            .collect())
    }

    /// "What is using devices right now": attached device ids keyed by session
    pub fn occupancy(&self) -> ForgeResult<BTreeMap<SessionId, Vec<DeviceId>>> {
        let inner = self.inner.lock()?;
        let mut report: BTreeMap<SessionId, Vec<DeviceId>> = BTreeMap::new();
        for slot in &inner.devices {
            if let Some(owner) = slot.owner {
                report.entry(owner).or_default().push(slot.descriptor.id);
            }
        }
        Ok(report)
    }

    /// Reservation counters for monitoring
    pub fn stats(&self) -> ForgeResult<ReservationStats> {
        Ok(self.inner.lock()?.stats.clone())
    }
}

fn find_free_run(devices: &[DeviceSlot], count: usize) -> Option<usize> {
    let mut run_start = 0usize;
    let mut run_len = 0usize;
    for (idx, slot) in devices.iter().enumerate() {
        if slot.state == DeviceState::Free {
            if run_len == 0 {
                run_start = idx;
            }
            run_len += 1;
            if run_len == count {
                return Some(run_start);
            }
        } else {
            run_len = 0;
        }
    }
    None
}

fn slot_for(devices: &[DeviceSlot], id: DeviceId) -> ForgeResult<&DeviceSlot> {
    devices
        .iter()
        .find(|d| d.descriptor.id == id)
        .ok_or(AotForgeError::DeviceNotFound(id))
}

fn slot_for_mut(devices: &mut [DeviceSlot], id: DeviceId) -> ForgeResult<&mut DeviceSlot> {
    devices
        .iter_mut()
        .find(|d| d.descriptor.id == id)
        .ok_or(AotForgeError::DeviceNotFound(id))
}

// ========== Global Registry Lifecycle ==========

// Process-wide registry instance with explicit init/teardown.
static GLOBAL_REGISTRY: Mutex<Option<Arc<DeviceRegistry>>> = Mutex::new(None);

/// Initialize the process-wide registry from an inventory provider
///
/// Idempotent: if a registry is already installed, it is returned and the
/// provider is ignored.
pub fn init_global(provider: &dyn DeviceInventoryProvider) -> ForgeResult<Arc<DeviceRegistry>> {
    let mut global = GLOBAL_REGISTRY.lock()?;
    if let Some(ref registry) = *global {
        return Ok(registry.clone());
    }
    let registry = Arc::new(DeviceRegistry::new(provider));
    *global = Some(registry.clone());
    Ok(registry)
}

/// Get the process-wide registry, failing if `init_global` was never called
pub fn global() -> ForgeResult<Arc<DeviceRegistry>> {
    GLOBAL_REGISTRY
        .lock()?
        .clone()
        .ok_or(AotForgeError::RegistryNotInitialized)
}

/// Tear down the process-wide registry
///
/// Sessions holding an `Arc` to the registry keep it alive; this only
/// removes the global handle.
pub fn shutdown_global() -> ForgeResult<()> {
    let mut global = GLOBAL_REGISTRY.lock()?;
    if global.take().is_some() {
        info!("global device registry shut down");
    }
    Ok(())
}
