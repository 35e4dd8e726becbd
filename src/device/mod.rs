//! Device inventory, reservation, and attachment tracking

pub mod inventory;
pub mod registry;
pub mod types;

pub use inventory::{DeviceInventoryProvider, EnvInventory, StaticInventory};
pub use registry::{global, init_global, shutdown_global, DeviceRegistry};
pub use types::{
    DeviceDescriptor, DeviceId, DeviceSet, DeviceSnapshot, DeviceState, ReservationStats,
    SessionId,
};
