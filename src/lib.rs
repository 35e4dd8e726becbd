//! AotForge - Accelerator Session and Compilation-Cache Manager
//!
//! A session layer for fixed-shape, ahead-of-time-compiled hardware
//! accelerators. A [`CompiledSession`] binds a model to physical devices,
//! compiles a static-shape executable on first use, and reuses it from the
//! [`ExecutableCache`] on subsequent calls with identical shapes. Devices
//! are reserved atomically through the process-wide [`DeviceRegistry`],
//! and the [`SessionLifecycleManager`] guarantees release when sessions
//! are abandoned.

pub mod cache;
pub mod device;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod session;
pub mod tensor;

pub use cache::{ExecutableCache, ExecutableEntry, ModelId, ShapeSignature};
pub use device::{
    DeviceDescriptor, DeviceId, DeviceRegistry, DeviceSet, DeviceSnapshot, DeviceState,
    EnvInventory, SessionId, StaticInventory,
};
pub use error::{AotForgeError, ErrorCategory, ForgeResult};
pub use lifecycle::{SessionLifecycleManager, SessionSlot};
pub use session::{CompiledSession, ModelCompiler, SessionConfig, SessionState, StubCompiler};
pub use tensor::{DType, HostTensor, TensorSpec};
