//! The compiled session state machine
//!
//! A session binds one model to at most one device set and at most one
//! compiled executable. Lifecycle:
//!
//! ```text
//! Created -> Compiling -> Ready -> Detached -> Destroyed
//!                ^          |         |
//!                +----------+         |   (shape change)
//!                +--------------------+   (reattach on next run/compile)
//! ```
//!
//! Every operation either fully succeeds or rolls back to the pre-call
//! state with any newly-claimed devices released.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::cache::{ExecutableCache, ExecutableEntry, ModelId, ShapeSignature};
use crate::device::{DeviceRegistry, DeviceSet, SessionId};
use crate::error::{AotForgeError, ForgeResult};
use crate::tensor::HostTensor;

use super::compiler::ModelCompiler;
use super::config::SessionConfig;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Unattached, uncompiled
    Created,
    /// Device reservation and compilation in flight
    Compiling,
    /// Attached and compiled; `run` is valid
    Ready,
    /// Executable retained, devices released
    Detached,
    /// All resources released; irreversible
    Destroyed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Created => write!(f, "Created"),
            SessionState::Compiling => write!(f, "Compiling"),
            SessionState::Ready => write!(f, "Ready"),
            SessionState::Detached => write!(f, "Detached"),
            SessionState::Destroyed => write!(f, "Destroyed"),
        }
    }
}

/// Signature and executable currently bound to a session
#[derive(Debug, Clone)]
struct BoundExecutable {
    signature: ShapeSignature,
    entry: ExecutableEntry,
}

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    devices: Option<DeviceSet>,
    bound: Option<BoundExecutable>,
    last_used: Instant,
}

/// The runtime object binding a model to devices and a compiled executable
pub struct CompiledSession {
    id: SessionId,
    model: ModelId,
    config: SessionConfig,
    registry: Arc<DeviceRegistry>,
    cache: Arc<ExecutableCache>,
    compiler: Arc<dyn ModelCompiler>,
    inner: Mutex<SessionInner>,
}

impl fmt::Debug for CompiledSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSession")
            .field("id", &self.id)
            .field("model", &self.model)
            .field("device_requirement", &self.config.device_requirement)
            .finish()
    }
}

impl CompiledSession {
    /// Create a session in the `Created` state
    ///
    /// No devices are reserved and nothing is compiled until the first
    /// `compile` call. Returned as `Arc` so the lifecycle manager can hold
    /// a weak reference.
    pub fn new(
        config: SessionConfig,
        registry: Arc<DeviceRegistry>,
        cache: Arc<ExecutableCache>,
        compiler: Arc<dyn ModelCompiler>,
    ) -> ForgeResult<Arc<Self>> {
        config.validate()?;
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::SeqCst);
        let model = ModelId::from_name(&config.model_name);

        debug!(session = id, model = %model, "session created");
        Ok(Arc::new(CompiledSession {
            id,
            model,
            config,
            registry,
            cache,
            compiler,
            inner: Mutex::new(SessionInner {
                state: SessionState::Created,
                devices: None,
                bound: None,
                last_used: Instant::now(),
            }),
        }))
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn model(&self) -> &ModelId {
        &self.model
    }

    pub fn device_requirement(&self) -> usize {
        self.config.device_requirement
    }

    /// Current lifecycle state
    pub fn state(&self) -> ForgeResult<SessionState> {
        Ok(self.inner.lock()?.state)
    }

    /// Time since the session last compiled or ran
    pub fn idle_for(&self) -> ForgeResult<Duration> {
        Ok(self.inner.lock()?.last_used.elapsed())
    }

    /// Bind the session to a shape signature, compiling on cache miss
    ///
    /// Valid from `Created`, `Detached`, or `Ready`. Calling with the
    /// already-bound signature is a no-op. On a cache hit the compiler is
    /// not invoked. On reservation or compilation failure the session
    /// stays in its prior state and newly-claimed devices are released.
    pub fn compile(&self, signature: ShapeSignature) -> ForgeResult<()> {
        let mut inner = self.inner.lock()?;
        match inner.state {
            SessionState::Destroyed => return Err(AotForgeError::SessionDestroyed(self.id)),
            SessionState::Compiling => {
                return Err(AotForgeError::InvalidStateTransition {
                    from: inner.state.to_string(),
                    operation: "compile".to_string(),
                })
            }
            SessionState::Ready => {
                if let Some(bound) = &inner.bound {
                    if bound.signature == signature {
                        // Already bound to this signature
                        inner.last_used = Instant::now();
                        return Ok(());
                    }
                }
            }
            SessionState::Created | SessionState::Detached => {}
        }

        let prior_state = inner.state;

        if let Some(entry) = self.cache.lookup(&self.model, &signature) {
            // Cache hit: no compilation, just make sure devices are attached
            self.ensure_attached(&mut inner)?;
            debug!(session = self.id, signature = %signature.digest(), "executable cache hit");
            inner.bound = Some(BoundExecutable { signature, entry });
            inner.state = SessionState::Ready;
            inner.last_used = Instant::now();
            return Ok(());
        }

        // Cache miss: reserve devices first so a doomed reservation never
        // pays for a compile.
        let newly_reserved = match inner.devices {
            Some(_) => None,
            None => Some(self.registry.reserve(self.config.device_requirement)?),
        };

        inner.state = SessionState::Compiling;
        info!(
            session = self.id,
            model = %self.model,
            signature = %signature.digest(),
            "compiling executable"
        );

        let compiled = self
            .compiler
            .compile(&self.model, &signature)
            .and_then(|artifact| {
                self.cache.store(
                    &self.model,
                    &signature,
                    artifact,
                    self.config.device_requirement,
                )
            });

        match compiled {
            Ok(entry) => {
                if let Some(set) = newly_reserved {
                    if let Err(err) = self.registry.attach(&set, self.id) {
                        let _ = self.registry.release(&set);
                        inner.state = prior_state;
                        return Err(err);
                    }
                    inner.devices = Some(set);
                }
                inner.bound = Some(BoundExecutable { signature, entry });
                inner.state = SessionState::Ready;
                inner.last_used = Instant::now();
                Ok(())
            }
            Err(err) => {
                if let Some(set) = newly_reserved {
                    let _ = self.registry.release(&set);
                }
                inner.state = prior_state;
                Err(err)
            }
        }
    }

    /// Execute the bound executable against a batch
    ///
    /// Valid from `Ready` with inputs matching the bound signature exactly;
    /// mismatched shapes fail fast with `ShapeMismatch` rather than
    /// triggering an implicit recompile. A `Detached` session is
    /// transparently reattached first, reusing the retained executable
    /// without invoking the compiler.
    pub fn run(&self, inputs: &[HostTensor]) -> ForgeResult<Vec<HostTensor>> {
        let mut inner = self.inner.lock()?;
        match inner.state {
            SessionState::Destroyed => return Err(AotForgeError::SessionDestroyed(self.id)),
            SessionState::Created | SessionState::Compiling => {
                return Err(AotForgeError::InvalidStateTransition {
                    from: inner.state.to_string(),
                    operation: "run".to_string(),
                })
            }
            SessionState::Detached => {
                // Implicit reattachment: same-size reservation, cached
                // executable, no recompilation.
                self.ensure_attached(&mut inner)?;
                inner.state = SessionState::Ready;
                info!(session = self.id, "session reattached");
            }
            SessionState::Ready => {}
        }

        let bound = inner.bound.as_ref().ok_or_else(|| {
            AotForgeError::InternalError(format!("session {} ready without executable", self.id))
        })?;

        if !bound.signature.matches(inputs) {
            return Err(AotForgeError::ShapeMismatch {
                model: self.model.to_string(),
                expected: bound.signature.to_string(),
                actual: ShapeSignature::of_inputs(inputs).to_string(),
            });
        }

        let outputs = self.compiler.execute(&bound.entry.artifact, inputs)?;
        inner.last_used = Instant::now();
        Ok(outputs)
    }

    /// Release devices while retaining the compiled executable
    ///
    /// Valid from `Ready`; idempotent if already `Detached`. The next
    /// `run` or `compile` reattaches transparently.
    pub fn detach(&self) -> ForgeResult<()> {
        let mut inner = self.inner.lock()?;
        match inner.state {
            SessionState::Destroyed => Err(AotForgeError::SessionDestroyed(self.id)),
            SessionState::Detached => Ok(()),
            SessionState::Ready => {
                if let Some(set) = inner.devices.take() {
                    self.registry.release(&set)?;
                }
                inner.state = SessionState::Detached;
                debug!(session = self.id, "session detached");
                Ok(())
            }
            SessionState::Created | SessionState::Compiling => {
                Err(AotForgeError::InvalidStateTransition {
                    from: inner.state.to_string(),
                    operation: "detach".to_string(),
                })
            }
        }
    }

    /// Release all resources; reachable from any state and idempotent
    ///
    /// Cached executables stay in the cache. Subsequent operations fail
    /// with `SessionDestroyed`.
    pub fn destroy(&self) -> ForgeResult<()> {
        let mut inner = self.inner.lock()?;
        if inner.state == SessionState::Destroyed {
            return Ok(());
        }
        if let Some(set) = inner.devices.take() {
            self.registry.release(&set)?;
        }
        inner.bound = None;
        inner.state = SessionState::Destroyed;
        debug!(session = self.id, "session destroyed");
        Ok(())
    }

    /// Reserve and attach a device set if none is held
    fn ensure_attached(&self, inner: &mut SessionInner) -> ForgeResult<()> {
        if inner.devices.is_some() {
            return Ok(());
        }
        let set = self.registry.reserve(self.config.device_requirement)?;
        if let Err(err) = self.registry.attach(&set, self.id) {
            let _ = self.registry.release(&set);
            return Err(err);
        }
        inner.devices = Some(set);
        Ok(())
    }
}

impl Drop for CompiledSession {
    // Safety net for sessions abandoned without an explicit destroy():
    // devices must never outlive their owner.
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.lock() {
            if inner.state != SessionState::Destroyed {
                if let Some(set) = inner.devices.take() {
                    let _ = self.registry.release(&set);
                }
                inner.state = SessionState::Destroyed;
                debug!(session = self.id, "session dropped, devices released");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::StaticInventory;
    use crate::session::StubCompiler;
    use crate::tensor::{DType, TensorSpec};

    fn harness(devices: usize) -> (Arc<DeviceRegistry>, Arc<ExecutableCache>, Arc<StubCompiler>) {
        (
            Arc::new(DeviceRegistry::new(&StaticInventory::new(devices))),
            Arc::new(ExecutableCache::in_memory()),
            Arc::new(StubCompiler::new()),
        )
    }

    fn sig(dim: usize) -> ShapeSignature {
        ShapeSignature::new(vec![TensorSpec::new(vec![dim], DType::F32)])
    }

    #[test]
    fn test_created_to_ready() {
        let (registry, cache, compiler) = harness(2);
        let session = CompiledSession::new(
            SessionConfig::new("m").with_device_requirement(2),
            registry.clone(),
            cache,
            compiler.clone(),
        )
        .unwrap();

        assert_eq!(session.state().unwrap(), SessionState::Created);
        session.compile(sig(8)).unwrap();
        assert_eq!(session.state().unwrap(), SessionState::Ready);
        assert_eq!(compiler.compile_calls(), 1);
        assert_eq!(registry.free_count().unwrap(), 0);
    }

    #[test]
    fn test_compile_same_signature_is_noop() {
        let (registry, cache, compiler) = harness(1);
        let session =
            CompiledSession::new(SessionConfig::new("m"), registry, cache, compiler.clone())
                .unwrap();

        session.compile(sig(8)).unwrap();
        session.compile(sig(8)).unwrap();
        assert_eq!(compiler.compile_calls(), 1);
    }

    #[test]
    fn test_run_before_compile_fails() {
        let (registry, cache, compiler) = harness(1);
        let session =
            CompiledSession::new(SessionConfig::new("m"), registry, cache, compiler).unwrap();

        let err = session.run(&[HostTensor::zeros(vec![8], DType::F32)]).unwrap_err();
        assert!(matches!(err, AotForgeError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_reservation_failure_keeps_state() {
        let (registry, cache, compiler) = harness(1);
        let session = CompiledSession::new(
            SessionConfig::new("m").with_device_requirement(2),
            registry.clone(),
            cache,
            compiler.clone(),
        )
        .unwrap();

        let err = session.compile(sig(8)).unwrap_err();
        assert!(matches!(err, AotForgeError::InsufficientDevices { .. }));
        assert_eq!(session.state().unwrap(), SessionState::Created);
        assert_eq!(registry.free_count().unwrap(), 1);
        assert_eq!(compiler.compile_calls(), 0);
    }

    #[test]
    fn test_compilation_failure_rolls_back() {
        let (registry, cache, _) = harness(2);
        let compiler = Arc::new(StubCompiler::failing("unsupported op"));
        let session = CompiledSession::new(
            SessionConfig::new("m"),
            registry.clone(),
            cache.clone(),
            compiler,
        )
        .unwrap();

        let err = session.compile(sig(8)).unwrap_err();
        assert!(matches!(err, AotForgeError::CompilationFailure { .. }));
        assert_eq!(session.state().unwrap(), SessionState::Created);
        assert_eq!(registry.free_count().unwrap(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_destroy_then_use_fails() {
        let (registry, cache, compiler) = harness(1);
        let session =
            CompiledSession::new(SessionConfig::new("m"), registry, cache, compiler).unwrap();

        session.compile(sig(8)).unwrap();
        session.destroy().unwrap();
        // Idempotent
        session.destroy().unwrap();

        assert!(matches!(
            session.compile(sig(8)),
            Err(AotForgeError::SessionDestroyed(_))
        ));
        assert!(matches!(
            session.run(&[HostTensor::zeros(vec![8], DType::F32)]),
            Err(AotForgeError::SessionDestroyed(_))
        ));
        assert!(matches!(
            session.detach(),
            Err(AotForgeError::SessionDestroyed(_))
        ));
    }

    #[test]
    fn test_detach_before_ready_fails() {
        let (registry, cache, compiler) = harness(1);
        let session =
            CompiledSession::new(SessionConfig::new("m"), registry, cache, compiler).unwrap();

        assert!(matches!(
            session.detach(),
            Err(AotForgeError::InvalidStateTransition { .. })
        ));
    }
}
