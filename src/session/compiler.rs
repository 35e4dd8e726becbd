//! External compiler/runtime interface
//!
//! Compilation is an externally-defined, slow, pure function from
//! (model graph, shape signature) to an opaque executable artifact.
//! Execution replays an artifact against a shape-compatible batch.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::cache::{ModelId, ShapeSignature};
use crate::error::{AotForgeError, ForgeResult};
use crate::tensor::HostTensor;

/// The external model compiler and runtime
pub trait ModelCompiler: Send + Sync {
    /// Compile the model for one shape signature, producing an opaque artifact
    ///
    /// May take minutes; blocks the calling thread.
    fn compile(&self, model: &ModelId, signature: &ShapeSignature) -> ForgeResult<Vec<u8>>;

    /// Execute a compiled artifact against a shape-compatible batch
    fn execute(&self, artifact: &[u8], inputs: &[HostTensor]) -> ForgeResult<Vec<HostTensor>>;
}

/// Deterministic in-process compiler used in tests and examples
///
/// The artifact encodes the cache key; execution echoes the inputs back.
/// An invocation counter makes recompilation observable, which is how the
/// cache-hit tests verify that cached executables are actually reused.
#[derive(Debug, Default)]
pub struct StubCompiler {
    compile_calls: AtomicUsize,
    /// When set, every compile call fails with this reason
    fail_with: Option<String>,
}

impl StubCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a stub whose compile calls always fail
    pub fn failing(reason: impl Into<String>) -> Self {
        StubCompiler {
            compile_calls: AtomicUsize::new(0),
            fail_with: Some(reason.into()),
        }
    }

    /// Number of compile invocations so far
    pub fn compile_calls(&self) -> usize {
        self.compile_calls.load(Ordering::SeqCst)
    }
}

impl ModelCompiler for StubCompiler {
    fn compile(&self, model: &ModelId, signature: &ShapeSignature) -> ForgeResult<Vec<u8>> {
        self.compile_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(reason) = &self.fail_with {
            return Err(AotForgeError::CompilationFailure {
                model: model.to_string(),
                signature: signature.digest(),
                reason: reason.clone(),
            });
        }

        Ok(format!("aot:{}:{}", model, signature.digest()).into_bytes())
    }

    fn execute(&self, _artifact: &[u8], inputs: &[HostTensor]) -> ForgeResult<Vec<HostTensor>> {
        Ok(inputs.to_vec())
    }
}
