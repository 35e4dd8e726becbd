//! Shared harness for integration tests

use std::sync::Arc;

use aotforge::{
    CompiledSession, DeviceRegistry, ExecutableCache, SessionConfig, ShapeSignature,
    StaticInventory, StubCompiler, TensorSpec,
};

/// Everything a session needs, built around one shared registry
pub struct Harness {
    pub registry: Arc<DeviceRegistry>,
    pub cache: Arc<ExecutableCache>,
    pub compiler: Arc<StubCompiler>,
}

impl Harness {
    pub fn new(device_count: usize) -> Self {
        Harness {
            registry: Arc::new(DeviceRegistry::new(&StaticInventory::new(device_count))),
            cache: Arc::new(ExecutableCache::in_memory()),
            compiler: Arc::new(StubCompiler::new()),
        }
    }

    pub fn session(&self, model: &str, devices: usize) -> Arc<CompiledSession> {
        CompiledSession::new(
            SessionConfig::new(model).with_device_requirement(devices),
            self.registry.clone(),
            self.cache.clone(),
            self.compiler.clone(),
        )
        .expect("session construction")
    }
}

/// One-tensor f32 signature with the given shape
pub fn sig(dims: Vec<usize>) -> ShapeSignature {
    ShapeSignature::new(vec![TensorSpec::new(dims, aotforge::DType::F32)])
}
