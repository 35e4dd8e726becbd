//! Host-side tensor descriptions and buffers
//!
//! The core never inspects tensor contents; it only needs dimensions and
//! dtypes to decide whether a batch is replay-compatible with a compiled
//! executable. Shape stability is the data collator's responsibility.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AotForgeError, ForgeResult};

/// Element type of a tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    F32,
    F16,
    Bf16,
    I32,
    I64,
    U8,
}

impl DType {
    /// Size of one element in bytes
    pub fn size_bytes(&self) -> usize {
        match self {
            DType::F32 | DType::I32 => 4,
            DType::F16 | DType::Bf16 => 2,
            DType::I64 => 8,
            DType::U8 => 1,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "f32"),
            DType::F16 => write!(f, "f16"),
            DType::Bf16 => write!(f, "bf16"),
            DType::I32 => write!(f, "i32"),
            DType::I64 => write!(f, "i64"),
            DType::U8 => write!(f, "u8"),
        }
    }
}

/// Shape and dtype of one input tensor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorSpec {
    pub dims: Vec<usize>,
    pub dtype: DType,
}

impl TensorSpec {
    pub fn new(dims: Vec<usize>, dtype: DType) -> Self {
        TensorSpec { dims, dtype }
    }

    /// Total number of elements
    pub fn element_count(&self) -> usize {
        self.dims.iter().product()
    }

    /// Total buffer size in bytes
    pub fn byte_len(&self) -> usize {
        self.element_count() * self.dtype.size_bytes()
    }
}

impl fmt::Display for TensorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.dims.iter().map(|d| d.to_string()).collect();
        write!(f, "[{}]{}", dims.join("x"), self.dtype)
    }
}

/// A host-resident tensor buffer handed to `run`
///
/// The buffer is opaque to the core; only the spec participates in
/// shape-signature matching.
#[derive(Debug, Clone)]
pub struct HostTensor {
    spec: TensorSpec,
    data: Vec<u8>,
}

impl HostTensor {
    /// Create a tensor from raw bytes, validating the buffer length
    pub fn new(spec: TensorSpec, data: Vec<u8>) -> ForgeResult<Self> {
        if data.len() != spec.byte_len() {
            return Err(AotForgeError::InvalidConfiguration(format!(
                "tensor buffer length {} does not match spec {} ({} bytes)",
                data.len(),
                spec,
                spec.byte_len()
            )));
        }
        Ok(HostTensor { spec, data })
    }

    /// Create a zero-filled tensor with the given shape
    pub fn zeros(dims: Vec<usize>, dtype: DType) -> Self {
        let spec = TensorSpec::new(dims, dtype);
        let data = vec![0u8; spec.byte_len()];
        HostTensor { spec, data }
    }

    /// Create an f32 tensor from a slice of values
    pub fn from_f32(dims: Vec<usize>, values: &[f32]) -> ForgeResult<Self> {
        let spec = TensorSpec::new(dims, DType::F32);
        if values.len() != spec.element_count() {
            return Err(AotForgeError::InvalidConfiguration(format!(
                "expected {} elements for spec {}, got {}",
                spec.element_count(),
                spec,
                values.len()
            )));
        }
        let mut data = Vec::with_capacity(spec.byte_len());
        for v in values {
            data.extend_from_slice(&v.to_le_bytes());
        }
        Ok(HostTensor { spec, data })
    }

    pub fn spec(&self) -> &TensorSpec {
        &self.spec
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}
