//! Canonical shape signatures
//!
//! A compiled executable is only replay-compatible with batches whose
//! tensor shapes, dtypes, and configuration flags all match the signature
//! it was compiled for. The signature is the cache key half that changes
//! between calls; the model identity hash is the other half.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::tensor::{HostTensor, TensorSpec};

/// Canonical, hashable description of one compilation target
///
/// Two calls with equal signatures are guaranteed replay-compatible with
/// the same cached executable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShapeSignature {
    inputs: Vec<TensorSpec>,
    /// Loop iterations folded into the compiled graph
    iteration_count: u32,
    /// Data-parallel replication factor
    replication: u32,
}

impl ShapeSignature {
    pub fn new(inputs: Vec<TensorSpec>) -> Self {
        ShapeSignature {
            inputs,
            iteration_count: 1,
            replication: 1,
        }
    }

    /// Build the signature describing a concrete input batch
    pub fn of_inputs(inputs: &[HostTensor]) -> Self {
        ShapeSignature::new(inputs.iter().map(|t| t.spec().clone()).collect())
    }

    pub fn with_iteration_count(mut self, iteration_count: u32) -> Self {
        self.iteration_count = iteration_count;
        self
    }

    pub fn with_replication(mut self, replication: u32) -> Self {
        self.replication = replication;
        self
    }

    pub fn inputs(&self) -> &[TensorSpec] {
        &self.inputs
    }

    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    pub fn replication(&self) -> u32 {
        self.replication
    }

    /// Check a concrete batch against this signature
    ///
    /// Tensor order matters: the collator supplies batches in a stable
    /// order, and the compiled executable binds inputs positionally.
    pub fn matches(&self, inputs: &[HostTensor]) -> bool {
        self.inputs.len() == inputs.len()
            && self
                .inputs
                .iter()
                .zip(inputs.iter())
                .all(|(spec, tensor)| spec == tensor.spec())
    }

    /// Stable hex digest used for cache keys and filenames
    pub fn digest(&self) -> String {
        // Field order in the serialized form is the struct declaration
        // order, so the digest is stable for equal signatures.
        let canonical =
            serde_json::to_vec(self).expect("shape signature serialization cannot fail");
        let hash = Sha256::digest(&canonical);
        hash.iter()
            .take(8)
            .map(|b| format!("{:02x}", b))
            .collect::<String>()
    }
}

impl fmt::Display for ShapeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let specs: Vec<String> = self.inputs.iter().map(|s| s.to_string()).collect();
        write!(
            f,
            "({}) iters={} repl={}",
            specs.join(", "),
            self.iteration_count,
            self.replication
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::DType;

    fn sig(dims: Vec<usize>) -> ShapeSignature {
        ShapeSignature::new(vec![TensorSpec::new(dims, DType::F32)])
    }

    #[test]
    fn test_equal_signatures_share_digest() {
        let a = sig(vec![8, 16000]).with_iteration_count(4);
        let b = sig(vec![8, 16000]).with_iteration_count(4);
        assert_eq!(a, b);
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn test_shape_changes_digest() {
        let a = sig(vec![8, 16000]);
        let b = sig(vec![8, 8000]);
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_config_flags_change_digest() {
        let base = sig(vec![4, 4]);
        assert_ne!(
            base.clone().with_iteration_count(2).digest(),
            base.clone().with_iteration_count(3).digest()
        );
        assert_ne!(
            base.clone().with_replication(1).digest(),
            base.with_replication(2).digest()
        );
    }

    #[test]
    fn test_dtype_changes_digest() {
        let a = ShapeSignature::new(vec![TensorSpec::new(vec![2, 2], DType::F32)]);
        let b = ShapeSignature::new(vec![TensorSpec::new(vec![2, 2], DType::F16)]);
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_matches_inputs() {
        let signature = sig(vec![2, 4]);
        let good = vec![HostTensor::zeros(vec![2, 4], DType::F32)];
        let wrong_shape = vec![HostTensor::zeros(vec![2, 5], DType::F32)];
        let wrong_dtype = vec![HostTensor::zeros(vec![2, 4], DType::F16)];
        let wrong_arity = vec![
            HostTensor::zeros(vec![2, 4], DType::F32),
            HostTensor::zeros(vec![2, 4], DType::F32),
        ];

        assert!(signature.matches(&good));
        assert!(!signature.matches(&wrong_shape));
        assert!(!signature.matches(&wrong_dtype));
        assert!(!signature.matches(&wrong_arity));
    }

    #[test]
    fn test_of_inputs_round_trip() {
        let inputs = vec![
            HostTensor::zeros(vec![1, 80, 3000], DType::F32),
            HostTensor::zeros(vec![1, 448], DType::I64),
        ];
        let signature = ShapeSignature::of_inputs(&inputs);
        assert!(signature.matches(&inputs));
        assert_eq!(signature.inputs().len(), 2);
    }

    #[test]
    fn test_display() {
        let signature = sig(vec![2, 3]).with_iteration_count(5);
        assert_eq!(signature.to_string(), "([2x3]f32) iters=5 repl=1");
    }
}
