//! Cache entries and keys

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stable identity hash for one model
///
/// Derived from the model's name/path so the same model maps to the same
/// cache entries across process restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelId {
    digest: String,
}

impl ModelId {
    /// Hash a model name/path into an identity
    pub fn from_name(name: &str) -> Self {
        let hash = Sha256::digest(name.as_bytes());
        let digest = hash
            .iter()
            .take(8)
            .map(|b| format!("{:02x}", b))
            .collect::<String>();
        ModelId { digest }
    }

    /// Rebuild an identity from an already-computed digest (cache reload path)
    pub(crate) fn from_digest(digest: &str) -> Self {
        ModelId {
            digest: digest.to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.digest
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.digest)
    }
}

/// Cache key: model identity plus shape-signature digest
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub model: ModelId,
    pub signature_digest: String,
}

impl CacheKey {
    pub fn new(model: ModelId, signature_digest: String) -> Self {
        CacheKey {
            model,
            signature_digest,
        }
    }

    /// Content-addressed file stem for on-disk persistence
    pub fn file_stem(&self) -> String {
        format!("{}-{}", self.model, self.signature_digest)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.model, self.signature_digest)
    }
}

/// Metadata persisted alongside each compiled artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub model: String,
    pub signature_digest: String,
    /// Milliseconds since the Unix epoch at compile time
    pub compiled_at_ms: u64,
    /// Devices the executable was compiled to occupy
    pub device_count: usize,
}

/// One cached compiled executable
#[derive(Debug, Clone)]
pub struct ExecutableEntry {
    pub key: CacheKey,
    /// Opaque compiled artifact; shared so sessions can retain it cheaply
    pub artifact: Arc<Vec<u8>>,
    pub metadata: EntryMetadata,
}

impl ExecutableEntry {
    pub fn new(key: CacheKey, artifact: Vec<u8>, device_count: usize) -> Self {
        let metadata = EntryMetadata {
            model: key.model.to_string(),
            signature_digest: key.signature_digest.clone(),
            compiled_at_ms: now_ms(),
            device_count,
        };
        ExecutableEntry {
            key,
            artifact: Arc::new(artifact),
            metadata,
        }
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_id_stable() {
        let a = ModelId::from_name("whisper-small");
        let b = ModelId::from_name("whisper-small");
        let c = ModelId::from_name("whisper-large");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 16);
    }

    #[test]
    fn test_cache_key_file_stem() {
        let key = CacheKey::new(ModelId::from_name("m"), "deadbeef".to_string());
        let stem = key.file_stem();
        assert!(stem.ends_with("-deadbeef"));
        assert!(!stem.contains('/'));
    }

    #[test]
    fn test_entry_metadata() {
        let key = CacheKey::new(ModelId::from_name("m"), "abcd".to_string());
        let entry = ExecutableEntry::new(key, vec![1, 2, 3], 2);

        assert_eq!(entry.metadata.device_count, 2);
        assert_eq!(entry.metadata.signature_digest, "abcd");
        assert_eq!(entry.artifact.len(), 3);
        assert!(entry.metadata.compiled_at_ms > 0);
    }
}
