//! Executable cache with optional on-disk persistence
//!
//! The cache maps (model identity, shape signature) to compiled artifacts.
//! The on-disk directory is a pure cache: losing it triggers recompilation,
//! never a correctness failure. Entries are content-addressed and writes are
//! idempotent replacements (temp file + rename), so concurrent processes can
//! share a directory without locking.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::ForgeResult;

use super::entry::{CacheKey, EntryMetadata, ExecutableEntry, ModelId};
use super::signature::ShapeSignature;

const ARTIFACT_EXT: &str = "bin";
const METADATA_EXT: &str = "json";

/// Cache of compiled executables keyed by model identity and shape signature
#[derive(Debug)]
pub struct ExecutableCache {
    dir: Option<PathBuf>,
    entries: Mutex<HashMap<CacheKey, ExecutableEntry>>,
}

impl ExecutableCache {
    /// Create a cache with no persistence
    pub fn in_memory() -> Self {
        ExecutableCache {
            dir: None,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Open a persistent cache, loading any entries already on disk
    ///
    /// Unreadable or partially-written entries are skipped with a warning;
    /// they will be recompiled and replaced on next use.
    pub fn open(dir: impl Into<PathBuf>) -> ForgeResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut entries = HashMap::new();
        for dir_entry in fs::read_dir(&dir)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(METADATA_EXT) {
                continue;
            }
            match load_entry(&path) {
                Ok(entry) => {
                    entries.insert(entry.key.clone(), entry);
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable cache entry");
                }
            }
        }

        debug!(dir = %dir.display(), entries = entries.len(), "opened executable cache");
        Ok(ExecutableCache {
            dir: Some(dir),
            entries: Mutex::new(entries),
        })
    }

    /// Pure read; O(1) by key
    ///
    /// A poisoned index reads as a miss: recompilation is always safe,
    /// while failing the lookup would take down callers that could
    /// otherwise proceed.
    pub fn lookup(&self, model: &ModelId, signature: &ShapeSignature) -> Option<ExecutableEntry> {
        let key = CacheKey::new(model.clone(), signature.digest());
        let entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(_) => {
                warn!(key = %key, "cache index lock poisoned, treating lookup as a miss");
                return None;
            }
        };
        entries.get(&key).cloned()
    }

    /// Insert a new entry; an existing entry for the key is silently replaced
    ///
    /// Compilation is deterministic for a fixed input, so last-compile-wins
    /// replacement is safe (if wasteful); callers should avoid needless
    /// recompilation by checking `lookup` first.
    pub fn store(
        &self,
        model: &ModelId,
        signature: &ShapeSignature,
        artifact: Vec<u8>,
        device_count: usize,
    ) -> ForgeResult<ExecutableEntry> {
        let key = CacheKey::new(model.clone(), signature.digest());
        let entry = ExecutableEntry::new(key.clone(), artifact, device_count);

        if let Some(dir) = &self.dir {
            persist_entry(dir, &entry)?;
        }

        let mut entries = self.entries.lock()?;
        entries.insert(key.clone(), entry.clone());
        debug!(key = %key, bytes = entry.artifact.len(), "stored executable");
        Ok(entry)
    }

    /// Remove all entries for a model identity
    ///
    /// Used when reconfiguring a model invalidates prior executables.
    /// Returns the number of entries removed.
    pub fn evict(&self, model: &ModelId) -> ForgeResult<usize> {
        let mut entries = self.entries.lock()?;
        let victims: Vec<CacheKey> = entries
            .keys()
            .filter(|k| &k.model == model)
            .cloned()
            .collect();

        for key in &victims {
            entries.remove(key);
            if let Some(dir) = &self.dir {
                // Best-effort removal; a missing file is already evicted.
                let _ = fs::remove_file(artifact_path(dir, key));
                let _ = fs::remove_file(metadata_path(dir, key));
            }
        }

        if !victims.is_empty() {
            debug!(model = %model, evicted = victims.len(), "evicted model entries");
        }
        Ok(victims.len())
    }

    /// Number of entries currently indexed
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persistence directory, if any
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }
}

fn artifact_path(dir: &Path, key: &CacheKey) -> PathBuf {
    dir.join(format!("{}.{}", key.file_stem(), ARTIFACT_EXT))
}

fn metadata_path(dir: &Path, key: &CacheKey) -> PathBuf {
    dir.join(format!("{}.{}", key.file_stem(), METADATA_EXT))
}

fn persist_entry(dir: &Path, entry: &ExecutableEntry) -> ForgeResult<()> {
    // Temp-then-rename so readers never observe a partial artifact.
    let artifact = artifact_path(dir, &entry.key);
    let tmp = artifact.with_extension("bin.tmp");
    fs::write(&tmp, entry.artifact.as_slice())?;
    fs::rename(&tmp, &artifact)?;

    let metadata = metadata_path(dir, &entry.key);
    let tmp = metadata.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(&entry.metadata)?)?;
    fs::rename(&tmp, &metadata)?;
    Ok(())
}

fn load_entry(metadata_file: &Path) -> ForgeResult<ExecutableEntry> {
    let metadata: EntryMetadata = serde_json::from_slice(&fs::read(metadata_file)?)?;
    let artifact_file = metadata_file.with_extension(ARTIFACT_EXT);
    let artifact = fs::read(&artifact_file)?;

    let key = CacheKey::new(
        ModelId::from_digest(&metadata.model),
        metadata.signature_digest.clone(),
    );
    Ok(ExecutableEntry {
        key,
        artifact: std::sync::Arc::new(artifact),
        metadata,
    })
}
