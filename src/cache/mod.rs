//! Compiled-executable caching keyed by model identity and shape signature

pub mod cache;
pub mod entry;
pub mod signature;

pub use cache::ExecutableCache;
pub use entry::{CacheKey, EntryMetadata, ExecutableEntry, ModelId};
pub use signature::ShapeSignature;
