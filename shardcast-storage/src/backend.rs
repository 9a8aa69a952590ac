//! Scratch storage trait
//!
//! Defines the interface that all scratch stores must follow. Objects are
//! keyed by content hash and written at most once: concurrent writers of
//! the same key race safely because `put_if_absent` is atomic.

use bytes::Bytes;
use shardcast_core::error::Result;
use shardcast_core::hash::ContentHash;

/// Result of a create-if-absent write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// This call wrote the object
    Created,
    /// An object with this key already existed; nothing was written
    AlreadyPresent,
}

/// Storage statistics
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    /// Total number of objects stored
    pub object_count: u64,

    /// Total bytes used by objects
    pub bytes_used: u64,

    /// Number of writes that created an object
    pub writes: u64,

    /// Number of writes skipped because the object already existed
    pub dedup_hits: u64,

    /// Number of read operations
    pub reads: u64,
}

/// Content-addressed scratch store
///
/// All implementations must be Send + Sync; one store is shared by every
/// concurrent upload.
pub trait ScratchStore: Send + Sync {
    /// Store `data` under `key` unless an object with that key exists
    ///
    /// When this returns `Created` the object is fully durable.
    fn put_if_absent(&self, key: &ContentHash, data: &[u8]) -> Result<PutOutcome>;

    /// Retrieve an object
    fn get(&self, key: &ContentHash) -> Result<Option<Bytes>>;

    /// Check if an object exists
    fn exists(&self, key: &ContentHash) -> Result<bool>;

    /// Human-readable location of the object (a path for on-disk stores)
    fn location(&self, key: &ContentHash) -> String;

    /// List all object keys
    fn list(&self) -> Result<Vec<ContentHash>>;

    /// Get storage statistics
    fn stats(&self) -> Result<StorageStats>;
}
