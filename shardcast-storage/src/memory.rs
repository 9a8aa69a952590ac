//! In-memory scratch store
//!
//! Used for testing and development. Not persistent.

use crate::backend::{PutOutcome, ScratchStore, StorageStats};
use bytes::Bytes;
use parking_lot::RwLock;
use shardcast_core::error::Result;
use shardcast_core::hash::ContentHash;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory scratch store
pub struct MemoryStore {
    /// Object storage
    objects: RwLock<HashMap<ContentHash, Bytes>>,

    /// Current bytes used
    bytes_used: AtomicU64,

    /// Operation counters
    reads: AtomicU64,
    writes: AtomicU64,
    dedup_hits: AtomicU64,
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            bytes_used: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            dedup_hits: AtomicU64::new(0),
        }
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Clear all stored objects
    pub fn clear(&self) {
        let mut objects = self.objects.write();
        objects.clear();
        self.bytes_used.store(0, Ordering::SeqCst);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ScratchStore for MemoryStore {
    fn put_if_absent(&self, key: &ContentHash, data: &[u8]) -> Result<PutOutcome> {
        // The check and the insert happen under one write lock
        let mut objects = self.objects.write();
        match objects.entry(*key) {
            Entry::Occupied(_) => {
                self.dedup_hits.fetch_add(1, Ordering::Relaxed);
                Ok(PutOutcome::AlreadyPresent)
            }
            Entry::Vacant(slot) => {
                slot.insert(Bytes::copy_from_slice(data));
                self.bytes_used
                    .fetch_add(data.len() as u64, Ordering::SeqCst);
                self.writes.fetch_add(1, Ordering::Relaxed);
                Ok(PutOutcome::Created)
            }
        }
    }

    fn get(&self, key: &ContentHash) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let objects = self.objects.read();
        Ok(objects.get(key).cloned())
    }

    fn exists(&self, key: &ContentHash) -> Result<bool> {
        let objects = self.objects.read();
        Ok(objects.contains_key(key))
    }

    fn location(&self, key: &ContentHash) -> String {
        format!("mem://{}", key)
    }

    fn list(&self) -> Result<Vec<ContentHash>> {
        let objects = self.objects.read();
        Ok(objects.keys().copied().collect())
    }

    fn stats(&self) -> Result<StorageStats> {
        let objects = self.objects.read();
        Ok(StorageStats {
            object_count: objects.len() as u64,
            bytes_used: self.bytes_used.load(Ordering::SeqCst),
            writes: self.writes.load(Ordering::Relaxed),
            dedup_hits: self.dedup_hits.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
        })
    }
}
