//! On-disk scratch store
//!
//! Objects live as flat files named by their hex hash under the scratch
//! directory. A write goes to a uniquely named temp file in the same
//! directory, is fsynced, then linked into place with a no-clobber
//! persist. The final name therefore either does not exist or holds a
//! complete object; a crash mid-write leaves only a `.tmp-*` file.

use crate::backend::{PutOutcome, ScratchStore, StorageStats};
use crate::StorageConfig;
use bytes::Bytes;
use shardcast_core::error::Result;
use shardcast_core::hash::ContentHash;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

const TEMP_PREFIX: &str = ".tmp-";

/// Filesystem-backed scratch store
pub struct FsStore {
    root: PathBuf,
    sync_writes: bool,

    reads: AtomicU64,
    writes: AtomicU64,
    dedup_hits: AtomicU64,
}

impl FsStore {
    /// Open (creating if needed) a scratch directory
    pub fn open(config: StorageConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        info!(path = %config.path.display(), sync = config.sync_writes, "Opened scratch store");
        Ok(Self {
            root: config.path,
            sync_writes: config.sync_writes,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            dedup_hits: AtomicU64::new(0),
        })
    }

    /// Open with default settings at `path`
    pub fn open_default(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(StorageConfig::new(path.as_ref()))
    }

    /// Scratch directory root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path an object with `key` is stored at
    pub fn object_path(&self, key: &ContentHash) -> PathBuf {
        self.root.join(key.to_hex())
    }

    /// Make a completed rename durable
    fn sync_dir(&self) -> Result<()> {
        #[cfg(unix)]
        fs::File::open(&self.root)?.sync_all()?;
        Ok(())
    }
}

impl ScratchStore for FsStore {
    fn put_if_absent(&self, key: &ContentHash, data: &[u8]) -> Result<PutOutcome> {
        let path = self.object_path(key);
        if path.exists() {
            self.dedup_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(PutOutcome::AlreadyPresent);
        }

        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&self.root)?;
        tmp.write_all(data)?;
        tmp.flush()?;
        if self.sync_writes {
            tmp.as_file().sync_all()?;
        }

        match tmp.persist_noclobber(&path) {
            Ok(_) => {
                if self.sync_writes {
                    self.sync_dir()?;
                }
                self.writes.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, size = data.len(), "Scratch object written");
                Ok(PutOutcome::Created)
            }
            // Lost the race to a concurrent writer of the same key; the temp file is dropped
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                self.dedup_hits.fetch_add(1, Ordering::Relaxed);
                Ok(PutOutcome::AlreadyPresent)
            }
            Err(e) => Err(e.error.into()),
        }
    }

    fn get(&self, key: &ContentHash) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        match fs::read(self.object_path(key)) {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, key: &ContentHash) -> Result<bool> {
        Ok(self.object_path(key).is_file())
    }

    fn location(&self, key: &ContentHash) -> String {
        self.object_path(key).display().to_string()
    }

    fn list(&self) -> Result<Vec<ContentHash>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with(TEMP_PREFIX) {
                continue;
            }
            match ContentHash::from_hex(name) {
                Ok(key) => keys.push(key),
                Err(_) => warn!(file = name, "Ignoring foreign file in scratch directory"),
            }
        }
        Ok(keys)
    }

    fn stats(&self) -> Result<StorageStats> {
        let keys = self.list()?;
        let mut bytes_used = 0;
        for key in &keys {
            bytes_used += fs::metadata(self.object_path(key))?.len();
        }
        Ok(StorageStats {
            object_count: keys.len() as u64,
            bytes_used,
            writes: self.writes.load(Ordering::Relaxed),
            dedup_hits: self.dedup_hits.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, FsStore) {
        let dir = TempDir::new().unwrap();
        let store = FsStore::open(StorageConfig::new(dir.path())).unwrap();
        (dir, store)
    }

    #[test]
    fn test_put_get() {
        let (_dir, store) = open_store();
        let key = ContentHash::compute(b"segment");

        assert_eq!(store.put_if_absent(&key, b"segment").unwrap(), PutOutcome::Created);
        assert_eq!(store.get(&key).unwrap().unwrap().as_ref(), b"segment");
        assert!(store.exists(&key).unwrap());
        assert!(store.object_path(&key).is_file());
        assert!(store
            .location(&key)
            .ends_with(&key.to_hex()));
    }

    #[test]
    fn test_missing_object() {
        let (_dir, store) = open_store();
        let key = ContentHash::compute(b"nothing");
        assert!(store.get(&key).unwrap().is_none());
        assert!(!store.exists(&key).unwrap());
    }

    #[test]
    fn test_dedup_leaves_single_object() {
        let (_dir, store) = open_store();
        let key = ContentHash::compute(b"same");

        assert_eq!(store.put_if_absent(&key, b"same").unwrap(), PutOutcome::Created);
        assert_eq!(
            store.put_if_absent(&key, b"same").unwrap(),
            PutOutcome::AlreadyPresent
        );

        let stats = store.stats().unwrap();
        assert_eq!(stats.object_count, 1);
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.dedup_hits, 1);
        assert_eq!(store.get(&key).unwrap().unwrap().as_ref(), b"same");
    }

    #[test]
    fn test_concurrent_writers_same_key() {
        let (dir, store) = open_store();
        let store = Arc::new(store);
        let key = ContentHash::compute(b"race");
        let payload = vec![0x5Au8; 256 * 1024];

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let payload = payload.clone();
                std::thread::spawn(move || store.put_if_absent(&key, &payload).unwrap())
            })
            .collect();

        let outcomes: Vec<PutOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let created = outcomes.iter().filter(|o| **o == PutOutcome::Created).count();
        assert!(created >= 1);

        // Exactly one complete object and no leftover temp files
        assert_eq!(store.list().unwrap(), vec![key]);
        assert_eq!(store.get(&key).unwrap().unwrap().as_ref(), payload.as_slice());
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .starts_with(TEMP_PREFIX)
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_list_ignores_foreign_files() {
        let (dir, store) = open_store();
        let key = ContentHash::compute(b"listed");
        store.put_if_absent(&key, b"listed").unwrap();
        std::fs::write(dir.path().join("README"), b"not an object").unwrap();

        assert_eq!(store.list().unwrap(), vec![key]);
    }

    #[test]
    fn test_unsynced_writes() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::open(StorageConfig::new(dir.path()).with_sync_writes(false)).unwrap();
        let key = ContentHash::compute(b"fast");
        assert_eq!(store.put_if_absent(&key, b"fast").unwrap(), PutOutcome::Created);
        assert_eq!(store.stats().unwrap().bytes_used, 4);
    }
}
