//! Shardcast Scratch Storage
//!
//! Provides the content-addressed store segments and fragments are staged
//! in before distribution:
//! - `ScratchStore` trait with an atomic create-if-absent write
//! - `FsStore` for on-disk scratch directories
//! - `MemoryStore` for testing

pub mod backend;
pub mod fs;
pub mod memory;

pub use backend::{PutOutcome, ScratchStore, StorageStats};
pub use fs::FsStore;
pub use memory::MemoryStore;

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Path to the scratch directory
    pub path: std::path::PathBuf,

    /// fsync objects (and the directory) before a write returns
    pub sync_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: std::path::PathBuf::from("./shardcast_scratch"),
            sync_writes: true,
        }
    }
}

impl StorageConfig {
    /// Create a new storage config with the given path
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Enable/disable fsync on write
    pub fn with_sync_writes(mut self, enabled: bool) -> Self {
        self.sync_writes = enabled;
        self
    }
}
