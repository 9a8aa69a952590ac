//! Shardcast Core Library
//!
//! Core abstractions for the shardcast upload pipeline.
//! This crate provides:
//! - Blake3 content hashes used as segment, fragment and file identifiers
//! - Segment, fragment and manifest types
//! - Reed-Solomon erasure coding (2 data + 1 parity shards by default)
//! - The Merkle assembler that derives a file's root identifier
//! - Common error handling

pub mod erasure;
pub mod error;
pub mod hash;
pub mod manifest;
pub mod merkle;
pub mod segment;

pub use erasure::{ErasureConfig, ErasureEncoder, SegmentCodec, ShardData};
pub use error::{Result, ShardcastError};
pub use hash::{ContentHash, OwnerId, RootId};
pub use manifest::{validate_bucket_name, FileMeta, Manifest, SegmentEntry};
pub use merkle::{Blake3HashTree, HashTree};
pub use segment::{segment_count, validate_segment_size, Fragment, Segment, SegmentRecord};

/// Default erasure coding configuration
/// - 2 data shards: minimum required to reconstruct a segment
/// - 1 parity shard: tolerates the loss of one fragment per segment
/// - 3 fragments per segment, one storage node per segment
pub const DATA_SHARDS: usize = 2;
pub const PARITY_SHARDS: usize = 1;
pub const TOTAL_SHARDS: usize = DATA_SHARDS + PARITY_SHARDS;

/// Segment size constants
pub const MIN_SEGMENT_SIZE: usize = 1024; // 1 KB
pub const DEFAULT_SEGMENT_SIZE: usize = 16 * 1024 * 1024; // 16 MB
pub const MAX_SEGMENT_SIZE: usize = 256 * 1024 * 1024; // 256 MB
