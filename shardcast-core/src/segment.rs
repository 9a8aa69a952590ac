//! Segment and fragment types
//!
//! Segments are the unit of hashing and erasure coding: fixed-size,
//! contiguous byte ranges of a file. Fragments are the erasure-coded
//! shards of one segment and the unit of network distribution.

use crate::error::{Result, ShardcastError};
use crate::hash::ContentHash;
use crate::{MAX_SEGMENT_SIZE, MIN_SEGMENT_SIZE};
use serde::{Deserialize, Serialize};

/// One fixed-size slice of a file, stored once in scratch storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Position within the file (byte order)
    pub index: u32,

    /// Blake3 hash of the zero-padded segment bytes
    pub hash: ContentHash,

    /// Number of file bytes actually present (the unpadded length)
    pub len: usize,

    /// Segment size the bytes are padded to before hashing and encoding
    pub padded_len: usize,

    /// Where scratch storage keeps the segment bytes
    pub location: String,
}

impl Segment {
    /// Whether this segment carries zero padding
    pub fn is_padded(&self) -> bool {
        self.len < self.padded_len
    }

    /// Rebuild the padded segment from stored bytes and check it against `hash`
    ///
    /// Identical padded segments share one scratch object, so the stored
    /// bytes may be a shorter or longer zero-trimmed variant of this
    /// segment; the hash check is what decides.
    pub fn pad(&self, raw: &[u8]) -> Result<Vec<u8>> {
        if raw.len() > self.padded_len {
            return Err(ShardcastError::Storage(format!(
                "segment {} stored with {} bytes, more than its padded size {}",
                self.index,
                raw.len(),
                self.padded_len
            )));
        }
        let mut padded = Vec::with_capacity(self.padded_len);
        padded.extend_from_slice(raw);
        padded.resize(self.padded_len, 0);

        if !self.hash.verify(&padded) {
            return Err(ShardcastError::Storage(format!(
                "segment {} failed its hash check",
                self.index
            )));
        }
        Ok(padded)
    }
}

/// One erasure-coded shard of a segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// Shard index within the parent segment (data shards first)
    pub index: u8,

    /// Blake3 hash of the shard bytes, also its scratch-storage key
    pub hash: ContentHash,

    /// Shard size in bytes
    pub size: usize,

    /// Whether this is a parity shard
    pub is_parity: bool,
}

/// A segment together with the fragments produced from it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub segment: Segment,
    pub fragments: Vec<Fragment>,
}

impl SegmentRecord {
    pub fn fragment_hashes(&self) -> Vec<ContentHash> {
        self.fragments.iter().map(|f| f.hash).collect()
    }
}

/// Number of segments needed to cover `file_size` bytes
pub fn segment_count(file_size: u64, segment_size: usize) -> u64 {
    file_size.div_ceil(segment_size as u64)
}

/// Check a configured segment size against the supported range
pub fn validate_segment_size(segment_size: usize) -> Result<()> {
    if !(MIN_SEGMENT_SIZE..=MAX_SEGMENT_SIZE).contains(&segment_size) {
        return Err(ShardcastError::Configuration(format!(
            "segment size {} outside {}..={}",
            segment_size, MIN_SEGMENT_SIZE, MAX_SEGMENT_SIZE
        )));
    }
    Ok(())
}
