//! Upload manifest
//!
//! The manifest is what gets registered with the ledger: the file's root
//! identifier, its metadata, and for every segment (in file order) the
//! ordered list of fragment hashes. It is immutable once built.

use crate::error::Result;
use crate::hash::{ContentHash, OwnerId, RootId};
use crate::segment::SegmentRecord;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

pub const MIN_BUCKET_NAME_LEN: usize = 3;
pub const MAX_BUCKET_NAME_LEN: usize = 63;

/// Metadata describing the uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub owner: OwnerId,
    pub file_name: String,
    pub bucket: String,
    /// Declared size of the original file in bytes
    pub size: u64,
}

/// One segment's entry in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentEntry {
    pub segment_hash: ContentHash,
    /// Fragment hashes in shard index order
    pub fragment_hashes: Vec<ContentHash>,
}

/// The registered description of a file's segment/fragment structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub root: RootId,
    pub file: FileMeta,
    pub segments: Vec<SegmentEntry>,
}

impl Manifest {
    /// Build a manifest from encoded segments, preserving their order
    pub fn new(root: RootId, file: FileMeta, records: &[SegmentRecord]) -> Self {
        let segments = records
            .iter()
            .map(|r| SegmentEntry {
                segment_hash: r.segment.hash,
                fragment_hashes: r.fragment_hashes(),
            })
            .collect();
        Self {
            root,
            file,
            segments,
        }
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn fragment_count(&self) -> usize {
        self.segments.iter().map(|s| s.fragment_hashes.len()).sum()
    }

    /// Digest of the canonical (bincode) encoding of the manifest
    ///
    /// Two manifests are the same submission iff their fingerprints match.
    pub fn fingerprint(&self) -> Result<ContentHash> {
        let encoded = bincode::serialize(self)?;
        Ok(ContentHash::compute(&encoded))
    }
}

/// Check a bucket name against the ledger's naming rule
///
/// 3..=63 characters of lowercase ASCII letters, digits, '.' and '-';
/// starts and ends with a letter or digit; no ".."; not an IPv4 address.
pub fn validate_bucket_name(name: &str) -> bool {
    if name.len() < MIN_BUCKET_NAME_LEN || name.len() > MAX_BUCKET_NAME_LEN {
        return false;
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'-')
    {
        return false;
    }
    let edge_ok = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let bytes = name.as_bytes();
    if !edge_ok(bytes[0]) || !edge_ok(bytes[bytes.len() - 1]) {
        return false;
    }
    if name.contains("..") {
        return false;
    }
    name.parse::<Ipv4Addr>().is_err()
}
