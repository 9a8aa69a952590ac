//! Reed-Solomon Erasure Coding
//!
//! Implements (k=2, m=1) erasure coding by default where:
//! - k=2 data shards (minimum required to reconstruct a segment)
//! - m=1 parity shard (redundancy)
//! - Every segment becomes 3 fragments, data shards first
//!
//! The shard order produced here is load-bearing: fragment indices are
//! registered with the ledger and must line up with what gets sent.

use crate::error::{Result, ShardcastError};
use crate::{DATA_SHARDS, PARITY_SHARDS};
use bytes::Bytes;
use rayon::prelude::*;
use reed_solomon_erasure::galois_8::ReedSolomon;
use serde::{Deserialize, Serialize};

/// Erasure coding configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErasureConfig {
    /// Number of data shards (k)
    pub data_shards: usize,
    /// Number of parity shards (m)
    pub parity_shards: usize,
}

impl Default for ErasureConfig {
    fn default() -> Self {
        Self {
            data_shards: DATA_SHARDS,
            parity_shards: PARITY_SHARDS,
        }
    }
}

impl ErasureConfig {
    /// Create a new erasure config
    pub fn new(data_shards: usize, parity_shards: usize) -> Result<Self> {
        if data_shards == 0 {
            return Err(ShardcastError::Configuration(
                "data_shards must be > 0".to_string(),
            ));
        }
        if parity_shards == 0 {
            return Err(ShardcastError::Configuration(
                "parity_shards must be > 0".to_string(),
            ));
        }
        // Shard indices travel as u8 on the wire
        if data_shards + parity_shards > u8::MAX as usize {
            return Err(ShardcastError::Configuration(format!(
                "at most {} shards supported, got {}",
                u8::MAX,
                data_shards + parity_shards
            )));
        }
        Ok(Self {
            data_shards,
            parity_shards,
        })
    }

    /// Total number of shards
    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    /// Storage overhead ratio (parity/data)
    pub fn overhead_ratio(&self) -> f64 {
        self.parity_shards as f64 / self.data_shards as f64
    }

    /// Maximum number of failures that can be tolerated
    pub fn max_failures(&self) -> usize {
        self.parity_shards
    }

    /// Size of each shard for a segment of `segment_size` bytes
    pub fn shard_size(&self, segment_size: usize) -> usize {
        segment_size.div_ceil(self.data_shards)
    }
}

/// A single shard of erasure-coded data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardData {
    /// Shard index (0 to total_shards-1)
    pub index: u8,
    /// Shard data
    pub data: Bytes,
    /// Whether this is a parity shard
    pub is_parity: bool,
}

impl ShardData {
    /// Create a new shard
    pub fn new(index: u8, data: Bytes, is_parity: bool) -> Self {
        Self {
            index,
            data,
            is_parity,
        }
    }

    /// Get shard size
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Erasure codec applied to one padded segment
///
/// Implementations must return exactly `shard_count()` shards, data shards
/// first, in shard index order, and must be deterministic.
pub trait SegmentCodec: Send + Sync {
    /// Number of shards produced per segment
    fn shard_count(&self) -> usize;

    /// Encode one segment into shards
    fn encode_segment(&self, segment: &[u8]) -> Result<Vec<ShardData>>;
}

/// Reed-Solomon encoder
pub struct ErasureEncoder {
    config: ErasureConfig,
    encoder: ReedSolomon,
}

impl ErasureEncoder {
    /// Create a new encoder with default configuration (2, 1)
    pub fn new() -> Result<Self> {
        Self::with_config(ErasureConfig::default())
    }

    /// Create a new encoder with custom configuration
    pub fn with_config(config: ErasureConfig) -> Result<Self> {
        let encoder = ReedSolomon::new(config.data_shards, config.parity_shards)?;
        Ok(Self { config, encoder })
    }

    /// Get the erasure configuration
    pub fn config(&self) -> &ErasureConfig {
        &self.config
    }

    /// Encode data into shards
    ///
    /// Returns a vector of shards (data + parity)
    pub fn encode(&self, data: &[u8]) -> Result<Vec<ShardData>> {
        let shard_size = self.checked_shard_size(data.len())?;

        // Pad data to be evenly divisible by data_shards
        let padded_size = shard_size * self.config.data_shards;
        let mut padded_data = data.to_vec();
        padded_data.resize(padded_size, 0);

        // Split into data shards
        let mut shards: Vec<Vec<u8>> = padded_data.chunks(shard_size).map(|c| c.to_vec()).collect();

        // Add empty parity shards
        for _ in 0..self.config.parity_shards {
            shards.push(vec![0u8; shard_size]);
        }

        // Encode (fills in parity shards)
        self.encoder.encode(&mut shards)?;

        Ok(self.into_shard_data(shards))
    }

    /// Encode data into shards using parallel processing
    ///
    /// More efficient for large segments (> 1MB)
    pub fn encode_parallel(&self, data: &[u8]) -> Result<Vec<ShardData>> {
        let shard_size = self.checked_shard_size(data.len())?;

        // Pad data
        let padded_size = shard_size * self.config.data_shards;
        let mut padded_data = data.to_vec();
        padded_data.resize(padded_size, 0);

        // Split into data shards (parallel)
        let mut shards: Vec<Vec<u8>> = padded_data
            .par_chunks(shard_size)
            .map(|c| c.to_vec())
            .collect();

        // Add parity shards
        for _ in 0..self.config.parity_shards {
            shards.push(vec![0u8; shard_size]);
        }

        // Encode
        self.encoder.encode(&mut shards)?;

        Ok(self.into_shard_data(shards))
    }

    /// Verify that shards are consistent
    pub fn verify_shards(&self, shards: &[ShardData]) -> Result<bool> {
        if shards.len() != self.config.total_shards() {
            return Ok(false);
        }

        // Check all shards have same size
        let expected_size = shards.first().map(|s| s.size()).unwrap_or(0);
        if !shards.iter().all(|s| s.size() == expected_size) {
            return Ok(false);
        }

        let shard_refs: Vec<&[u8]> = shards.iter().map(|s| s.data.as_ref()).collect();

        // Verify parity shards are correct
        Ok(self.encoder.verify(&shard_refs)?)
    }

    /// Shard size for `data_size` bytes, rejecting input the coder cannot take
    fn checked_shard_size(&self, data_size: usize) -> Result<usize> {
        if data_size == 0 {
            return Err(ShardcastError::Encode("cannot encode an empty segment".to_string()));
        }
        Ok(self.config.shard_size(data_size))
    }

    fn into_shard_data(&self, shards: Vec<Vec<u8>>) -> Vec<ShardData> {
        shards
            .into_iter()
            .enumerate()
            .map(|(i, shard_data)| {
                let is_parity = i >= self.config.data_shards;
                ShardData::new(i as u8, Bytes::from(shard_data), is_parity)
            })
            .collect()
    }
}

impl SegmentCodec for ErasureEncoder {
    fn shard_count(&self) -> usize {
        self.config.total_shards()
    }

    fn encode_segment(&self, segment: &[u8]) -> Result<Vec<ShardData>> {
        if segment.len() >= 1024 * 1024 {
            self.encode_parallel(segment)
        } else {
            self.encode(segment)
        }
    }
}
