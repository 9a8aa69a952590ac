//! Encoder adapter
//!
//! Reads each stored segment back, restores its padding, erasure-codes it
//! and writes every fragment to scratch storage under its content hash.
//! Segments are encoded in parallel on a dedicated, bounded worker pool;
//! results keep segment order and fragments keep shard index order.

use rayon::prelude::*;
use shardcast_core::erasure::SegmentCodec;
use shardcast_core::error::{Result, ShardcastError};
use shardcast_core::hash::ContentHash;
use shardcast_core::segment::{Fragment, Segment, SegmentRecord};
use shardcast_storage::ScratchStore;
use std::sync::Arc;
use tracing::{debug, info};

/// Runs the erasure codec over stored segments
pub struct EncoderAdapter {
    codec: Arc<dyn SegmentCodec>,
    store: Arc<dyn ScratchStore>,
    pool: rayon::ThreadPool,
}

impl EncoderAdapter {
    pub fn new(
        codec: Arc<dyn SegmentCodec>,
        store: Arc<dyn ScratchStore>,
        workers: usize,
    ) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("shardcast-encode-{}", i))
            .build()
            .map_err(|e| ShardcastError::Internal(format!("encode pool: {}", e)))?;
        Ok(Self { codec, store, pool })
    }

    /// Fragments produced per segment
    pub fn fragments_per_segment(&self) -> usize {
        self.codec.shard_count()
    }

    /// Encode one stored segment. Blocking.
    pub fn encode_segment(&self, segment: &Segment) -> Result<Vec<Fragment>> {
        let raw = self
            .store
            .get(&segment.hash)?
            .ok_or_else(|| ShardcastError::ObjectNotFound(segment.location.clone()))?;
        let padded = segment.pad(&raw)?;

        let shards = self.codec.encode_segment(&padded)?;
        if shards.len() != self.codec.shard_count() {
            return Err(ShardcastError::Encode(format!(
                "codec produced {} shards for segment {}, expected {}",
                shards.len(),
                segment.index,
                self.codec.shard_count()
            )));
        }

        let mut fragments = Vec::with_capacity(shards.len());
        for shard in shards {
            let hash = ContentHash::compute(&shard.data);
            self.store.put_if_absent(&hash, &shard.data)?;
            fragments.push(Fragment {
                index: shard.index,
                hash,
                size: shard.size(),
                is_parity: shard.is_parity,
            });
        }
        fragments.sort_by_key(|f| f.index);

        debug!(
            segment = segment.index,
            fragments = fragments.len(),
            "Segment encoded"
        );
        Ok(fragments)
    }

    /// Encode all segments on the worker pool. Blocking.
    pub fn encode_all(&self, segments: Vec<Segment>) -> Result<Vec<SegmentRecord>> {
        let count = segments.len();
        let records = self.pool.install(|| {
            segments
                .into_par_iter()
                .map(|segment| {
                    let fragments = self.encode_segment(&segment)?;
                    Ok(SegmentRecord { segment, fragments })
                })
                .collect::<Result<Vec<_>>>()
        })?;

        info!(
            segments = count,
            fragments = count * self.codec.shard_count(),
            "Segments encoded"
        );
        Ok(records)
    }
}
