//! Segmenter
//!
//! Splits a file into fixed-size segments in byte order. Each segment is
//! hashed over its zero-padded bytes and its raw bytes are written to
//! scratch storage through the store's atomic create-if-absent, so equal
//! segments are stored once and a crash never leaves a torn object.

use shardcast_core::error::{Result, ShardcastError};
use shardcast_core::hash::ContentHash;
use shardcast_core::segment::{segment_count, validate_segment_size, Segment};
use shardcast_storage::{PutOutcome, ScratchStore};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Output of segmenting one file
#[derive(Debug, Clone)]
pub struct SegmentedFile {
    /// Segments in file order
    pub segments: Vec<Segment>,
    /// File size in bytes
    pub file_size: u64,
    /// Segments newly written to scratch storage
    pub created: usize,
    /// Segments already present in scratch storage
    pub deduplicated: usize,
}

impl SegmentedFile {
    pub fn segment_hashes(&self) -> Vec<ContentHash> {
        self.segments.iter().map(|s| s.hash).collect()
    }
}

/// Splits files into content-addressed segments
pub struct Segmenter {
    store: Arc<dyn ScratchStore>,
    segment_size: usize,
}

impl Segmenter {
    pub fn new(store: Arc<dyn ScratchStore>, segment_size: usize) -> Result<Self> {
        validate_segment_size(segment_size)?;
        Ok(Self {
            store,
            segment_size,
        })
    }

    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    /// Segment the file at `path`. Blocking.
    #[instrument(skip(self), fields(segment_size = self.segment_size))]
    pub fn segment_file(&self, path: &Path) -> Result<SegmentedFile> {
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(ShardcastError::NotAFile(path.to_path_buf()));
        }

        let mut file = File::open(path)?;
        let segmented = self.segment_reader(&mut file, metadata.len())?;

        info!(
            path = %path.display(),
            file_size = segmented.file_size,
            segments = segmented.segments.len(),
            created = segmented.created,
            deduplicated = segmented.deduplicated,
            "File segmented"
        );
        Ok(segmented)
    }

    /// Segment `file_size` bytes from `reader`
    ///
    /// Fails with `ShortRead` if the input ends before `file_size` bytes.
    pub fn segment_reader(&self, reader: &mut impl Read, file_size: u64) -> Result<SegmentedFile> {
        let count = segment_count(file_size, self.segment_size);

        let mut buffer = vec![0u8; self.segment_size];
        let mut segments = Vec::with_capacity(count as usize);
        let mut created = 0;
        let mut deduplicated = 0;

        for index in 0..count {
            let offset = index * self.segment_size as u64;
            let expected = (file_size - offset).min(self.segment_size as u64) as usize;

            let read = read_full(&mut *reader, &mut buffer[..expected])?;
            if read < expected {
                return Err(ShardcastError::ShortRead {
                    index: index as usize,
                    read,
                    expected,
                });
            }
            buffer[expected..].fill(0);

            let hash = ContentHash::compute(&buffer);
            match self.store.put_if_absent(&hash, &buffer[..expected])? {
                PutOutcome::Created => created += 1,
                PutOutcome::AlreadyPresent => deduplicated += 1,
            }

            debug!(index, hash = %hash, len = expected, "Segment stored");
            segments.push(Segment {
                index: index as u32,
                hash,
                len: expected,
                padded_len: self.segment_size,
                location: self.store.location(&hash),
            });
        }

        Ok(SegmentedFile {
            segments,
            file_size,
            created,
            deduplicated,
        })
    }
}

/// Fill `buf` from `reader`, stopping early only at end of input
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
