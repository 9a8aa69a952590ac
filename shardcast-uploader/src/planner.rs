//! Upload planner
//!
//! The local half of an upload: segmenting, hashing and encoding. Produces
//! the manifest that will be registered, without talking to the ledger.

use crate::config::UploaderConfig;
use crate::encoder::EncoderAdapter;
use crate::error::{Result, UploadError};
use crate::segmenter::{SegmentedFile, Segmenter};
use shardcast_core::erasure::ErasureEncoder;
use shardcast_core::error::ShardcastError;
use shardcast_core::hash::{OwnerId, RootId};
use shardcast_core::manifest::{validate_bucket_name, FileMeta, Manifest};
use shardcast_core::merkle::{Blake3HashTree, HashTree};
use shardcast_core::segment::{Segment, SegmentRecord};
use shardcast_storage::ScratchStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// What the caller asks to upload
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub owner: OwnerId,
    pub path: PathBuf,
    /// Display name recorded in the manifest
    pub file_name: String,
    pub bucket: String,
}

impl UploadRequest {
    pub fn new(
        owner: OwnerId,
        path: impl Into<PathBuf>,
        file_name: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            owner,
            path: path.into(),
            file_name: file_name.into(),
            bucket: bucket.into(),
        }
    }

    /// Reject requests that can never succeed
    pub fn validate(&self) -> Result<()> {
        if !validate_bucket_name(&self.bucket) {
            return Err(UploadError::InvalidBucketName(self.bucket.clone()));
        }
        Ok(())
    }
}

/// A manifest together with the encoded segments it describes
#[derive(Debug, Clone)]
pub struct PlannedUpload {
    pub manifest: Manifest,
    pub records: Vec<SegmentRecord>,
}

/// Runs the local stages of an upload
pub struct Planner {
    segmenter: Arc<Segmenter>,
    encoder: Arc<EncoderAdapter>,
    hash_tree: Arc<dyn HashTree>,
}

impl Planner {
    pub fn new(
        segmenter: Arc<Segmenter>,
        encoder: Arc<EncoderAdapter>,
        hash_tree: Arc<dyn HashTree>,
    ) -> Self {
        Self {
            segmenter,
            encoder,
            hash_tree,
        }
    }

    /// Reed-Solomon codec and blake3 tree, sized from `config`
    pub fn from_config(config: &UploaderConfig, store: Arc<dyn ScratchStore>) -> Result<Self> {
        let codec = Arc::new(ErasureEncoder::with_config(config.erasure_config()?)?);
        let segmenter = Segmenter::new(store.clone(), config.segment.size)?;
        let encoder = EncoderAdapter::new(codec, store, config.encode_workers)?;
        Ok(Self::new(
            Arc::new(segmenter),
            Arc::new(encoder),
            Arc::new(Blake3HashTree),
        ))
    }

    pub fn fragments_per_segment(&self) -> usize {
        self.encoder.fragments_per_segment()
    }

    /// Split the file into stored segments
    pub async fn segment(&self, path: PathBuf) -> Result<SegmentedFile> {
        let segmenter = self.segmenter.clone();
        let segmented = tokio::task::spawn_blocking(move || segmenter.segment_file(&path))
            .await
            .map_err(|e| ShardcastError::Internal(format!("segmenting task: {}", e)))??;
        Ok(segmented)
    }

    /// Root identifier over the segment hashes
    pub fn root(&self, segments: &[Segment]) -> Result<RootId> {
        let hashes: Vec<_> = segments.iter().map(|s| s.hash).collect();
        Ok(self.hash_tree.root_id(&hashes)?)
    }

    /// Erasure-code the segments
    pub async fn encode(&self, segments: Vec<Segment>) -> Result<Vec<SegmentRecord>> {
        let encoder = self.encoder.clone();
        let records = tokio::task::spawn_blocking(move || encoder.encode_all(segments))
            .await
            .map_err(|e| ShardcastError::Internal(format!("encoding task: {}", e)))??;
        Ok(records)
    }

    /// Run all local stages and build the manifest
    pub async fn plan(&self, request: &UploadRequest) -> Result<PlannedUpload> {
        request.validate()?;

        let segmented = self.segment(request.path.clone()).await?;
        let root = self.root(&segmented.segments)?;
        let records = self.encode(segmented.segments).await?;

        let manifest = Manifest::new(root, file_meta(request, segmented.file_size), &records);
        info!(
            root = %root,
            segments = manifest.segment_count(),
            fragments = manifest.fragment_count(),
            "Upload planned"
        );
        Ok(PlannedUpload { manifest, records })
    }
}

pub(crate) fn file_meta(request: &UploadRequest, size: u64) -> FileMeta {
    FileMeta {
        owner: request.owner,
        file_name: request.file_name.clone(),
        bucket: request.bucket.clone(),
        size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardcast_storage::MemoryStore;
    use std::io::Write;

    fn planner() -> Planner {
        let mut config = UploaderConfig::default();
        config.segment.size = 64 * 1024;
        config.encode_workers = 2;
        Planner::from_config(&config, Arc::new(MemoryStore::new())).unwrap()
    }

    fn request(path: impl Into<PathBuf>, bucket: &str) -> UploadRequest {
        UploadRequest::new(OwnerId::from_bytes([9; 32]), path, "report.pdf", bucket)
    }

    #[tokio::test]
    async fn test_plan_is_deterministic() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 97) as u8).collect();
        file.write_all(&data).unwrap();

        let planner = planner();
        let first = planner.plan(&request(file.path(), "reports")).await.unwrap();
        let second = planner.plan(&request(file.path(), "reports")).await.unwrap();

        assert_eq!(first.manifest, second.manifest);
        assert_eq!(first.manifest.segment_count(), 4);
        assert_eq!(first.manifest.fragment_count(), 12);
        assert_eq!(first.manifest.file.size, 200_000);
        assert_eq!(first.manifest.file.file_name, "report.pdf");
    }

    #[tokio::test]
    async fn test_bad_bucket_rejected_before_reading() {
        let planner = planner();
        let result = planner
            .plan(&request("/does/not/exist", "Bad_Bucket"))
            .await;
        assert!(matches!(result, Err(UploadError::InvalidBucketName(_))));
    }

    #[tokio::test]
    async fn test_empty_file_fails_hashing() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let result = planner().plan(&request(file.path(), "reports")).await;
        assert!(matches!(
            result,
            Err(UploadError::Core(ShardcastError::EmptyInput))
        ));
    }
}
