//! Shardcast Uploader Library
//!
//! Turns a local file into erasure-coded fragments held by storage nodes,
//! with the ledger deciding placement:
//! - Segmenting into content-addressed scratch objects
//! - Hashing segment hashes into the file's root identifier
//! - Encoding each segment into data and parity fragments
//! - Registering the manifest and waiting for placement
//! - Distributing fragments to the placed nodes
//!
//! # Usage
//!
//! ```ignore
//! use shardcast_uploader::{UploadRequest, Uploader, UploaderConfig};
//!
//! let config = UploaderConfig::load_or_default("shardcast.toml").with_env_overrides();
//! let uploader = Uploader::new(&config, ledger, transport, store)?;
//! let request = UploadRequest::new(owner, "./video.mp4", "video.mp4", "media");
//! let receipt = uploader.put_file(&request, &CancellationToken::new()).await?;
//! println!("stored as {}", receipt.root);
//! ```

pub mod config;
pub mod coordinator;
pub mod distributor;
pub mod encoder;
pub mod error;
pub mod ledger;
pub mod pipeline;
pub mod planner;
pub mod retry;
pub mod segmenter;

// Re-export main types
pub use config::{ConfigError, UploaderConfig};
pub use coordinator::{Claim, ManifestRegistry, OrderCoordinator, Placement};
pub use distributor::{DistributionReport, Distributor};
pub use encoder::EncoderAdapter;
pub use error::{Result, UploadError};
pub use ledger::{GuardedLedger, Ledger, LedgerError, NodeId, OrderHandle, StorageOrder};
pub use pipeline::{UploadProgress, UploadReceipt, UploadStage, Uploader};
pub use planner::{PlannedUpload, Planner, UploadRequest};
pub use retry::{Backoff, RetryPolicy};
pub use segmenter::{SegmentedFile, Segmenter};
pub use tokio_util::sync::CancellationToken;
