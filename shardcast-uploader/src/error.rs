//! Upload errors
//!
//! Every stage reports a typed failure up to the caller of the pipeline.

use crate::config::ConfigError;
use crate::ledger::{LedgerError, NodeId};
use shardcast_core::error::ShardcastError;
use shardcast_core::hash::{OwnerId, RootId};
use thiserror::Error;

/// Upload pipeline errors
#[derive(Error, Debug)]
pub enum UploadError {
    /// Local failure: I/O, scratch storage, hashing or encoding
    #[error(transparent)]
    Core(#[from] ShardcastError),

    /// Ledger failure surfaced unchanged
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Invalid bucket name: {0:?}")]
    InvalidBucketName(String),

    #[error("Owner {0} is not authorized to upload")]
    Unauthorized(OwnerId),

    #[error("Manifest registration rejected: {0}")]
    RegistrationRejected(String),

    #[error("Storage order for {root} not placed after {attempts} attempts")]
    OrderNotFoundAfterRetries { root: RootId, attempts: u32 },

    #[error("Placement for {root} assigns {assigned} nodes to {segments} segments")]
    PlacementIncomplete {
        root: RootId,
        assigned: usize,
        segments: usize,
    },

    #[error("Could not resolve node {node}: {reason}")]
    NodeUnresolved { node: NodeId, reason: String },

    #[error("Distribution failed at segment {segment}, fragment {fragment}: {source}")]
    DistributionFailed {
        segment: u32,
        fragment: u8,
        #[source]
        source: ShardcastError,
    },

    #[error("Root {0} is already registered with a different manifest")]
    ManifestConflict(RootId),

    #[error("Upload cancelled")]
    Cancelled,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, UploadError>;
