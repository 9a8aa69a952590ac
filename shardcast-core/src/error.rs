//! Error types for shardcast
//!
//! Provides a unified error type for the local stages of an upload:
//! reading, scratch storage, hashing, encoding and fragment transport.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for shardcast operations
pub type Result<T> = std::result::Result<T, ShardcastError>;

/// Unified error type for shardcast
#[derive(Error, Debug)]
pub enum ShardcastError {
    // ===== Input Errors =====
    #[error("Not a file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("Short read at segment {index}: got {read} bytes, expected {expected}")]
    ShortRead {
        index: usize,
        read: usize,
        expected: usize,
    },

    #[error("Hash tree needs at least one leaf")]
    EmptyInput,

    // ===== Erasure Coding Errors =====
    #[error("Erasure coding error: {0}")]
    Encode(String),

    // ===== Identifier Errors =====
    #[error("Invalid content hash: {0}")]
    InvalidHash(String),

    #[error("Invalid owner id: {0}")]
    InvalidOwner(String),

    // ===== Storage Errors =====
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Scratch object not found: {0}")]
    ObjectNotFound(String),

    // ===== Network Errors =====
    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection timeout to {peer}")]
    ConnectionTimeout { peer: String },

    #[error("Invalid node address: {0}")]
    InvalidAddress(String),

    #[error("Fragment rejected by {peer}: {reason}")]
    FragmentRejected { peer: String, reason: String },

    // ===== I/O Errors =====
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ===== Serialization Errors =====
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ===== Configuration Errors =====
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ===== Generic Errors =====
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reed_solomon_erasure::Error> for ShardcastError {
    fn from(err: reed_solomon_erasure::Error) -> Self {
        ShardcastError::Encode(err.to_string())
    }
}

impl From<bincode::Error> for ShardcastError {
    fn from(err: bincode::Error) -> Self {
        ShardcastError::Serialization(err.to_string())
    }
}
