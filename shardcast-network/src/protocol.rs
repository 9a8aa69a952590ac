//! Fragment wire protocol
//!
//! Every message travels as one length-delimited frame whose payload is the
//! bincode encoding of the message. A client writes a [`FragmentPush`] and
//! waits for the node's [`FragmentAck`] before writing the next one.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use shardcast_core::error::Result;
use shardcast_core::hash::{ContentHash, RootId};
use tokio_util::codec::LengthDelimitedCodec;

/// Wire protocol version carried in every push
pub const PROTOCOL_VERSION: u16 = 1;

/// Default upper bound on a single frame (64 MB)
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Build the frame codec: u32 big-endian length prefix, bounded frame size
pub fn codec(max_frame_len: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_type::<u32>()
        .max_frame_length(max_frame_len)
        .new_codec()
}

/// One fragment sent to the node that holds it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentPush {
    /// Protocol version
    pub version: u16,
    /// File the fragment belongs to
    pub root: RootId,
    /// Segment position within the file
    pub segment_index: u32,
    /// Fragment position within the segment
    pub fragment_index: u8,
    /// Content hash of `data`
    pub fragment_hash: ContentHash,
    /// Fragment bytes
    pub data: Bytes,
}

impl FragmentPush {
    /// Create a push for `data`, hashing it
    pub fn new(root: RootId, segment_index: u32, fragment_index: u8, data: Bytes) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            root,
            segment_index,
            fragment_index,
            fragment_hash: ContentHash::compute(&data),
            data,
        }
    }

    /// Check that `data` matches the declared hash
    pub fn verify(&self) -> bool {
        self.fragment_hash.verify(&self.data)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Node's answer to a [`FragmentPush`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentAck {
    /// Hash of the fragment this ack answers
    pub fragment_hash: ContentHash,
    /// Whether the node stored the fragment
    pub accepted: bool,
    /// Reason for a rejection
    pub error: Option<String>,
}

impl FragmentAck {
    pub fn accepted(fragment_hash: ContentHash) -> Self {
        Self {
            fragment_hash,
            accepted: true,
            error: None,
        }
    }

    pub fn rejected(fragment_hash: ContentHash, reason: impl Into<String>) -> Self {
        Self {
            fragment_hash,
            accepted: false,
            error: Some(reason.into()),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
