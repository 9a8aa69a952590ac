//! Ledger collaborator
//!
//! The consensus ledger records manifests and decides where each segment is
//! stored. This crate only needs a narrow slice of it, captured by the
//! [`Ledger`] trait. [`GuardedLedger`] wraps any implementation so a fault
//! inside a ledger call comes back as [`LedgerError::Transport`] instead of
//! unwinding through the pipeline.

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use shardcast_core::hash::{OwnerId, RootId};
use shardcast_core::manifest::Manifest;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

/// Ledger identity of a storage node
pub type NodeId = String;

/// Ledger errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The record does not exist (yet)
    #[error("not found")]
    NotFound,

    /// The ledger refused the request
    #[error("rejected: {0}")]
    Rejected(String),

    /// The call did not complete
    #[error("transport error: {0}")]
    Transport(String),
}

/// Receipt of a manifest registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderHandle {
    pub root: RootId,
    /// Ledger-side reference for the registration (e.g. a transaction hash)
    pub reference: String,
}

/// Ledger record of where a file's segments go
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageOrder {
    pub root: RootId,
    /// One node per segment, in segment order; empty while pending
    pub assigned_nodes: Vec<NodeId>,
}

impl StorageOrder {
    pub fn is_assigned(&self) -> bool {
        !self.assigned_nodes.is_empty()
    }
}

/// Operations the upload pipeline needs from the ledger
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Whether `owner` may store files (has been granted upload rights)
    async fn is_authorized(&self, owner: &OwnerId) -> Result<bool, LedgerError>;

    /// Register a manifest; the ledger creates a pending storage order for it
    async fn register_manifest(&self, manifest: &Manifest) -> Result<OrderHandle, LedgerError>;

    /// Fetch the storage order for `root`
    async fn query_order(&self, root: &RootId) -> Result<StorageOrder, LedgerError>;

    /// Look up the network address a node announced
    async fn resolve_node_address(&self, node: &NodeId) -> Result<String, LedgerError>;
}

/// Converts panics inside ledger calls into transport errors
pub struct GuardedLedger {
    inner: Arc<dyn Ledger>,
}

impl GuardedLedger {
    pub fn new(inner: Arc<dyn Ledger>) -> Self {
        Self { inner }
    }
}

async fn guarded<T, F>(operation: &'static str, call: F) -> Result<T, LedgerError>
where
    F: Future<Output = Result<T, LedgerError>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(operation, panic = %message, "Ledger call panicked");
            Err(LedgerError::Transport(format!(
                "{} failed unexpectedly: {}",
                operation, message
            )))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown fault".to_string()
    }
}

#[async_trait]
impl Ledger for GuardedLedger {
    async fn is_authorized(&self, owner: &OwnerId) -> Result<bool, LedgerError> {
        guarded("is_authorized", self.inner.is_authorized(owner)).await
    }

    async fn register_manifest(&self, manifest: &Manifest) -> Result<OrderHandle, LedgerError> {
        guarded("register_manifest", self.inner.register_manifest(manifest)).await
    }

    async fn query_order(&self, root: &RootId) -> Result<StorageOrder, LedgerError> {
        guarded("query_order", self.inner.query_order(root)).await
    }

    async fn resolve_node_address(&self, node: &NodeId) -> Result<String, LedgerError> {
        guarded("resolve_node_address", self.inner.resolve_node_address(node)).await
    }
}
