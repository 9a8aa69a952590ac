//! Distributor
//!
//! Pushes every fragment to the node its segment was placed on. Each
//! distinct node is resolved once through the ledger before anything is
//! sent. Nodes are served concurrently up to a bound; for one node,
//! segments go in manifest order and fragments in index order. The first
//! failed push aborts the whole distribution.

use crate::coordinator::Placement;
use crate::error::{Result, UploadError};
use crate::ledger::{Ledger, LedgerError, NodeId};
use futures::stream::{self, TryStreamExt};
use shardcast_core::error::ShardcastError;
use shardcast_core::hash::RootId;
use shardcast_core::segment::{Fragment, SegmentRecord};
use shardcast_network::{FragmentPush, FragmentTransport};
use shardcast_storage::ScratchStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Outcome of a completed distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributionReport {
    pub fragments_sent: usize,
    pub nodes: usize,
}

/// Segments bound for one node
struct NodeBatch<'a> {
    node: NodeId,
    address: String,
    records: Vec<&'a SegmentRecord>,
}

/// Sends fragments to their placed nodes
pub struct Distributor {
    ledger: Arc<dyn Ledger>,
    transport: Arc<dyn FragmentTransport>,
    store: Arc<dyn ScratchStore>,
    max_parallel_nodes: usize,
}

impl Distributor {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        transport: Arc<dyn FragmentTransport>,
        store: Arc<dyn ScratchStore>,
        max_parallel_nodes: usize,
    ) -> Self {
        Self {
            ledger,
            transport,
            store,
            max_parallel_nodes: max_parallel_nodes.max(1),
        }
    }

    /// Send all fragments of `records` according to `placement`
    #[instrument(skip_all, fields(root = %placement.root()))]
    pub async fn distribute(
        &self,
        records: &[SegmentRecord],
        placement: &Placement,
        cancel: &CancellationToken,
    ) -> Result<DistributionReport> {
        if placement.assignments().len() != records.len() {
            return Err(UploadError::PlacementIncomplete {
                root: *placement.root(),
                assigned: placement.assignments().len(),
                segments: records.len(),
            });
        }

        let addresses = self.resolve_nodes(placement).await?;

        let mut batches: Vec<NodeBatch<'_>> = Vec::new();
        for (record, node) in records.iter().zip(placement.assignments()) {
            match batches.iter_mut().find(|b| &b.node == node) {
                Some(batch) => batch.records.push(record),
                None => batches.push(NodeBatch {
                    node: node.clone(),
                    address: addresses[node].clone(),
                    records: vec![record],
                }),
            }
        }

        let nodes = batches.len();
        let sent = AtomicUsize::new(0);
        let counter = &sent;
        let root = *placement.root();

        stream::iter(batches.into_iter().map(Ok))
            .try_for_each_concurrent(self.max_parallel_nodes, |batch| {
                self.send_batch(root, batch, counter, cancel)
            })
            .await?;

        let fragments_sent = sent.load(Ordering::SeqCst);
        info!(fragments_sent, nodes, "Distribution complete");
        Ok(DistributionReport {
            fragments_sent,
            nodes,
        })
    }

    /// Resolve every assigned node once
    async fn resolve_nodes(&self, placement: &Placement) -> Result<HashMap<NodeId, String>> {
        let mut addresses = HashMap::new();
        for node in placement.distinct_nodes() {
            // Only an unknown node is a resolution failure; ledger faults pass through
            let address = match self.ledger.resolve_node_address(node).await {
                Ok(address) => address,
                Err(LedgerError::NotFound) => {
                    return Err(UploadError::NodeUnresolved {
                        node: node.clone(),
                        reason: LedgerError::NotFound.to_string(),
                    })
                }
                Err(e) => return Err(e.into()),
            };
            debug!(node = %node, address = %address, "Node resolved");
            addresses.insert(node.clone(), address);
        }
        Ok(addresses)
    }

    async fn send_batch(
        &self,
        root: RootId,
        batch: NodeBatch<'_>,
        sent: &AtomicUsize,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for record in &batch.records {
            for fragment in &record.fragments {
                if cancel.is_cancelled() {
                    return Err(UploadError::Cancelled);
                }
                let segment = record.segment.index;
                self.send_fragment(root, segment, fragment, &batch.address)
                    .await
                    .map_err(|source| UploadError::DistributionFailed {
                        segment,
                        fragment: fragment.index,
                        source,
                    })?;
                sent.fetch_add(1, Ordering::SeqCst);
            }
        }
        debug!(
            node = %batch.node,
            segments = batch.records.len(),
            "Node batch delivered"
        );
        Ok(())
    }

    async fn send_fragment(
        &self,
        root: RootId,
        segment: u32,
        fragment: &Fragment,
        address: &str,
    ) -> std::result::Result<(), ShardcastError> {
        let store = self.store.clone();
        let hash = fragment.hash;
        let data = tokio::task::spawn_blocking(move || store.get(&hash))
            .await
            .map_err(|e| ShardcastError::Internal(format!("fragment read task: {}", e)))??
            .ok_or_else(|| ShardcastError::ObjectNotFound(hash.to_hex()))?;

        let push = FragmentPush::new(root, segment, fragment.index, data);
        if push.fragment_hash != fragment.hash {
            return Err(ShardcastError::Storage(format!(
                "scratch object {} does not match its hash",
                fragment.hash
            )));
        }

        self.transport.send_fragment(address, push).await
    }
}
