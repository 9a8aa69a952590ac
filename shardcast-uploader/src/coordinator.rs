//! Order coordinator
//!
//! Registers a manifest with the ledger, then polls for the storage order
//! until the ledger has assigned a node to every segment. The ledger
//! advances once per block, so every query is preceded by a wait of at
//! least one block interval. Only "not found yet" is retried, within the
//! bounds of the [`RetryPolicy`]; any other ledger error ends the upload.

use crate::error::{Result, UploadError};
use crate::ledger::{Ledger, LedgerError, NodeId, StorageOrder};
use crate::retry::RetryPolicy;
use parking_lot::Mutex;
use shardcast_core::hash::{ContentHash, RootId};
use shardcast_core::manifest::Manifest;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Node assignments for a registered file, one per segment
///
/// Only the coordinator creates placements, so holding one proves the
/// ledger has assigned every segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    root: RootId,
    assignments: Vec<NodeId>,
}

impl Placement {
    pub(crate) fn new(root: RootId, assignments: Vec<NodeId>) -> Self {
        Self { root, assignments }
    }

    pub fn root(&self) -> &RootId {
        &self.root
    }

    /// Assigned nodes in segment order
    pub fn assignments(&self) -> &[NodeId] {
        &self.assignments
    }

    pub fn node_for_segment(&self, index: usize) -> Option<&NodeId> {
        self.assignments.get(index)
    }

    /// Distinct nodes in order of first assignment
    pub fn distinct_nodes(&self) -> Vec<&NodeId> {
        let mut seen = Vec::new();
        for node in &self.assignments {
            if !seen.contains(&node) {
                seen.push(node);
            }
        }
        seen
    }
}

/// Roots a registry remembers by default
pub const DEFAULT_REGISTRY_CAPACITY: usize = 4096;

/// Manifests submitted by this process, keyed by root
///
/// Guarantees a root is never submitted with two different manifests while
/// it is remembered. At most `capacity` roots are kept; the oldest claim is
/// forgotten first. A forgotten root is submitted again on its next upload
/// and conflict detection for it falls back to the ledger.
#[derive(Debug)]
pub struct ManifestRegistry {
    state: Mutex<RegistryState>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct RegistryState {
    submitted: HashMap<RootId, ContentHash>,
    /// Claim order, oldest first
    order: VecDeque<RootId>,
}

/// Result of claiming a root in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// First submission of this root
    Fresh,
    /// The identical manifest was already submitted
    AlreadySubmitted,
}

impl Default for ManifestRegistry {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_REGISTRY_CAPACITY)
    }
}

impl ManifestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            capacity: capacity.max(1),
        }
    }

    /// Reserve `root` for the manifest with `fingerprint`
    pub fn claim(&self, root: RootId, fingerprint: ContentHash) -> Result<Claim> {
        let mut state = self.state.lock();
        match state.submitted.get(&root) {
            Some(existing) if *existing == fingerprint => return Ok(Claim::AlreadySubmitted),
            Some(_) => return Err(UploadError::ManifestConflict(root)),
            None => {}
        }

        state.submitted.insert(root, fingerprint);
        state.order.push_back(root);
        while state.submitted.len() > self.capacity {
            match state.order.pop_front() {
                Some(oldest) => {
                    state.submitted.remove(&oldest);
                    debug!(root = %oldest, "Forgot registered manifest");
                }
                None => break,
            }
        }
        Ok(Claim::Fresh)
    }

    /// Drop a claim whose registration failed
    pub fn release(&self, root: &RootId) {
        let mut state = self.state.lock();
        if state.submitted.remove(root).is_some() {
            state.order.retain(|r| r != root);
        }
    }

    pub fn contains(&self, root: &RootId) -> bool {
        self.state.lock().submitted.contains_key(root)
    }

    /// Number of remembered roots
    pub fn len(&self) -> usize {
        self.state.lock().submitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drives manifest registration and the placement poll
pub struct OrderCoordinator {
    ledger: Arc<dyn Ledger>,
    policy: RetryPolicy,
    poll_timeout: Duration,
    registry: Arc<ManifestRegistry>,
}

impl OrderCoordinator {
    pub fn new(ledger: Arc<dyn Ledger>, policy: RetryPolicy) -> Self {
        Self {
            ledger,
            policy,
            poll_timeout: Duration::from_secs(10),
            registry: Arc::new(ManifestRegistry::new()),
        }
    }

    /// Bound on a single order query
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Share a registry between coordinators
    pub fn with_registry(mut self, registry: Arc<ManifestRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Register and wait for placement
    pub async fn place(&self, manifest: &Manifest, cancel: &CancellationToken) -> Result<Placement> {
        self.register(manifest).await?;
        self.await_placement(manifest, cancel).await
    }

    /// Submit the manifest to the ledger
    ///
    /// Resubmitting an identical manifest from this process is skipped; a
    /// different manifest for a root already submitted is refused.
    #[instrument(skip(self, manifest), fields(root = %manifest.root))]
    pub async fn register(&self, manifest: &Manifest) -> Result<()> {
        let fingerprint = manifest.fingerprint()?;
        match self.registry.claim(manifest.root, fingerprint)? {
            Claim::AlreadySubmitted => {
                info!("Manifest already registered, skipping submission");
                return Ok(());
            }
            Claim::Fresh => {}
        }

        match self.ledger.register_manifest(manifest).await {
            Ok(handle) => {
                info!(
                    reference = %handle.reference,
                    segments = manifest.segment_count(),
                    fragments = manifest.fragment_count(),
                    "Manifest registered"
                );
                Ok(())
            }
            Err(LedgerError::Rejected(reason)) => {
                self.registry.release(&manifest.root);
                warn!(reason = %reason, "Ledger rejected manifest");
                Err(UploadError::RegistrationRejected(reason))
            }
            Err(e) => {
                self.registry.release(&manifest.root);
                Err(e.into())
            }
        }
    }

    /// Poll the ledger until every segment of `manifest` has a node
    #[instrument(skip(self, manifest, cancel), fields(root = %manifest.root))]
    pub async fn await_placement(
        &self,
        manifest: &Manifest,
        cancel: &CancellationToken,
    ) -> Result<Placement> {
        let root = manifest.root;

        for attempt in 1..=self.policy.max_attempts {
            let delay = self.policy.delay_before(attempt);
            tokio::select! {
                _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }

            let queried = tokio::select! {
                _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                r = tokio::time::timeout(self.poll_timeout, self.ledger.query_order(&root)) => r,
            };
            let order = match queried {
                Ok(result) => result,
                Err(_) => Err(LedgerError::Transport(format!(
                    "order query timed out after {:?}",
                    self.poll_timeout
                ))),
            };

            match order {
                Ok(order) if order.is_assigned() => {
                    let placement = check_placement(manifest, order)?;
                    info!(
                        attempt,
                        nodes = placement.distinct_nodes().len(),
                        "Storage order placed"
                    );
                    return Ok(placement);
                }
                Ok(_) | Err(LedgerError::NotFound) => {
                    warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        "Storage order not placed yet"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(UploadError::OrderNotFoundAfterRetries {
            root,
            attempts: self.policy.max_attempts,
        })
    }
}

fn check_placement(manifest: &Manifest, order: StorageOrder) -> Result<Placement> {
    if order.root != manifest.root {
        return Err(LedgerError::Transport(format!(
            "queried order for {} but got {}",
            manifest.root, order.root
        ))
        .into());
    }
    let complete = order.assigned_nodes.len() == manifest.segment_count()
        && order.assigned_nodes.iter().all(|node| !node.is_empty());
    if !complete {
        return Err(UploadError::PlacementIncomplete {
            root: manifest.root,
            assigned: order.assigned_nodes.iter().filter(|n| !n.is_empty()).count(),
            segments: manifest.segment_count(),
        });
    }
    Ok(Placement::new(order.root, order.assigned_nodes))
}
