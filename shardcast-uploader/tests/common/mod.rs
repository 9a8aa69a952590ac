//! Test doubles shared by the uploader integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use shardcast_core::error::{Result as CoreResult, ShardcastError};
use shardcast_core::hash::{ContentHash, OwnerId, RootId};
use shardcast_core::manifest::Manifest;
use shardcast_network::{FragmentPush, FragmentTransport};
use shardcast_uploader::{Ledger, LedgerError, NodeId, OrderHandle, StorageOrder, UploaderConfig};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Things that happened, in order, across ledger and transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Registered(RootId),
    Placed(RootId),
    Sent { segment: u32, fragment: u8 },
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

/// Ledger kept in memory; assigns nodes round-robin, one per segment
pub struct InMemoryLedger {
    nodes: Vec<(NodeId, String)>,
    denied: Mutex<HashSet<OwnerId>>,
    manifests: Mutex<HashMap<RootId, Manifest>>,
    pending_polls: AtomicUsize,
    never_place: bool,
    panic_on_register: bool,
    pub events: EventLog,
    pub registrations: AtomicUsize,
    pub queries: AtomicUsize,
}

impl InMemoryLedger {
    pub fn new(nodes: &[(&str, &str)]) -> Self {
        Self {
            nodes: nodes
                .iter()
                .map(|(id, addr)| (id.to_string(), addr.to_string()))
                .collect(),
            denied: Mutex::new(HashSet::new()),
            manifests: Mutex::new(HashMap::new()),
            pending_polls: AtomicUsize::new(0),
            never_place: false,
            panic_on_register: false,
            events: Arc::new(Mutex::new(Vec::new())),
            registrations: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
        }
    }

    /// Answer "not found" to the first `polls` queries
    pub fn with_pending_polls(self, polls: usize) -> Self {
        self.pending_polls.store(polls, Ordering::SeqCst);
        self
    }

    pub fn never_placing(mut self) -> Self {
        self.never_place = true;
        self
    }

    pub fn panicking_on_register(mut self) -> Self {
        self.panic_on_register = true;
        self
    }

    pub fn deny(&self, owner: OwnerId) {
        self.denied.lock().insert(owner);
    }

    pub fn manifest(&self, root: &RootId) -> Option<Manifest> {
        self.manifests.lock().get(root).cloned()
    }

    fn assignments(&self, segments: usize) -> Vec<NodeId> {
        (0..segments)
            .map(|i| self.nodes[i % self.nodes.len()].0.clone())
            .collect()
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn is_authorized(&self, owner: &OwnerId) -> Result<bool, LedgerError> {
        Ok(!self.denied.lock().contains(owner))
    }

    async fn register_manifest(&self, manifest: &Manifest) -> Result<OrderHandle, LedgerError> {
        if self.panic_on_register {
            panic!("ledger client lost its connection state");
        }
        self.registrations.fetch_add(1, Ordering::SeqCst);

        let mut manifests = self.manifests.lock();
        if let Some(existing) = manifests.get(&manifest.root) {
            if existing != manifest {
                return Err(LedgerError::Rejected("conflicting manifest".to_string()));
            }
        }
        manifests.insert(manifest.root, manifest.clone());
        self.events.lock().push(Event::Registered(manifest.root));

        Ok(OrderHandle {
            root: manifest.root,
            reference: format!("tx-{}", &manifest.root.to_hex()[..8]),
        })
    }

    async fn query_order(&self, root: &RootId) -> Result<StorageOrder, LedgerError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.never_place {
            return Err(LedgerError::NotFound);
        }
        let pending = self
            .pending_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if pending {
            return Err(LedgerError::NotFound);
        }

        let segments = match self.manifests.lock().get(root) {
            Some(manifest) => manifest.segment_count(),
            None => return Err(LedgerError::NotFound),
        };
        self.events.lock().push(Event::Placed(*root));
        Ok(StorageOrder {
            root: *root,
            assigned_nodes: self.assignments(segments),
        })
    }

    async fn resolve_node_address(&self, node: &NodeId) -> Result<String, LedgerError> {
        self.nodes
            .iter()
            .find(|(id, _)| id == node)
            .map(|(_, addr)| addr.clone())
            .ok_or(LedgerError::NotFound)
    }
}

/// One push seen by the recording transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFragment {
    pub address: String,
    pub root: RootId,
    pub segment: u32,
    pub fragment: u8,
    pub hash: ContentHash,
    pub len: usize,
}

/// Transport that records pushes instead of sending them
pub struct RecordingTransport {
    pub sent: Mutex<Vec<SentFragment>>,
    events: EventLog,
    fail_on: Option<(u32, u8)>,
}

impl RecordingTransport {
    pub fn new(events: EventLog) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            events,
            fail_on: None,
        }
    }

    pub fn failing_on(mut self, segment: u32, fragment: u8) -> Self {
        self.fail_on = Some((segment, fragment));
        self
    }

    pub fn sent(&self) -> Vec<SentFragment> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl FragmentTransport for RecordingTransport {
    async fn send_fragment(&self, address: &str, push: FragmentPush) -> CoreResult<()> {
        if self.fail_on == Some((push.segment_index, push.fragment_index)) {
            return Err(ShardcastError::FragmentRejected {
                peer: address.to_string(),
                reason: "disk full".to_string(),
            });
        }
        assert!(push.verify(), "pushed fragment does not match its hash");

        self.events.lock().push(Event::Sent {
            segment: push.segment_index,
            fragment: push.fragment_index,
        });
        self.sent.lock().push(SentFragment {
            address: address.to_string(),
            root: push.root,
            segment: push.segment_index,
            fragment: push.fragment_index,
            hash: push.fragment_hash,
            len: push.data.len(),
        });
        Ok(())
    }
}

pub const MIB: usize = 1024 * 1024;

/// Configuration with a short block interval
pub fn test_config(segment_size: usize) -> UploaderConfig {
    let mut config = UploaderConfig::default();
    config.segment.size = segment_size;
    config.placement.block_interval_ms = 20;
    config.placement.max_attempts = 3;
    config.encode_workers = 2;
    config
}

pub fn owner() -> OwnerId {
    OwnerId::from_bytes([0x5a; 32])
}

/// Write `len` bytes of seeded random content
pub fn write_file(dir: &Path, name: &str, len: usize) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut data = vec![0u8; len];
    StdRng::seed_from_u64(len as u64).fill_bytes(&mut data);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(&data).unwrap();
    path
}
