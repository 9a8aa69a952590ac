//! Upload pipeline
//!
//! Drives one upload through its stages:
//!
//! ```text
//! Segmenting -> Hashing -> Encoding -> Registering -> AwaitingPlacement -> Distributing -> Complete
//!      \____________\___________\____________\______________\___________________\______-> Failed
//! ```
//!
//! Nothing is retried here; the placement poll inside the coordinator is
//! the only bounded retry. Every transition can be observed through an
//! optional progress channel.

use crate::config::UploaderConfig;
use crate::coordinator::{ManifestRegistry, OrderCoordinator};
use crate::distributor::Distributor;
use crate::error::{Result, UploadError};
use crate::ledger::{GuardedLedger, Ledger};
use crate::planner::{file_meta, Planner, UploadRequest};
use serde::Serialize;
use shardcast_core::hash::RootId;
use shardcast_core::manifest::Manifest;
use shardcast_network::FragmentTransport;
use shardcast_storage::ScratchStore;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

/// Upload stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UploadStage {
    Segmenting,
    Hashing,
    Encoding,
    Registering,
    AwaitingPlacement,
    Distributing,
    Complete,
    Failed,
}

impl UploadStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStage::Complete | UploadStage::Failed)
    }
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadStage::Segmenting => "segmenting",
            UploadStage::Hashing => "hashing",
            UploadStage::Encoding => "encoding",
            UploadStage::Registering => "registering",
            UploadStage::AwaitingPlacement => "awaiting-placement",
            UploadStage::Distributing => "distributing",
            UploadStage::Complete => "complete",
            UploadStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Progress update for an upload
#[derive(Debug, Clone)]
pub struct UploadProgress {
    pub stage: UploadStage,
    /// Known from `Encoding` on
    pub root: Option<RootId>,
    pub segments: usize,
    pub fragments_sent: usize,
    /// Set when `stage` is `Failed`
    pub error: Option<String>,
}

/// Result of a completed upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    /// Content address of the uploaded file
    pub root: RootId,
    pub segments: usize,
    pub fragments_sent: usize,
    #[serde(skip)]
    pub duration: Duration,
}

/// Mutable state of one upload run
struct Run {
    stage: UploadStage,
    root: Option<RootId>,
    segments: usize,
    fragments_sent: usize,
}

/// Uploads files end to end
pub struct Uploader {
    planner: Planner,
    coordinator: OrderCoordinator,
    distributor: Distributor,
    ledger: Arc<dyn Ledger>,
    progress_tx: Option<mpsc::Sender<UploadProgress>>,
}

impl Uploader {
    /// Build an uploader from configuration
    ///
    /// The ledger is wrapped in a [`GuardedLedger`]; the store is shared by
    /// segmenting, encoding and distribution.
    pub fn new(
        config: &UploaderConfig,
        ledger: Arc<dyn Ledger>,
        transport: Arc<dyn FragmentTransport>,
        store: Arc<dyn ScratchStore>,
    ) -> Result<Self> {
        config.validate()?;
        let ledger: Arc<dyn Ledger> = Arc::new(GuardedLedger::new(ledger));

        let planner = Planner::from_config(config, store.clone())?;
        let coordinator = OrderCoordinator::new(ledger.clone(), config.retry_policy())
            .with_poll_timeout(config.placement.poll_timeout());
        let distributor = Distributor::new(
            ledger.clone(),
            transport,
            store,
            config.distribution.max_parallel_nodes,
        );

        Ok(Self::from_parts(planner, coordinator, distributor, ledger))
    }

    /// Assemble an uploader from prepared components
    pub fn from_parts(
        planner: Planner,
        coordinator: OrderCoordinator,
        distributor: Distributor,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self {
            planner,
            coordinator,
            distributor,
            ledger,
            progress_tx: None,
        }
    }

    /// Share a manifest registry with other uploaders in this process
    pub fn with_registry(mut self, registry: Arc<ManifestRegistry>) -> Self {
        self.coordinator = self.coordinator.with_registry(registry);
        self
    }

    /// Attach a progress channel
    pub fn with_progress(mut self) -> (Self, mpsc::Receiver<UploadProgress>) {
        let (tx, rx) = mpsc::channel(100);
        self.progress_tx = Some(tx);
        (self, rx)
    }

    /// Local stages only: the manifest `put_file` would register
    pub async fn plan(&self, request: &UploadRequest) -> Result<Manifest> {
        Ok(self.planner.plan(request).await?.manifest)
    }

    /// Upload a file and return its root identifier
    #[instrument(skip_all, fields(path = %request.path.display(), bucket = %request.bucket))]
    pub async fn put_file(
        &self,
        request: &UploadRequest,
        cancel: &CancellationToken,
    ) -> Result<UploadReceipt> {
        let started = Instant::now();
        let mut run = Run {
            stage: UploadStage::Segmenting,
            root: None,
            segments: 0,
            fragments_sent: 0,
        };

        match self.run(request, cancel, &mut run).await {
            Ok(root) => {
                self.advance(&mut run, UploadStage::Complete).await;
                let receipt = UploadReceipt {
                    root,
                    segments: run.segments,
                    fragments_sent: run.fragments_sent,
                    duration: started.elapsed(),
                };
                info!(
                    root = %receipt.root,
                    segments = receipt.segments,
                    fragments = receipt.fragments_sent,
                    elapsed_ms = receipt.duration.as_millis() as u64,
                    "Upload complete"
                );
                Ok(receipt)
            }
            Err(e) => {
                error!(stage = %run.stage, error = %e, "Upload failed");
                self.report(&run, UploadStage::Failed, Some(e.to_string()))
                    .await;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: &UploadRequest,
        cancel: &CancellationToken,
        run: &mut Run,
    ) -> Result<RootId> {
        request.validate()?;
        if !self.ledger.is_authorized(&request.owner).await? {
            return Err(UploadError::Unauthorized(request.owner));
        }

        self.advance(run, UploadStage::Segmenting).await;
        let segmented = self.planner.segment(request.path.clone()).await?;
        run.segments = segmented.segments.len();
        ensure_live(cancel)?;

        self.advance(run, UploadStage::Hashing).await;
        let root = self.planner.root(&segmented.segments)?;
        run.root = Some(root);

        self.advance(run, UploadStage::Encoding).await;
        let records = self.planner.encode(segmented.segments).await?;
        ensure_live(cancel)?;

        let manifest = Manifest::new(root, file_meta(request, segmented.file_size), &records);

        self.advance(run, UploadStage::Registering).await;
        self.coordinator.register(&manifest).await?;

        self.advance(run, UploadStage::AwaitingPlacement).await;
        let placement = self.coordinator.await_placement(&manifest, cancel).await?;

        self.advance(run, UploadStage::Distributing).await;
        let report = self
            .distributor
            .distribute(&records, &placement, cancel)
            .await?;
        run.fragments_sent = report.fragments_sent;

        Ok(root)
    }

    async fn advance(&self, run: &mut Run, stage: UploadStage) {
        run.stage = stage;
        info!(stage = %stage, "Upload stage");
        self.report(run, stage, None).await;
    }

    /// Report progress update
    async fn report(&self, run: &Run, stage: UploadStage, error: Option<String>) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx
                .send(UploadProgress {
                    stage,
                    root: run.root,
                    segments: run.segments,
                    fragments_sent: run.fragments_sent,
                    error,
                })
                .await;
        }
    }
}

fn ensure_live(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(UploadError::Cancelled);
    }
    Ok(())
}
