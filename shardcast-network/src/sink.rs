//! Receiving side of the fragment protocol
//!
//! A minimal node endpoint: accepts framed [`FragmentPush`] messages,
//! checks version and content hash, stores the fragment in a
//! [`ScratchStore`] and answers with a [`FragmentAck`]. Used for local
//! clusters and loopback tests of the uploader.

use crate::protocol::{codec, FragmentAck, FragmentPush, DEFAULT_MAX_FRAME_LEN, PROTOCOL_VERSION};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use shardcast_core::error::{Result, ShardcastError};
use shardcast_storage::ScratchStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// TCP endpoint that stores pushed fragments
pub struct FragmentSink {
    listener: TcpListener,
    store: Arc<dyn ScratchStore>,
    node_id: String,
    max_frame_len: usize,
}

impl FragmentSink {
    /// Bind a sink on `addr` (use port 0 for an ephemeral port)
    pub async fn bind(
        addr: SocketAddr,
        store: Arc<dyn ScratchStore>,
        node_id: impl Into<String>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            store,
            node_id: node_id.into(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        })
    }

    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Address the sink is listening on
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        info!(addr = %self.local_addr()?, node_id = %self.node_id, "Fragment sink listening");

        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted?,
            };

            let store = self.store.clone();
            let node_id = self.node_id.clone();
            let max_frame_len = self.max_frame_len;
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer, store, node_id, max_frame_len).await {
                    warn!(peer = %peer, error = %e, "Fragment connection ended with error");
                }
            });
        }

        info!(node_id = %self.node_id, "Fragment sink stopped");
        Ok(())
    }
}

#[instrument(skip(stream, store, node_id, max_frame_len), fields(node_id = %node_id))]
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    store: Arc<dyn ScratchStore>,
    node_id: String,
    max_frame_len: usize,
) -> Result<()> {
    let mut framed = Framed::new(stream, codec(max_frame_len));

    while let Some(frame) = framed.next().await {
        let frame = frame.map_err(|e| ShardcastError::Network(e.to_string()))?;
        let ack = match FragmentPush::from_bytes(&frame) {
            Ok(push) => store_push(&store, push).await,
            Err(e) => {
                warn!(error = %e, "Undecodable push frame");
                return Err(e);
            }
        };
        framed
            .send(Bytes::from(ack.to_bytes()?))
            .await
            .map_err(|e| ShardcastError::Network(e.to_string()))?;
    }

    debug!("Peer closed fragment connection");
    Ok(())
}

async fn store_push(store: &Arc<dyn ScratchStore>, push: FragmentPush) -> FragmentAck {
    let hash = push.fragment_hash;

    if push.version != PROTOCOL_VERSION {
        return FragmentAck::rejected(
            hash,
            format!("unsupported protocol version {}", push.version),
        );
    }
    if push.data.is_empty() {
        return FragmentAck::rejected(hash, "empty fragment");
    }
    if !push.verify() {
        warn!(hash = %hash, "Fragment data does not match its hash");
        return FragmentAck::rejected(hash, "fragment hash mismatch");
    }

    let store = store.clone();
    let data = push.data;
    match tokio::task::spawn_blocking(move || store.put_if_absent(&hash, &data)).await {
        Ok(Ok(outcome)) => {
            debug!(
                root = %push.root,
                segment = push.segment_index,
                fragment = push.fragment_index,
                ?outcome,
                "Fragment stored"
            );
            FragmentAck::accepted(hash)
        }
        Ok(Err(e)) => {
            error!(hash = %hash, error = %e, "Failed to store fragment");
            FragmentAck::rejected(hash, e.to_string())
        }
        Err(e) => {
            error!(hash = %hash, error = %e, "Store task failed");
            FragmentAck::rejected(hash, "internal error")
        }
    }
}
