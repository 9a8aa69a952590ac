//! Fragment transport
//!
//! [`FragmentTransport`] is the seam the distributor sends through.
//! [`TcpTransport`] is the production implementation: one framed TCP
//! connection per node address, reused across pushes and dropped from the
//! pool on any error. It never retries; a failed push is reported as is.

use crate::address::NodeAddress;
use crate::protocol::{codec, FragmentAck, FragmentPush, DEFAULT_MAX_FRAME_LEN};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use shardcast_core::error::{Result, ShardcastError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, info, instrument, warn};

type Connection = Arc<Mutex<Framed<TcpStream, LengthDelimitedCodec>>>;

/// Sends one fragment to one node
#[async_trait]
pub trait FragmentTransport: Send + Sync {
    /// Deliver `push` to the node at `address`; `Ok` only once the node accepted it
    async fn send_fragment(&self, address: &str, push: FragmentPush) -> Result<()>;
}

/// Configuration for [`TcpTransport`]
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Timeout for establishing a connection
    pub connect_timeout: Duration,
    /// Timeout for one push/ack exchange
    pub request_timeout: Duration,
    /// Largest frame accepted or produced
    pub max_frame_len: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

/// Pooled TCP fragment transport
pub struct TcpTransport {
    /// Connection pool: normalised address -> connection
    connections: RwLock<HashMap<String, Connection>>,
    config: TransportConfig,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::with_config(TransportConfig::default())
    }

    pub fn with_config(config: TransportConfig) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Number of pooled connections
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Get or create a connection for the given address
    async fn connection(&self, target: &NodeAddress) -> Result<Connection> {
        let key = target.to_string();
        {
            let connections = self.connections.read();
            if let Some(conn) = connections.get(&key) {
                return Ok(conn.clone());
            }
        }

        debug!(addr = %key, "Opening fragment connection");
        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(&key))
            .await
            .map_err(|_| ShardcastError::ConnectionTimeout { peer: key.clone() })?
            .map_err(|e| ShardcastError::Network(format!("Connection failed to {}: {}", key, e)))?;
        stream.set_nodelay(true)?;

        let conn: Connection = Arc::new(Mutex::new(Framed::new(
            stream,
            codec(self.config.max_frame_len),
        )));

        // Keep whichever connection reached the pool first
        let conn = self
            .connections
            .write()
            .entry(key.clone())
            .or_insert(conn)
            .clone();

        info!(addr = %key, "Fragment connection established");
        Ok(conn)
    }

    /// Remove a cached connection (e.g., after failure)
    fn evict(&self, key: &str) {
        if self.connections.write().remove(key).is_some() {
            debug!(addr = %key, "Removed fragment connection from pool");
        }
    }

    async fn exchange(&self, conn: &Connection, payload: Bytes, peer: &str) -> Result<FragmentAck> {
        let mut framed = conn.lock().await;
        framed
            .send(payload)
            .await
            .map_err(|e| ShardcastError::Network(format!("Send to {} failed: {}", peer, e)))?;

        let frame = framed
            .next()
            .await
            .ok_or_else(|| ShardcastError::Network(format!("{} closed the connection", peer)))?
            .map_err(|e| ShardcastError::Network(format!("Read from {} failed: {}", peer, e)))?;

        FragmentAck::from_bytes(&frame)
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FragmentTransport for TcpTransport {
    #[instrument(
        skip(self, push),
        fields(segment = push.segment_index, fragment = push.fragment_index, size = push.data.len())
    )]
    async fn send_fragment(&self, address: &str, push: FragmentPush) -> Result<()> {
        let target = NodeAddress::parse(address)?;
        let key = target.to_string();
        let expected = push.fragment_hash;
        let payload = Bytes::from(push.to_bytes()?);

        let conn = self.connection(&target).await?;
        let ack = match tokio::time::timeout(
            self.config.request_timeout,
            self.exchange(&conn, payload, &key),
        )
        .await
        {
            Ok(Ok(ack)) => ack,
            Ok(Err(e)) => {
                warn!(addr = %key, error = %e, "Fragment push failed");
                self.evict(&key);
                return Err(e);
            }
            Err(_) => {
                warn!(addr = %key, "Fragment push timed out");
                self.evict(&key);
                return Err(ShardcastError::ConnectionTimeout { peer: key });
            }
        };

        if ack.fragment_hash != expected {
            self.evict(&key);
            return Err(ShardcastError::Network(format!(
                "{} acknowledged {} while {} was in flight",
                key, ack.fragment_hash, expected
            )));
        }
        if !ack.accepted {
            return Err(ShardcastError::FragmentRejected {
                peer: key,
                reason: ack.error.unwrap_or_else(|| "unspecified".to_string()),
            });
        }

        debug!(addr = %key, hash = %expected, "Fragment accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_address_is_rejected_before_dialing() {
        let transport = TcpTransport::new();
        let push = FragmentPush::new(
            shardcast_core::hash::RootId::new(shardcast_core::hash::ContentHash::compute(b"r")),
            0,
            0,
            Bytes::from_static(b"data"),
        );

        let result = transport.send_fragment("/udp/nowhere", push).await;
        assert!(matches!(result, Err(ShardcastError::InvalidAddress(_))));
        assert_eq!(transport.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_refused_connection_is_not_pooled() {
        // Bind then drop to get a port with nothing listening
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = TcpTransport::new();
        let push = FragmentPush::new(
            shardcast_core::hash::RootId::new(shardcast_core::hash::ContentHash::compute(b"r")),
            0,
            0,
            Bytes::from_static(b"data"),
        );

        let result = transport.send_fragment(&addr.to_string(), push).await;
        assert!(matches!(result, Err(ShardcastError::Network(_))));
        assert_eq!(transport.connection_count(), 0);
    }
}
