//! Integration tests for the TCP fragment transport
//!
//! Runs a loopback `FragmentSink` and pushes fragments through `TcpTransport`.

use bytes::Bytes;
use shardcast_core::error::ShardcastError;
use shardcast_core::hash::{ContentHash, RootId};
use shardcast_network::{
    FragmentPush, FragmentSink, FragmentTransport, TcpTransport, TransportConfig,
};
use shardcast_storage::{MemoryStore, ScratchStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("shardcast_network=debug")
        .with_test_writer()
        .try_init();
}

async fn start_sink(store: Arc<MemoryStore>) -> (SocketAddr, CancellationToken) {
    init_tracing();
    let sink = FragmentSink::bind("127.0.0.1:0".parse().unwrap(), store, "sink-test")
        .await
        .unwrap();
    let addr = sink.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        let _ = sink.run(token).await;
    });
    (addr, shutdown)
}

fn root() -> RootId {
    RootId::new(ContentHash::compute(b"integration root"))
}

#[tokio::test]
async fn test_push_fragments_over_loopback() {
    let store = Arc::new(MemoryStore::new());
    let (addr, shutdown) = start_sink(store.clone()).await;
    let transport = TcpTransport::new();

    let fragments: Vec<Bytes> = (0..3u8)
        .map(|i| Bytes::from(vec![i; 4096]))
        .collect();
    for (i, data) in fragments.iter().enumerate() {
        let push = FragmentPush::new(root(), 0, i as u8, data.clone());
        transport
            .send_fragment(&addr.to_string(), push)
            .await
            .unwrap();
    }

    // All pushes share one pooled connection
    assert_eq!(transport.connection_count(), 1);
    assert_eq!(store.len(), 3);
    for data in &fragments {
        let stored = store.get(&ContentHash::compute(data)).unwrap().unwrap();
        assert_eq!(&stored, data);
    }

    shutdown.cancel();
}

#[tokio::test]
async fn test_multiaddr_target() {
    let store = Arc::new(MemoryStore::new());
    let (addr, shutdown) = start_sink(store.clone()).await;
    let transport = TcpTransport::new();

    let multiaddr = format!("/ip4/127.0.0.1/tcp/{}", addr.port());
    let push = FragmentPush::new(root(), 2, 0, Bytes::from_static(b"via multiaddr"));
    transport.send_fragment(&multiaddr, push).await.unwrap();

    assert!(store
        .exists(&ContentHash::compute(b"via multiaddr"))
        .unwrap());
    shutdown.cancel();
}

#[tokio::test]
async fn test_corrupted_push_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let (addr, shutdown) = start_sink(store.clone()).await;
    let transport = TcpTransport::new();

    let mut push = FragmentPush::new(root(), 0, 0, Bytes::from_static(b"original"));
    push.data = Bytes::from_static(b"corrupted");

    let result = transport.send_fragment(&addr.to_string(), push).await;
    assert!(
        matches!(result, Err(ShardcastError::FragmentRejected { .. })),
        "unexpected result: {:?}",
        result
    );
    assert!(store.is_empty());

    // A rejection leaves the connection usable
    let push = FragmentPush::new(root(), 0, 1, Bytes::from_static(b"fine"));
    transport.send_fragment(&addr.to_string(), push).await.unwrap();
    assert_eq!(transport.connection_count(), 1);

    shutdown.cancel();
}

#[tokio::test]
async fn test_oversized_frame_fails_and_evicts() {
    let store = Arc::new(MemoryStore::new());
    let (addr, shutdown) = start_sink(store.clone()).await;
    let transport = TcpTransport::with_config(TransportConfig {
        max_frame_len: 1024,
        ..Default::default()
    });

    let push = FragmentPush::new(root(), 0, 0, Bytes::from(vec![7u8; 4096]));
    let result = transport.send_fragment(&addr.to_string(), push).await;
    assert!(matches!(result, Err(ShardcastError::Network(_))));
    assert_eq!(transport.connection_count(), 0);
    assert!(store.is_empty());

    shutdown.cancel();
}

#[tokio::test]
async fn test_silent_node_times_out() {
    // Accepts connections but never answers
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _server = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let transport = TcpTransport::with_config(TransportConfig {
        request_timeout: Duration::from_millis(200),
        ..Default::default()
    });
    let push = FragmentPush::new(root(), 0, 0, Bytes::from_static(b"waiting"));
    let result = transport.send_fragment(&addr.to_string(), push).await;

    assert!(matches!(result, Err(ShardcastError::ConnectionTimeout { .. })));
    assert_eq!(transport.connection_count(), 0);
}
