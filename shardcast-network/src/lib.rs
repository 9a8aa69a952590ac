//! Shardcast Network Layer
//!
//! Moves erasure-coded fragments from the uploader to storage nodes.
//!
//! - **protocol**: `FragmentPush` / `FragmentAck` messages, bincode payloads
//!   inside length-delimited frames
//! - **address**: multiaddress and `host:port` parsing
//! - **transport**: the `FragmentTransport` seam and the pooled `TcpTransport`
//! - **sink**: a minimal receiving endpoint that stores pushed fragments
//!
//! # Usage
//!
//! ```ignore
//! use shardcast_network::{FragmentPush, FragmentTransport, TcpTransport};
//!
//! let transport = TcpTransport::new();
//! let push = FragmentPush::new(root, 0, 0, data);
//! transport.send_fragment("/ip4/10.0.0.7/tcp/4100", push).await?;
//! ```

pub mod address;
pub mod protocol;
pub mod sink;
pub mod transport;

// Re-exports
pub use address::{Host, NodeAddress};
pub use multiaddr::Multiaddr;
pub use protocol::{codec, FragmentAck, FragmentPush, DEFAULT_MAX_FRAME_LEN, PROTOCOL_VERSION};
pub use sink::FragmentSink;
pub use transport::{FragmentTransport, TcpTransport, TransportConfig};
