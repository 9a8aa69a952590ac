//! Node address parsing
//!
//! The ledger hands out node addresses either as multiaddresses
//! (`/ip4/10.0.0.1/tcp/4001`, `/dns4/node.example/tcp/4001/p2p/<id>`) or as
//! plain `host:port`. Both are normalised into a dialable [`NodeAddress`].

use multiaddr::{Multiaddr, Protocol};
use shardcast_core::error::{Result, ShardcastError};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

/// Host component of a node address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Host {
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Dns(String),
}

/// A dialable TCP endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeAddress {
    pub host: Host,
    pub port: u16,
}

impl NodeAddress {
    /// Parse a multiaddress or `host:port`
    pub fn parse(addr: &str) -> Result<Self> {
        let addr = addr.trim();
        if addr.is_empty() {
            return Err(invalid(addr, "empty address"));
        }
        if addr.starts_with('/') {
            let multiaddr = addr
                .parse::<Multiaddr>()
                .map_err(|e| invalid(addr, &e.to_string()))?;
            Self::from_multiaddr(&multiaddr)
        } else {
            Self::parse_host_port(addr)
        }
    }

    /// Dial target of `<ip4|ip6|dns|dns4|dns6>/tcp/<port>[/p2p/<peer>]`
    pub fn from_multiaddr(multiaddr: &Multiaddr) -> Result<Self> {
        let addr = multiaddr.to_string();
        let mut protocols = multiaddr.iter();

        let host = match protocols.next() {
            Some(Protocol::Ip4(ip)) => Host::Ipv4(ip),
            Some(Protocol::Ip6(ip)) => Host::Ipv6(ip),
            Some(Protocol::Dns(name)) | Some(Protocol::Dns4(name)) | Some(Protocol::Dns6(name)) => {
                Host::Dns(name.into_owned())
            }
            Some(other) => return Err(invalid(&addr, &format!("unsupported host {}", other))),
            None => return Err(invalid(&addr, "empty multiaddress")),
        };

        let port = match protocols.next() {
            Some(Protocol::Tcp(port)) => port,
            _ => return Err(invalid(&addr, "expected /tcp/<port>")),
        };

        // A peer id may follow; any other transport layer cannot be dialed here
        for protocol in protocols {
            if !matches!(protocol, Protocol::P2p(_)) {
                return Err(invalid(&addr, &format!("unsupported protocol {}", protocol)));
            }
        }

        Ok(Self { host, port })
    }

    fn parse_host_port(addr: &str) -> Result<Self> {
        if let Ok(socket) = addr.parse::<SocketAddr>() {
            let host = match socket.ip() {
                IpAddr::V4(ip) => Host::Ipv4(ip),
                IpAddr::V6(ip) => Host::Ipv6(ip),
            };
            return Ok(Self {
                host,
                port: socket.port(),
            });
        }

        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| invalid(addr, "expected host:port"))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| invalid(addr, "bad port"))?;
        if host.is_empty() || host.contains([':', '[', ']', '/']) {
            return Err(invalid(addr, "bad host"));
        }

        Ok(Self {
            host: Host::Dns(host.to_string()),
            port,
        })
    }
}

fn invalid(addr: &str, reason: &str) -> ShardcastError {
    ShardcastError::InvalidAddress(format!("{}: {}", addr, reason))
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Host::Ipv4(ip) => write!(f, "{}:{}", ip, self.port),
            Host::Ipv6(ip) => write!(f, "[{}]:{}", ip, self.port),
            Host::Dns(name) => write!(f, "{}:{}", name, self.port),
        }
    }
}

impl FromStr for NodeAddress {
    type Err = ShardcastError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
