//! Peer addressing and the local node's identity.
//!
//! A `PeerAddress` is the network identity of a circle member: the IP the
//! transport reports plus the port that member listens on. Equality is exact.
//! Host names are resolved before they reach this type.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

/// Network identity of a peer. Keys the membership view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerAddress(SocketAddr);

impl PeerAddress {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self(SocketAddr::new(ip, port))
    }

    pub fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for PeerAddress {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl From<PeerAddress> for SocketAddr {
    fn from(addr: PeerAddress) -> Self {
        addr.0
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // IPv6 hosts are bracketed, so the output always parses back.
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid peer address {0:?}: expected ip:port")]
pub struct AddressParseError(pub String);

impl FromStr for PeerAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<SocketAddr>()
            .map(Self)
            .map_err(|_| AddressParseError(s.to_string()))
    }
}

// ── Local identity ────────────────────────────────────────────────────────────

/// This node's own listen address and display name.
///
/// Never stored among the remote peers and never subject to idleness checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub address: PeerAddress,
    pub display_name: String,
}

impl LocalIdentity {
    pub fn new(address: PeerAddress, display_name: impl Into<String>) -> Self {
        Self {
            address,
            display_name: display_name.into(),
        }
    }

    pub fn port(&self) -> u16 {
        self.address.port()
    }

    /// Does `addr` refer to this node?
    ///
    /// Exact match on the listen address. When listening on an unspecified
    /// host, any loopback or unspecified address with our port is us too.
    pub fn is_self(&self, addr: &PeerAddress) -> bool {
        if *addr == self.address {
            return true;
        }
        self.address.ip().is_unspecified()
            && addr.port() == self.address.port()
            && (addr.ip().is_loopback() || addr.ip().is_unspecified())
    }
}
