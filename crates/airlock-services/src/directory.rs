//! Peer directory: the single source of truth for circle membership.
//!
//! Shared between the inbound handler, the heartbeat sender, the broadcaster
//! and discovery. One mutex serializes every read and write, so a snapshot
//! always reflects a state that existed at some point. The lock is never held
//! across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use airlock_core::{LocalIdentity, PeerAddress};

/// A remote member of the circle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub address: PeerAddress,

    /// Empty until the peer's name is learned.
    pub display_name: String,

    /// Last time a datagram was attributed to this peer.
    pub last_seen: Instant,
}

impl Peer {
    fn new(address: PeerAddress, display_name: String) -> Self {
        Self {
            address,
            display_name,
            last_seen: Instant::now(),
        }
    }
}

struct Inner {
    local: LocalIdentity,
    /// Insertion order, unique by address. Never contains `local.address`.
    peers: Vec<Peer>,
}

impl Inner {
    fn position(&self, address: &PeerAddress) -> Option<usize> {
        self.peers.iter().position(|p| p.address == *address)
    }
}

/// Handle to the shared membership view. Cheap to clone.
#[derive(Clone)]
pub struct PeerDirectory {
    inner: Arc<Mutex<Inner>>,
}

impl PeerDirectory {
    pub fn new(local: LocalIdentity) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                local,
                peers: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every critical section leaves `Inner` consistent, so a poisoned
        // lock still guards valid state.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert `address` if unknown, with `last_seen = now`.
    ///
    /// A known peer is returned unchanged: its name is kept and its timestamp
    /// is not refreshed (use `touch`). Returns `None` only when `address` is
    /// the local identity, which is never a member.
    pub fn add_or_touch(&self, address: PeerAddress, name: Option<&str>) -> Option<Peer> {
        let mut inner = self.lock();
        if inner.local.is_self(&address) {
            return None;
        }
        if let Some(i) = inner.position(&address) {
            return Some(inner.peers[i].clone());
        }

        let peer = Peer::new(address, name.unwrap_or_default().to_string());
        inner.peers.push(peer.clone());
        tracing::info!(peer = %address, members = inner.peers.len(), "peer added");
        Some(peer)
    }

    /// Refresh `last_seen` for `address`. Returns false if it is not a member.
    pub fn touch(&self, address: &PeerAddress) -> bool {
        let mut inner = self.lock();
        match inner.position(address) {
            Some(i) => {
                inner.peers[i].last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Remove `address`. Returns false if it was not a member.
    pub fn remove(&self, address: &PeerAddress) -> bool {
        let mut inner = self.lock();
        match inner.position(address) {
            Some(i) => {
                inner.peers.remove(i);
                tracing::info!(peer = %address, members = inner.peers.len(), "peer removed");
                true
            }
            None => false,
        }
    }

    /// Point-in-time copy of every remote peer, in insertion order.
    pub fn snapshot_all(&self) -> Vec<Peer> {
        self.lock().peers.clone()
    }

    pub fn contains(&self, address: &PeerAddress) -> bool {
        self.lock().position(address).is_some()
    }

    pub fn get(&self, address: &PeerAddress) -> Option<Peer> {
        let inner = self.lock();
        inner.position(address).map(|i| inner.peers[i].clone())
    }

    pub fn local(&self) -> LocalIdentity {
        self.lock().local.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
