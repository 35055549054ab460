//! Failure detection from last-seen timestamps.
//!
//! Idleness is computed on demand and never stored. An idle peer is skipped
//! by the broadcaster but stays in the directory: only a Leave removes it.

use std::time::{Duration, Instant};

use airlock_core::wire::IDLE_THRESHOLD_SECS;

use crate::directory::Peer;

pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(IDLE_THRESHOLD_SECS);

/// True iff `peer` has been silent for strictly longer than `threshold`.
pub fn is_idle(peer: &Peer, now: Instant, threshold: Duration) -> bool {
    now.saturating_duration_since(peer.last_seen) > threshold
}

/// Split a snapshot into (active, idle).
pub fn partition(peers: Vec<Peer>, now: Instant, threshold: Duration) -> (Vec<Peer>, Vec<Peer>) {
    peers
        .into_iter()
        .partition(|p| !is_idle(p, now, threshold))
}
