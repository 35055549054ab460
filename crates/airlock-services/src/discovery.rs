//! Join handshake: dial one bootstrap peer, adopt its membership, and
//! introduce ourselves to every peer it knows.
//!
//! Flood-once introduction: the view converges to everyone reachable from the
//! bootstrap at join time. Nothing re-synchronizes it afterwards except
//! heartbeats and later joins.

use std::time::Duration;

use airlock_core::wire::RECV_BUFFER_SIZE;
use airlock_core::{Message, PeerAddress};

use crate::directory::PeerDirectory;
use crate::transport;

/// What a completed join learned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinReport {
    pub bootstrap: PeerAddress,
    /// Peers newly added from the bootstrap's list, in list order.
    pub learned: Vec<PeerAddress>,
    /// Introductions that could not be sent.
    pub failed: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("bootstrap {0} is this node")]
    SelfBootstrap(PeerAddress),

    #[error("transport error talking to bootstrap: {0}")]
    Io(#[from] std::io::Error),

    #[error("no reply from bootstrap {bootstrap} within {timeout:?}")]
    Timeout {
        bootstrap: PeerAddress,
        timeout: Duration,
    },
}

/// Run the join handshake against `bootstrap`.
///
/// With `timeout = None` the wait for the bootstrap's reply is unbounded and a
/// silent bootstrap stalls the caller.
pub async fn join(
    directory: &PeerDirectory,
    bootstrap: PeerAddress,
    timeout: Option<Duration>,
) -> Result<JoinReport, DiscoveryError> {
    let local = directory.local();
    if local.is_self(&bootstrap) {
        return Err(DiscoveryError::SelfBootstrap(bootstrap));
    }

    // Dial
    let socket = transport::ephemeral_for(bootstrap.socket_addr()).await?;
    socket.connect(bootstrap.socket_addr()).await?;

    // Announce
    let announce = Message::JoinRequest {
        port: local.port(),
        name: local.display_name.clone(),
    }
    .encode();
    socket.send(&announce).await?;
    tracing::info!(%bootstrap, port = local.port(), "join request sent");

    // Await
    let peers = match timeout {
        Some(limit) => tokio::time::timeout(limit, await_response(&socket))
            .await
            .map_err(|_| DiscoveryError::Timeout {
                bootstrap,
                timeout: limit,
            })??,
        None => await_response(&socket).await?,
    };
    tracing::info!(%bootstrap, count = peers.len(), "received peer list");

    directory.add_or_touch(bootstrap, None);
    directory.touch(&bootstrap);

    // Merge
    let mut report = JoinReport {
        bootstrap,
        learned: Vec::new(),
        failed: 0,
    };
    for peer in peers {
        if local.is_self(&peer) || directory.contains(&peer) {
            continue;
        }
        if directory.add_or_touch(peer, None).is_none() {
            continue;
        }
        report.learned.push(peer);

        if let Err(e) = transport::send_datagram(peer, &announce).await {
            tracing::warn!(%peer, error = %e, "introduction failed");
            report.failed += 1;
        } else {
            tracing::debug!(%peer, "introduced self");
        }
    }

    Ok(report)
}

/// Wait for the bootstrap's JoinResponse. Anything else is logged and ignored.
async fn await_response(socket: &tokio::net::UdpSocket) -> Result<Vec<PeerAddress>, std::io::Error> {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    loop {
        let len = socket.recv(&mut buf).await?;
        match Message::decode(&buf[..len]) {
            Ok(Message::JoinResponse { peers }) => return Ok(peers),
            Ok(other) => {
                tracing::debug!(kind = ?other.kind(), "ignoring non-response during join");
            }
            Err(e) => tracing::warn!(error = %e, "undecodable reply during join"),
        }
    }
}
