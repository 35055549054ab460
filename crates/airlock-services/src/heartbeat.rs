//! Periodic liveness announcement.
//!
//! Every interval, sends a Heartbeat to every known peer, idle or not. A
//! heartbeat is what brings an idle peer back.

use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast;
use tokio::time;

use airlock_core::Message;

use crate::directory::PeerDirectory;
use crate::transport::{self, FanoutReport};

/// Send one heartbeat round to a fresh snapshot of the directory.
pub async fn heartbeat_round(directory: &PeerDirectory) -> FanoutReport {
    let payload = Message::Heartbeat {
        port: directory.local().port(),
    }
    .encode();
    let targets = directory.snapshot_all().into_iter().map(|p| p.address);
    transport::send_all(targets, &payload).await
}

/// Heartbeat every `interval` until shutdown. The first round goes out
/// immediately.
pub async fn heartbeat_loop(
    directory: PeerDirectory,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let mut ticker = time::interval(interval);

    tracing::info!(interval_secs = interval.as_secs(), "heartbeat sender starting");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("heartbeat sender shutting down");
                return Ok(());
            }

            _ = ticker.tick() => {
                let report = heartbeat_round(&directory).await;
                tracing::debug!(sent = report.sent, failed = report.failed, "heartbeat round");
            }
        }
    }
}
