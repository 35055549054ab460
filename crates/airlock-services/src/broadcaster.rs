//! Fans locally typed lines out to the circle.
//!
//! Each line becomes a Chat datagram to every non-idle peer. The leave command
//! instead sends a Leave to every non-idle peer and ends the loop.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use airlock_core::Message;

use crate::directory::PeerDirectory;
use crate::liveness;
use crate::transport::{self, FanoutReport};

/// Input line that makes this node leave the circle.
pub const LEAVE_COMMAND: &str = "/quit";

/// Why the broadcast loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastEnd {
    /// The leave command was entered and Leave was sent.
    Left,
    /// The input stream ended.
    InputClosed,
}

#[derive(Clone)]
pub struct Broadcaster {
    directory: PeerDirectory,
    idle_threshold: Duration,
}

impl Broadcaster {
    pub fn new(directory: PeerDirectory, idle_threshold: Duration) -> Self {
        Self {
            directory,
            idle_threshold,
        }
    }

    /// Consume `input` line by line until the leave command or end of input.
    pub async fn run<R>(&self, input: R) -> Result<BroadcastEnd>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();

        while let Some(line) = lines.next_line().await.context("failed to read input")? {
            if line.trim() == LEAVE_COMMAND {
                let report = self.leave().await;
                tracing::info!(sent = report.sent, "left the circle");
                return Ok(BroadcastEnd::Left);
            }
            if line.trim().is_empty() {
                continue;
            }
            self.say(&line).await;
        }

        tracing::info!("input closed");
        Ok(BroadcastEnd::InputClosed)
    }

    /// Send `body` as a chat message to every non-idle peer.
    pub async fn say(&self, body: &str) -> FanoutReport {
        let msg = Message::Chat {
            name: self.directory.local().display_name,
            body: body.to_string(),
        };
        self.send_to_active(&msg).await
    }

    /// Tell every non-idle peer we are leaving.
    pub async fn leave(&self) -> FanoutReport {
        let msg = Message::Leave {
            port: self.directory.local().port(),
        };
        self.send_to_active(&msg).await
    }

    async fn send_to_active(&self, msg: &Message) -> FanoutReport {
        let (active, idle) = liveness::partition(
            self.directory.snapshot_all(),
            Instant::now(),
            self.idle_threshold,
        );
        for peer in &idle {
            tracing::debug!(peer = %peer.address, "skipping idle peer");
        }

        let payload = msg.encode();
        let mut report = transport::send_all(active.into_iter().map(|p| p.address), &payload).await;
        report.skipped = idle.len();
        tracing::debug!(
            kind = ?msg.kind(),
            sent = report.sent,
            skipped = report.skipped,
            failed = report.failed,
            "fan-out complete"
        );
        report
    }
}
