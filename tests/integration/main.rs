//! Airlock integration test harness.
//!
//! Every node binds 127.0.0.1 on a free port, so tests run in parallel
//! without any setup:
//!
//!   cargo test --test integration

mod membership;
mod messaging;

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use airlock_core::PeerAddress;
use airlock_services::{ChatLine, Node, NodeSettings};

// ── Harness ───────────────────────────────────────────────────────────────────

/// How long a condition may take to become true before a test fails.
pub const SETTLE: Duration = Duration::from_secs(3);

/// A running node with its inbound handler started and chat lines captured.
pub struct TestNode {
    pub node: Node,
    pub chat: mpsc::UnboundedReceiver<ChatLine>,
    inbound: JoinHandle<Result<()>>,
}

impl TestNode {
    pub fn addr(&self) -> PeerAddress {
        self.node.local().address
    }

    pub fn knows(&self, other: &TestNode) -> bool {
        self.node.directory().contains(&other.addr())
    }

    /// Next chat line, or an error if none arrives within [`SETTLE`].
    pub async fn next_chat(&mut self) -> Result<ChatLine> {
        tokio::time::timeout(SETTLE, self.chat.recv())
            .await
            .context("no chat line arrived")?
            .context("chat channel closed")
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.node.shutdown();
        self.inbound.abort();
    }
}

/// Settings tuned for tests: joins give up quickly instead of hanging.
pub fn test_settings() -> NodeSettings {
    NodeSettings {
        discovery_timeout: Some(Duration::from_secs(2)),
        ..NodeSettings::default()
    }
}

/// Bind a node on a free loopback port and start its inbound handler.
pub async fn spawn_node(name: &str) -> Result<TestNode> {
    spawn_node_with(name, test_settings()).await
}

pub async fn spawn_node_with(name: &str, settings: NodeSettings) -> Result<TestNode> {
    let node = Node::bind("127.0.0.1:0".parse()?, name, settings)?;
    let (chat_tx, chat) = mpsc::unbounded_channel();
    let inbound = node.start_inbound(chat_tx);
    Ok(TestNode {
        node,
        chat,
        inbound,
    })
}

/// Spawn a node and join it to the circle through `bootstrap`.
pub async fn spawn_joined(name: &str, bootstrap: &TestNode) -> Result<TestNode> {
    let node = spawn_node(name).await?;
    node.node
        .join(bootstrap.addr())
        .await
        .with_context(|| format!("{name} failed to join"))?;
    Ok(node)
}

/// Poll `cond` until it holds or [`SETTLE`] passes.
pub async fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + SETTLE;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
