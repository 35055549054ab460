//! A circle member: the listen socket, the directory, and the tasks around them.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use airlock_core::config::AirlockConfig;
use airlock_core::wire::HEARTBEAT_INTERVAL_SECS;
use airlock_core::{LocalIdentity, PeerAddress};

use crate::broadcaster::Broadcaster;
use crate::directory::PeerDirectory;
use crate::discovery::{self, DiscoveryError, JoinReport};
use crate::heartbeat;
use crate::inbound::{ChatLine, InboundHandler};
use crate::liveness::DEFAULT_IDLE_THRESHOLD;
use crate::transport;

/// Timing knobs for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSettings {
    pub heartbeat_interval: Duration,
    pub idle_threshold: Duration,
    /// None = wait for the bootstrap forever.
    pub discovery_timeout: Option<Duration>,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
            discovery_timeout: None,
        }
    }
}

impl NodeSettings {
    pub fn from_config(config: &AirlockConfig) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval(),
            idle_threshold: config.idle_threshold(),
            discovery_timeout: config.discovery_timeout(),
        }
    }
}

pub struct Node {
    directory: PeerDirectory,
    socket: Arc<UdpSocket>,
    settings: NodeSettings,
    shutdown: broadcast::Sender<()>,
}

impl Node {
    /// Bind the listen socket on `addr`. Port 0 picks a free port; the
    /// local identity always carries the port actually bound.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(
        addr: SocketAddr,
        display_name: impl Into<String>,
        settings: NodeSettings,
    ) -> Result<Self> {
        let socket = transport::bind_listener(addr).context("failed to bind listen socket")?;
        let bound = socket.local_addr().context("failed to read bound address")?;
        let local = LocalIdentity::new(PeerAddress::from(bound), display_name);

        tracing::info!(addr = %local.address, name = %local.display_name, "node bound");

        let (shutdown, _) = broadcast::channel(1);
        Ok(Self {
            directory: PeerDirectory::new(local),
            socket: Arc::new(socket),
            settings,
            shutdown,
        })
    }

    pub fn local(&self) -> LocalIdentity {
        self.directory.local()
    }

    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    /// Spawn the inbound handler. Chat lines are delivered on `chat_tx`.
    pub fn start_inbound(&self, chat_tx: mpsc::UnboundedSender<ChatLine>) -> JoinHandle<Result<()>> {
        let handler = InboundHandler::new(
            self.socket.clone(),
            self.directory.clone(),
            chat_tx,
            self.shutdown.subscribe(),
        );
        tokio::spawn(handler.run())
    }

    /// Spawn the heartbeat sender.
    pub fn start_heartbeat(&self) -> JoinHandle<Result<()>> {
        tokio::spawn(heartbeat::heartbeat_loop(
            self.directory.clone(),
            self.settings.heartbeat_interval,
            self.shutdown.subscribe(),
        ))
    }

    /// Join the circle `bootstrap` belongs to.
    pub async fn join(&self, bootstrap: PeerAddress) -> Result<JoinReport, DiscoveryError> {
        discovery::join(&self.directory, bootstrap, self.settings.discovery_timeout).await
    }

    pub fn broadcaster(&self) -> Broadcaster {
        Broadcaster::new(self.directory.clone(), self.settings.idle_threshold)
    }

    /// Stop the inbound handler and heartbeat sender.
    pub fn shutdown(&self) {
        // No receivers just means nothing was started.
        let _ = self.shutdown.send(());
    }
}
