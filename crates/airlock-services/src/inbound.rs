//! Inbound datagram handler: the single consumer of the listen socket.
//!
//! Classifies each datagram and applies it to the directory. Join requests are
//! answered with our membership before the requester is added, so a peer is
//! never listed in its own introduction.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};

use airlock_core::wire::RECV_BUFFER_SIZE;
use airlock_core::{Message, PeerAddress};

use crate::directory::PeerDirectory;

/// A received chat message, ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub from: SocketAddr,
    pub name: String,
    pub body: String,
}

impl fmt::Display for ChatLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{} > {}", self.from.ip(), self.body)
        } else {
            write!(f, "{} {} > {}", self.from.ip(), self.name, self.body)
        }
    }
}

/// Membership to send back to `requester`: everyone we know except the
/// requester itself. The local identity is never in the directory.
pub fn join_response_for(directory: &PeerDirectory, requester: &PeerAddress) -> Vec<PeerAddress> {
    directory
        .snapshot_all()
        .into_iter()
        .map(|p| p.address)
        .filter(|a| a != requester)
        .collect()
}

pub struct InboundHandler {
    socket: Arc<UdpSocket>,
    directory: PeerDirectory,
    chat_tx: mpsc::UnboundedSender<ChatLine>,
    shutdown: broadcast::Receiver<()>,
}

impl InboundHandler {
    pub fn new(
        socket: Arc<UdpSocket>,
        directory: PeerDirectory,
        chat_tx: mpsc::UnboundedSender<ChatLine>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            socket,
            directory,
            chat_tx,
            shutdown,
        }
    }

    /// Receive until shutdown. Bad datagrams and receive errors are logged
    /// and skipped.
    pub async fn run(mut self) -> Result<()> {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        tracing::info!(addr = %self.directory.local().address, "inbound handler starting");

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("inbound handler shutting down");
                    return Ok(());
                }

                result = self.socket.recv_from(&mut buf) => {
                    let (len, src) = match result {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::warn!(error = %e, "recv_from failed");
                            continue;
                        }
                    };
                    self.handle(&buf[..len], src).await;
                }
            }
        }
    }

    /// Apply one datagram received from `src`.
    pub async fn handle(&self, data: &[u8], src: SocketAddr) {
        let msg = match Message::decode(data) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(%src, len = data.len(), error = %e, "dropping undecodable datagram");
                return;
            }
        };

        match msg {
            Message::Chat { name, body } => self.handle_chat(src, name, body),
            Message::Leave { port } => self.handle_leave(src, port),
            Message::Heartbeat { port } => self.handle_heartbeat(src, port),
            Message::JoinRequest { port, name } => self.handle_join_request(src, port, name).await,
            Message::JoinResponse { .. } => {
                tracing::debug!(%src, "unsolicited join response on listen socket, ignoring");
            }
        }
    }

    fn handle_chat(&self, src: SocketAddr, name: String, body: String) {
        tracing::debug!(%src, "chat message");
        let line = ChatLine {
            from: src,
            name,
            body,
        };
        if self.chat_tx.send(line).is_err() {
            tracing::trace!("chat sink closed, dropping line");
        }
    }

    fn handle_leave(&self, src: SocketAddr, port: u16) {
        let peer = PeerAddress::new(src.ip(), port);
        if self.directory.remove(&peer) {
            tracing::info!(%peer, "peer left");
        } else {
            tracing::debug!(%peer, "leave from unknown peer");
        }
    }

    fn handle_heartbeat(&self, src: SocketAddr, port: u16) {
        let peer = PeerAddress::new(src.ip(), port);
        if self.directory.touch(&peer) {
            tracing::debug!(%peer, "heartbeat");
        } else {
            tracing::debug!(%peer, "heartbeat from unknown peer");
        }
    }

    async fn handle_join_request(&self, src: SocketAddr, port: u16, name: String) {
        let requester = PeerAddress::new(src.ip(), port);
        if self.directory.local().is_self(&requester) {
            tracing::debug!(%src, "ignoring join request naming ourselves");
            return;
        }

        tracing::info!(%requester, %src, "join request");

        // Reply first, then record the requester.
        let peers = join_response_for(&self.directory, &requester);
        let count = peers.len();
        let reply = Message::JoinResponse { peers }.encode();
        match self.socket.send_to(&reply, src).await {
            Ok(_) => tracing::debug!(%src, count, "sent peer list"),
            Err(e) => tracing::warn!(%src, error = %e, "failed to send peer list"),
        }

        let name = (!name.is_empty()).then_some(name.as_str());
        self.directory.add_or_touch(requester, name);
        self.directory.touch(&requester);
    }
}
