//! Datagram transport helpers.
//!
//! The listen socket is owned by the inbound handler. Every other send goes
//! through a short-lived, send-only socket per datagram, so senders never
//! contend with each other or with the receive loop.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use airlock_core::PeerAddress;

/// Bind the node's listen socket.
pub fn bind_listener(addr: SocketAddr) -> Result<UdpSocket> {
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).context("socket()")?;

    if addr.is_ipv6() {
        socket.set_only_v6(false).context("IPV6_V6ONLY")?;
    }
    socket.set_nonblocking(true).context("set_nonblocking")?;
    socket
        .bind(&addr.into())
        .with_context(|| format!("bind({addr})"))?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket).context("failed to convert to tokio UdpSocket")
}

/// Bind an ephemeral socket able to reach `dest`.
pub async fn ephemeral_for(dest: SocketAddr) -> io::Result<UdpSocket> {
    let any: SocketAddr = if dest.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    UdpSocket::bind(any).await
}

/// Send one datagram to `dest` from a fresh ephemeral socket.
pub async fn send_datagram(dest: PeerAddress, payload: &[u8]) -> io::Result<()> {
    let dest = dest.socket_addr();
    let socket = ephemeral_for(dest).await?;
    socket.send_to(payload, dest).await?;
    Ok(())
}

/// Outcome of one fan-out round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Send `payload` to every target. A failed send is logged and the round
/// continues with the remaining targets.
pub async fn send_all(
    targets: impl IntoIterator<Item = PeerAddress>,
    payload: &[u8],
) -> FanoutReport {
    let mut report = FanoutReport::default();
    for dest in targets {
        match send_datagram(dest, payload).await {
            Ok(()) => report.sent += 1,
            Err(e) => {
                tracing::warn!(peer = %dest, error = %e, "send failed");
                report.failed += 1;
            }
        }
    }
    report
}
