//! Airlock wire format: the five datagrams of the circle protocol.
//!
//! Every datagram is a 4-byte `FrameHeader` followed by a kind-specific body.
//! The header is decoded once and the body is parsed according to `kind`, so a
//! chat line that happens to contain "/quit" is still just a chat line.
//!
//! Body layouts (integers big-endian):
//!
//!   JoinRequest   port: u16, display name (UTF-8, rest of datagram)
//!   JoinResponse  "nil" or comma-separated `ip:port` entries (UTF-8)
//!   Heartbeat     port: u16
//!   Leave         port: u16
//!   Chat          name_len: u16, name (UTF-8), body (UTF-8, rest of datagram)

use bytes::{Buf, BufMut, Bytes, BytesMut};
use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::peer::PeerAddress;

// ── Frame Header ─────────────────────────────────────────────────────────────

/// Fixed prefix of every Airlock datagram.
///
/// Wire size: 4 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct FrameHeader {
    /// Always `MAGIC`. Anything else is not ours and is dropped.
    pub magic: [u8; 2],

    /// Wire format version. Currently 0x01.
    pub version: u8,

    /// `MessageKind` discriminant.
    pub kind: u8,
}

assert_eq_size!(FrameHeader, [u8; 4]);

pub const HEADER_LEN: usize = std::mem::size_of::<FrameHeader>();

// ── Message Kind ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    JoinRequest = 0x01,
    JoinResponse = 0x02,
    Heartbeat = 0x03,
    Leave = 0x04,
    Chat = 0x05,
}

impl TryFrom<u8> for MessageKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(MessageKind::JoinRequest),
            0x02 => Ok(MessageKind::JoinResponse),
            0x03 => Ok(MessageKind::Heartbeat),
            0x04 => Ok(MessageKind::Leave),
            0x05 => Ok(MessageKind::Chat),
            other => Err(WireError::UnknownKind(other)),
        }
    }
}

impl From<MessageKind> for u8 {
    fn from(k: MessageKind) -> u8 {
        k as u8
    }
}

// ── Message ──────────────────────────────────────────────────────────────────

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// "Let me into the group." Carries the joiner's listen port.
    JoinRequest { port: u16, name: String },

    /// Reply to a JoinRequest: the responder's membership, minus itself and
    /// minus the requester.
    JoinResponse { peers: Vec<PeerAddress> },

    /// "I am alive." Carries the sender's listen port.
    Heartbeat { port: u16 },

    /// "Remove me from your view." Carries the sender's listen port.
    Leave { port: u16 },

    /// A broadcast line for display.
    Chat { name: String, body: String },
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::JoinRequest { .. } => MessageKind::JoinRequest,
            Message::JoinResponse { .. } => MessageKind::JoinResponse,
            Message::Heartbeat { .. } => MessageKind::Heartbeat,
            Message::Leave { .. } => MessageKind::Leave,
            Message::Chat { .. } => MessageKind::Chat,
        }
    }

    /// Serialize into a single datagram payload.
    pub fn encode(&self) -> Bytes {
        let header = FrameHeader {
            magic: MAGIC,
            version: WIRE_VERSION,
            kind: self.kind().into(),
        };

        let mut buf = BytesMut::with_capacity(HEADER_LEN + 32);
        buf.put_slice(header.as_bytes());

        match self {
            Message::JoinRequest { port, name } => {
                buf.put_u16(*port);
                buf.put_slice(name.as_bytes());
            }
            Message::JoinResponse { peers } => {
                buf.put_slice(encode_peer_list(peers).as_bytes());
            }
            Message::Heartbeat { port } | Message::Leave { port } => {
                buf.put_u16(*port);
            }
            Message::Chat { name, body } => {
                // name_len is a u16; longer names are cut at a char boundary.
                let name = truncate_utf8(name, u16::MAX as usize);
                buf.put_u16(name.len() as u16);
                buf.put_slice(name.as_bytes());
                buf.put_slice(body.as_bytes());
            }
        }

        buf.freeze()
    }

    /// Parse a datagram payload.
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        let header = FrameHeader::read_from_prefix(data).ok_or(WireError::TooShort(data.len()))?;

        // Copy packed fields to locals before comparing.
        let magic = header.magic;
        let version = header.version;
        if magic != MAGIC {
            return Err(WireError::BadMagic(magic));
        }
        if version != WIRE_VERSION {
            return Err(WireError::UnknownVersion(version));
        }

        let kind = MessageKind::try_from(header.kind)?;
        let mut body = &data[HEADER_LEN..];

        match kind {
            MessageKind::JoinRequest => {
                let port = listen_port(take_u16(&mut body, kind)?, kind)?;
                let name = utf8(body, kind)?;
                Ok(Message::JoinRequest { port, name })
            }
            MessageKind::JoinResponse => {
                let text = utf8(body, kind)?;
                Ok(Message::JoinResponse {
                    peers: decode_peer_list(&text)?,
                })
            }
            MessageKind::Heartbeat => Ok(Message::Heartbeat {
                port: exact_port(body, kind)?,
            }),
            MessageKind::Leave => Ok(Message::Leave {
                port: exact_port(body, kind)?,
            }),
            MessageKind::Chat => {
                let name_len = take_u16(&mut body, kind)? as usize;
                if body.len() < name_len {
                    return Err(WireError::Truncated(kind));
                }
                let (name, text) = body.split_at(name_len);
                Ok(Message::Chat {
                    name: utf8(name, kind)?,
                    body: utf8(text, kind)?,
                })
            }
        }
    }
}

// ── Body helpers ─────────────────────────────────────────────────────────────

fn take_u16(body: &mut &[u8], kind: MessageKind) -> Result<u16, WireError> {
    if body.remaining() < 2 {
        return Err(WireError::Truncated(kind));
    }
    Ok(body.get_u16())
}

/// Port 0 is never a listen port; a message naming it cannot identify a peer.
fn listen_port(port: u16, kind: MessageKind) -> Result<u16, WireError> {
    if port == 0 {
        return Err(WireError::ZeroPort(kind));
    }
    Ok(port)
}

fn exact_port(mut body: &[u8], kind: MessageKind) -> Result<u16, WireError> {
    let port = take_u16(&mut body, kind)?;
    if !body.is_empty() {
        return Err(WireError::TrailingBytes {
            kind,
            extra: body.len(),
        });
    }
    listen_port(port, kind)
}

fn utf8(bytes: &[u8], kind: MessageKind) -> Result<String, WireError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| WireError::InvalidUtf8(kind))
}

fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn encode_peer_list(peers: &[PeerAddress]) -> String {
    if peers.is_empty() {
        return EMPTY_PEER_LIST.to_string();
    }
    peers
        .iter()
        .map(PeerAddress::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn decode_peer_list(text: &str) -> Result<Vec<PeerAddress>, WireError> {
    if text == EMPTY_PEER_LIST {
        return Ok(Vec::new());
    }
    text.split(',')
        .map(|entry| match entry.parse::<PeerAddress>() {
            Ok(peer) if peer.port() != 0 => Ok(peer),
            _ => Err(WireError::BadPeerEntry(entry.to_string())),
        })
        .collect()
}

// ── Constants ─────────────────────────────────────────────────────────────────

/// First two bytes of every datagram.
pub const MAGIC: [u8; 2] = *b"AL";

/// Current wire format version.
pub const WIRE_VERSION: u8 = 0x01;

/// JoinResponse body meaning "no other members".
pub const EMPTY_PEER_LIST: &str = "nil";

/// Default UDP listen port.
pub const DEFAULT_PORT: u16 = 9001;

/// Default heartbeat period in seconds.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 300;

/// Default idle threshold in seconds.
/// Peers not heard from within this window are skipped by the broadcaster.
pub const IDLE_THRESHOLD_SECS: u64 = 600;

/// Receive buffer size. Payloads must fit in one datagram.
pub const RECV_BUFFER_SIZE: usize = 65536;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("datagram too short for header: {0} bytes")]
    TooShort(usize),

    #[error("bad magic: {0:02x?}")]
    BadMagic([u8; 2]),

    #[error("unknown wire version: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("unknown message kind: 0x{0:02x}")]
    UnknownKind(u8),

    #[error("truncated {0:?} body")]
    Truncated(MessageKind),

    #[error("{extra} trailing bytes after {kind:?} body")]
    TrailingBytes { kind: MessageKind, extra: usize },

    #[error("{0:?} body is not valid UTF-8")]
    InvalidUtf8(MessageKind),

    #[error("{0:?} names port 0")]
    ZeroPort(MessageKind),

    #[error("malformed peer list entry: {0:?}")]
    BadPeerEntry(String),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
