//! airlock-services: the circle membership and gossip protocol.
//!
//! The directory is the only shared mutable state. The inbound handler, the
//! heartbeat sender and the broadcaster each run on their own task and meet
//! only through it.

pub mod broadcaster;
pub mod directory;
pub mod discovery;
pub mod heartbeat;
pub mod inbound;
pub mod liveness;
pub mod node;
pub mod transport;

pub use broadcaster::{BroadcastEnd, Broadcaster, LEAVE_COMMAND};
pub use directory::{Peer, PeerDirectory};
pub use discovery::{DiscoveryError, JoinReport};
pub use inbound::{ChatLine, InboundHandler};
pub use node::{Node, NodeSettings};
pub use transport::FanoutReport;
