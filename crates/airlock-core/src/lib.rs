//! airlock-core: shared types, wire format, and configuration.
//! All other Airlock crates depend on this one.

pub mod config;
pub mod peer;
pub mod wire;

pub use peer::{AddressParseError, LocalIdentity, PeerAddress};
pub use wire::{Message, WireError};
