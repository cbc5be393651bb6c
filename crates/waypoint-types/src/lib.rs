//! Core types for the Waypoint peer discovery protocol.
//!
//! This crate defines the data shared between the wire protocol and the CLI:
//! peer identities, peer records, node configuration and the top-level error
//! type. It contains no networking logic.

pub mod config;
pub mod error;
pub mod peer;

pub use peer::{PeerId, PeerRecord};
