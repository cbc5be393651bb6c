//! Waypoint discovery protocol: bootstrap-relayed peer lookup.
//!
//! A node resolves an opaque [`PeerId`] into a [`PeerRecord`] by asking a
//! single well-known bootstrap peer. Every message a node receives also
//! records its sender in the local peer store, which is how peers become
//! discoverable without an explicit join step.
//!
//! ## Architecture
//!
//! - **DiscoveryMessage**: line-delimited JSON wire messages (`FIND_PEER`, `PING`)
//! - **DiscoveryNode**: stream handler plus request originator
//! - **PendingLookups**: nonce-keyed table of outstanding lookups
//! - **PeerStore**: the peer registry the node reads and writes
//! - **Transport**: stream-oriented networking, with in-memory
//!   and TCP implementations

pub mod error;
pub mod message;
pub mod node;
pub mod pending;
pub mod registry;
pub mod tcp;
pub mod transport;
pub mod verify;

pub use error::{LookupError, WireError};
pub use message::{DiscoveryMessage, MessageKind, PROTOCOL_ID};
pub use node::{DiscoveryNode, Handled, NodeOptions, PeerLookup};
pub use pending::PendingLookups;
pub use registry::{MemoryPeerStore, PeerStore};
pub use tcp::TcpTransport;
pub use transport::{BoxedStream, MemoryNetwork, MemoryTransport, StreamHandler, Transport};
pub use verify::{AcceptAll, PeerVerifier};
pub use waypoint_types::{PeerId, PeerRecord};
