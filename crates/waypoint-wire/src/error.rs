//! Errors from the discovery protocol layer.
//!
//! Nothing in the stream handler propagates these to a caller: every variant
//! is logged and the offending message dropped. They exist so that each drop
//! has a name in the logs and in tests.

use std::time::Duration;
use thiserror::Error;
use waypoint_types::PeerId;

/// Errors from the wire protocol layer.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),
    #[error("Message has no nonce")]
    EmptyNonce,
    #[error("Peer not found: {0}")]
    TargetNotFound(PeerId),
    #[error("Response carries peer {got}, expected {expected}")]
    TargetMismatch { expected: PeerId, got: PeerId },
    #[error("Unknown message type: {0:?}")]
    UnknownKind(String),
    #[error("Peer record rejected by verifier: {0}")]
    UnverifiedPeer(PeerId),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why a [`PeerLookup`](crate::node::PeerLookup) finished without a result.
///
/// A lookup for a peer the bootstrap does not know is never answered; these
/// variants are the only way a caller can tell.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("Lookup timed out after {0:?}")]
    TimedOut(Duration),
    /// The pending entry was expired or cancelled before a response arrived.
    #[error("Lookup abandoned before a response arrived")]
    Abandoned,
}
