//! Peer identity and contact records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a peer.
///
/// Carries no structure: two peers are the same peer iff their ids are equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Wrap an identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier (UUIDv4, upper-case).
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for PeerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A peer's identity together with the ordered list of addresses it can be
/// reached at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Identity of the peer.
    pub id: PeerId,
    /// Network addresses (`host:port`), most preferred first.
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl PeerRecord {
    pub fn new(id: impl Into<PeerId>, addresses: Vec<String>) -> Self {
        Self {
            id: id.into(),
            addresses,
        }
    }
}
