//! Peer registry: identity to contact record.
//!
//! The discovery node only ever upserts whole records and reads them back by
//! id, so the interface is just [`PeerStore::put`] and
//! [`PeerStore::get`]. [`MemoryPeerStore`] is the thread-safe in-process
//! implementation used by the CLI and the tests.

use crate::error::WireError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use waypoint_types::{PeerId, PeerRecord};

/// Storage for known peers. Shared by every stream handler on a node.
pub trait PeerStore: Send + Sync + 'static {
    /// Insert or replace the record for `record.id`.
    fn put(&self, record: PeerRecord);

    /// Fetch a record, or [`WireError::TargetNotFound`].
    fn get(&self, id: &PeerId) -> Result<PeerRecord, WireError>;
}

/// Thread-safe in-memory registry of known peers.
#[derive(Debug, Clone, Default)]
pub struct MemoryPeerStore {
    peers: Arc<RwLock<HashMap<PeerId, PeerRecord>>>,
}

impl MemoryPeerStore {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove a peer entirely.
    pub fn remove(&self, id: &PeerId) -> Option<PeerRecord> {
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        peers.remove(id)
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers.contains_key(id)
    }

    /// Snapshot of all known peers, ordered by id.
    pub fn all_peers(&self) -> Vec<PeerRecord> {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<PeerRecord> = peers.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn len(&self) -> usize {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PeerStore for MemoryPeerStore {
    fn put(&self, record: PeerRecord) {
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        peers.insert(record.id.clone(), record);
    }

    fn get(&self, id: &PeerId) -> Result<PeerRecord, WireError> {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers
            .get(id)
            .cloned()
            .ok_or_else(|| WireError::TargetNotFound(id.clone()))
    }
}
