//! Pending lookup table: outstanding `FIND_PEER` requests keyed by nonce.
//!
//! Each entry owns the sending half of a one-shot channel, so a lookup can be
//! fulfilled at most once. Entries leave the table when they are fulfilled,
//! cancelled by the caller, or expired by [`PendingLookups::expire`].

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use waypoint_types::{PeerId, PeerRecord};

struct PendingLookup {
    target: PeerId,
    sender: oneshot::Sender<PeerRecord>,
    registered_at: Instant,
}

/// Result of offering a response to the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The record was delivered and the entry removed.
    Delivered,
    /// No entry for this nonce.
    NoPending,
    /// The response resolved a different peer; the entry stays pending.
    TargetMismatch { expected: PeerId, got: PeerId },
    /// The entry existed but its receiver was already dropped.
    ReceiverGone,
}

/// Concurrent nonce → pending lookup map.
#[derive(Default)]
pub struct PendingLookups {
    entries: DashMap<String, PendingLookup>,
}

impl PendingLookups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a lookup for `target` under `nonce` and return the receiving
    /// half of its delivery channel.
    pub fn register(&self, nonce: String, target: PeerId) -> oneshot::Receiver<PeerRecord> {
        let (sender, receiver) = oneshot::channel();
        self.entries.insert(
            nonce,
            PendingLookup {
                target,
                sender,
                registered_at: Instant::now(),
            },
        );
        receiver
    }

    pub fn contains(&self, nonce: &str) -> bool {
        self.entries.contains_key(nonce)
    }

    /// Offer `found` as the answer to the lookup registered under `nonce`.
    ///
    /// `requested` is the target id echoed back in the response. The record
    /// is delivered only if its id matches both that echo and the target the
    /// lookup was registered for.
    pub fn complete(&self, nonce: &str, requested: &PeerId, found: PeerRecord) -> Completion {
        {
            let Some(entry) = self.entries.get(nonce) else {
                return Completion::NoPending;
            };
            if found.id != *requested || found.id != entry.target {
                return Completion::TargetMismatch {
                    expected: entry.target.clone(),
                    got: found.id,
                };
            }
        }

        match self.entries.remove(nonce) {
            Some((_, entry)) => match entry.sender.send(found) {
                Ok(()) => Completion::Delivered,
                Err(_) => Completion::ReceiverGone,
            },
            None => Completion::NoPending,
        }
    }

    /// Drop the entry for `nonce`. Returns whether one existed.
    pub fn cancel(&self, nonce: &str) -> bool {
        self.entries.remove(nonce).is_some()
    }

    /// Drop every entry older than `ttl`, returning how many were removed.
    ///
    /// Dropping an entry closes its channel, so a caller waiting on it sees
    /// the lookup end without a result.
    pub fn expire(&self, ttl: Duration) -> usize {
        let mut expired = 0;
        self.entries.retain(|_, entry| {
            let keep = entry.registered_at.elapsed() < ttl;
            if !keep {
                expired += 1;
            }
            keep
        });
        expired
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
