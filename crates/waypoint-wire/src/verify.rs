//! Peer record verification hook.
//!
//! Every record a node is about to store (a message originator, or a peer
//! carried in a response) passes through a [`PeerVerifier`] first. The
//! protocol has no identity proofs, so the default [`AcceptAll`] trusts every
//! claim; deployments that can check records plug in their own.

use waypoint_types::PeerRecord;

pub trait PeerVerifier: Send + Sync + 'static {
    /// Return `false` to keep `record` out of the peer store.
    fn verify(&self, record: &PeerRecord) -> bool;
}

/// Trusts every claimed identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl PeerVerifier for AcceptAll {
    fn verify(&self, _record: &PeerRecord) -> bool {
        true
    }
}

impl<F> PeerVerifier for F
where
    F: Fn(&PeerRecord) -> bool + Send + Sync + 'static,
{
    fn verify(&self, record: &PeerRecord) -> bool {
        self(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_all() {
        assert!(AcceptAll.verify(&PeerRecord::new("anyone", vec![])));
    }

    #[test]
    fn test_closure_verifier() {
        let verifier = |r: &PeerRecord| !r.addresses.is_empty();
        assert!(!verifier.verify(&PeerRecord::new("a", vec![])));
        assert!(verifier.verify(&PeerRecord::new("a", vec!["127.0.0.1:1".into()])));
    }
}
