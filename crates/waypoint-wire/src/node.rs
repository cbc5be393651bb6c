//! DiscoveryNode: stream handler and request originator for the protocol.
//!
//! A [`DiscoveryNode`] registers itself with a [`Transport`] as the handler
//! for inbound streams of its protocol. Each inbound stream is read line by
//! line; every message first records its originator in the [`PeerStore`] and
//! is then dispatched by type:
//!
//! - `PING` has no further effect.
//! - `FIND_PEER` requests are answered from the local store, or silently
//!   dropped when the target is unknown.
//! - `FIND_PEER` responses complete the matching [`PeerLookup`].
//!
//! Outbound messages go to the bootstrap peer over a fresh stream each, one
//! message per stream. Failures anywhere are logged and swallowed; the only
//! failure a caller can observe is a lookup that never completes, surfaced as
//! a [`LookupError`] when waiting with a deadline.

use crate::error::{LookupError, WireError};
use crate::message::{
    decode_message, encode_message, read_frame, DiscoveryMessage, Frame, MessageKind, PROTOCOL_ID,
};
use crate::pending::{Completion, PendingLookups};
use crate::registry::PeerStore;
use crate::transport::{BoxedStream, StreamHandler, Transport};
use crate::verify::{AcceptAll, PeerVerifier};

use futures::FutureExt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use waypoint_types::config::NodeConfig;
use waypoint_types::{PeerId, PeerRecord};

/// Default time an unanswered lookup stays in the pending table.
pub const DEFAULT_LOOKUP_TTL: Duration = Duration::from_secs(300);

/// Settings fixed at node construction.
#[derive(Debug, Clone)]
pub struct NodeOptions {
    /// This node's own record, sent as the originator of every message.
    pub local: PeerRecord,
    /// The bootstrap peer. Its record is pinned in the store and never
    /// overwritten by inbound messages.
    pub bootstrap: PeerRecord,
    pub protocol_id: String,
    /// Age after which an unanswered lookup is expired.
    pub lookup_ttl: Duration,
    /// How often the background sweeper expires lookups. `None` disables it.
    pub sweep_interval: Option<Duration>,
}

impl NodeOptions {
    pub fn new(local: PeerRecord, bootstrap: PeerRecord) -> Self {
        Self {
            local,
            bootstrap,
            protocol_id: PROTOCOL_ID.to_string(),
            lookup_ttl: DEFAULT_LOOKUP_TTL,
            sweep_interval: None,
        }
    }

    /// Options from a loaded configuration, with `local` as this node's record.
    pub fn from_config(config: &NodeConfig, local: PeerRecord) -> Self {
        Self {
            local,
            bootstrap: config.bootstrap.record(),
            protocol_id: config.protocol_id.clone(),
            lookup_ttl: config.lookup_ttl(),
            sweep_interval: config.sweep_interval(),
        }
    }
}

/// What processing one inbound message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// A `PING`; the sender is now known.
    Announced { peer: PeerId },
    /// A `FIND_PEER` request was answered.
    Answered { requester: PeerId, target: PeerId },
    /// A `FIND_PEER` response completed a pending lookup.
    Resolved { nonce: String, peer: PeerId },
    /// A response with nothing to complete.
    Ignored,
}

/// A discovery node: handles inbound protocol streams and originates
/// lookups through the bootstrap peer.
pub struct DiscoveryNode {
    options: NodeOptions,
    transport: Arc<dyn Transport>,
    store: Arc<dyn PeerStore>,
    verifier: Arc<dyn PeerVerifier>,
    pending: Arc<PendingLookups>,
}

impl DiscoveryNode {
    /// Build the node, register its stream handler and announce it to the
    /// bootstrap peer.
    pub async fn start(
        options: NodeOptions,
        transport: Arc<dyn Transport>,
        store: Arc<dyn PeerStore>,
    ) -> Arc<Self> {
        Self::start_with_verifier(options, transport, store, Arc::new(AcceptAll)).await
    }

    /// Like [`DiscoveryNode::start`], with a custom check applied to every
    /// record before it is stored.
    pub async fn start_with_verifier(
        options: NodeOptions,
        transport: Arc<dyn Transport>,
        store: Arc<dyn PeerStore>,
        verifier: Arc<dyn PeerVerifier>,
    ) -> Arc<Self> {
        store.put(options.bootstrap.clone());

        let node = Arc::new(Self {
            options,
            transport,
            store,
            verifier,
            pending: Arc::new(PendingLookups::new()),
        });

        node.transport
            .register_stream_handler(&node.options.protocol_id, Self::stream_handler(&node));

        if let Some(interval) = node.options.sweep_interval {
            if spawn_sweeper(Arc::downgrade(&node), interval).is_none() {
                warn!("Sweep interval is zero; stale lookups will not be expired automatically");
            }
        }

        info!(
            peer = %node.options.local.id,
            bootstrap = %node.options.bootstrap.id,
            protocol = %node.options.protocol_id,
            "Discovery node started"
        );

        if node.is_bootstrap() {
            debug!("Local node is the bootstrap peer; not announcing");
        } else {
            node.announce().await;
        }

        node
    }

    /// The transport callback. Holds the node weakly so that dropping the
    /// last external handle lets the node go.
    fn stream_handler(node: &Arc<Self>) -> StreamHandler {
        let weak = Arc::downgrade(node);
        Arc::new(move |stream: BoxedStream| {
            let weak = weak.clone();
            async move {
                if let Some(node) = weak.upgrade() {
                    node.handle_stream(stream).await;
                }
            }
            .boxed()
        })
    }

    pub fn local(&self) -> &PeerRecord {
        &self.options.local
    }

    pub fn bootstrap(&self) -> &PeerRecord {
        &self.options.bootstrap
    }

    pub fn protocol_id(&self) -> &str {
        &self.options.protocol_id
    }

    pub fn store(&self) -> &Arc<dyn PeerStore> {
        &self.store
    }

    /// Whether this node is itself the bootstrap peer.
    pub fn is_bootstrap(&self) -> bool {
        self.options.local.id == self.options.bootstrap.id
    }

    /// Number of lookups still waiting for a response.
    pub fn pending_lookups(&self) -> usize {
        self.pending.len()
    }

    /// Read and process newline-delimited messages until the stream closes.
    ///
    /// A bad message never ends the loop; only end-of-stream or a read error
    /// does.
    pub async fn handle_stream(&self, stream: BoxedStream) {
        let mut reader = BufReader::new(stream);
        let mut line = Vec::new();

        loop {
            match read_frame(&mut reader, &mut line).await {
                Ok(Frame::Eof) => break,
                Ok(Frame::Oversized) => {
                    warn!("Dropping oversized message line");
                }
                Ok(Frame::Line) => match self.handle_line(&line).await {
                    Ok(handled) => debug!(?handled, "Message handled"),
                    Err(e) => log_dropped(&e),
                },
                Err(e) => {
                    debug!(error = %e, "Stream read failed, closing");
                    break;
                }
            }
        }
    }

    /// Decode and process a single line.
    pub async fn handle_line(&self, line: &[u8]) -> Result<Handled, WireError> {
        let message = decode_message(line)?;
        self.handle_message(message).await
    }

    /// Process one decoded message.
    pub async fn handle_message(&self, message: DiscoveryMessage) -> Result<Handled, WireError> {
        if message.nonce.is_empty() {
            return Err(WireError::EmptyNonce);
        }

        debug!(
            kind = %message.kind,
            nonce = %message.nonce,
            from = %message.originator.id,
            response = message.is_response,
            "Got message"
        );

        // Any sender becomes reachable for replies and discoverable by others.
        self.remember(&message.originator)?;

        match message.kind.clone() {
            MessageKind::Ping => Ok(Handled::Announced {
                peer: message.originator.id,
            }),
            MessageKind::FindPeer if message.is_response => self.complete_lookup(message),
            MessageKind::FindPeer => self.answer(message).await,
            MessageKind::Unknown => Err(WireError::UnknownKind(String::new())),
            MessageKind::Other(kind) => Err(WireError::UnknownKind(kind)),
        }
    }

    /// Respond to a `FIND_PEER` request if the target is known.
    ///
    /// An unknown target gets no reply at all: the requester's lookup simply
    /// never completes.
    async fn answer(&self, request: DiscoveryMessage) -> Result<Handled, WireError> {
        let found = self.store.get(&request.target_id)?;
        let reply = DiscoveryMessage::respond(&request, self.options.local.clone(), found);
        self.send_message(&request.originator.id, &reply).await;
        Ok(Handled::Answered {
            requester: request.originator.id,
            target: request.target_id,
        })
    }

    fn complete_lookup(&self, response: DiscoveryMessage) -> Result<Handled, WireError> {
        if !self.pending.contains(&response.nonce) {
            return Ok(Handled::Ignored);
        }
        let Some(found) = response.target_peer else {
            return Ok(Handled::Ignored);
        };

        self.remember(&found)?;

        let peer = found.id.clone();
        match self.pending.complete(&response.nonce, &response.target_id, found) {
            Completion::Delivered => Ok(Handled::Resolved {
                nonce: response.nonce,
                peer,
            }),
            Completion::TargetMismatch { expected, got } => {
                Err(WireError::TargetMismatch { expected, got })
            }
            Completion::NoPending | Completion::ReceiverGone => Ok(Handled::Ignored),
        }
    }

    /// Upsert `record` into the store, except for the pinned bootstrap record.
    fn remember(&self, record: &PeerRecord) -> Result<(), WireError> {
        if record.id == self.options.bootstrap.id {
            return Ok(());
        }
        if !self.verifier.verify(record) {
            return Err(WireError::UnverifiedPeer(record.id.clone()));
        }
        self.store.put(record.clone());
        Ok(())
    }

    /// Ask the bootstrap peer to resolve `target`.
    ///
    /// Returns immediately after the request is sent. If the bootstrap does
    /// not know the target the returned lookup is never answered; use
    /// [`PeerLookup::wait_timeout`] to bound the wait.
    pub async fn find_peer(&self, target: impl Into<PeerId>) -> PeerLookup {
        let target = target.into();
        let message = DiscoveryMessage::find_peer(self.options.local.clone(), target.clone());
        let receiver = self.pending.register(message.nonce.clone(), target.clone());
        let lookup = PeerLookup {
            nonce: message.nonce.clone(),
            target,
            receiver: Some(receiver),
            pending: Arc::clone(&self.pending),
        };

        self.send_message(&self.options.bootstrap.id, &message).await;
        lookup
    }

    /// Announce this node to the bootstrap peer.
    pub async fn announce(&self) {
        let message = DiscoveryMessage::announce(self.options.local.clone());
        self.send_message(&self.options.bootstrap.id, &message).await;
    }

    /// Deliver `message` to `peer` over a fresh stream. Failures are logged.
    pub async fn send_message(&self, peer: &PeerId, message: &DiscoveryMessage) {
        if let Err(e) = self.try_send(peer, message).await {
            warn!(peer = %peer, kind = %message.kind, error = %e, "Could not send message");
        }
    }

    async fn try_send(&self, peer: &PeerId, message: &DiscoveryMessage) -> Result<(), WireError> {
        let bytes = encode_message(message)?;
        let mut stream = self
            .transport
            .open_stream(&self.options.protocol_id, peer)
            .await?;

        debug!(
            peer = %peer,
            kind = %message.kind,
            nonce = %message.nonce,
            response = message.is_response,
            "Sending message"
        );
        stream.write_all(&bytes).await?;
        stream.flush().await?;
        stream.shutdown().await?;
        Ok(())
    }

    /// Expire lookups older than the configured TTL.
    pub fn expire_stale_lookups(&self) -> usize {
        self.pending.expire(self.options.lookup_ttl)
    }
}

fn log_dropped(error: &WireError) {
    match error {
        WireError::TargetNotFound(id) => {
            debug!(target_peer = %id, "Unknown target, not replying")
        }
        _ => warn!(error = %error, "Dropping message"),
    }
}

/// Periodically expire stale lookups until the node is dropped.
///
/// A zero interval starts nothing and returns `None`.
fn spawn_sweeper(node: Weak<DiscoveryNode>, interval: Duration) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(node) = node.upgrade() else {
                break;
            };
            let expired = node.expire_stale_lookups();
            if expired > 0 {
                debug!(expired, "Expired stale lookups");
            }
        }
    }))
}

/// Handle to one outstanding `FIND_PEER` lookup.
///
/// Delivers at most one record. Dropping the handle before a result arrives
/// removes the lookup from the pending table.
pub struct PeerLookup {
    nonce: String,
    target: PeerId,
    receiver: Option<oneshot::Receiver<PeerRecord>>,
    pending: Arc<PendingLookups>,
}

impl PeerLookup {
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn target(&self) -> &PeerId {
        &self.target
    }

    /// Wait for the result with no deadline.
    pub async fn wait(mut self) -> Result<PeerRecord, LookupError> {
        match self.receiver.take() {
            Some(receiver) => receiver.await.map_err(|_| LookupError::Abandoned),
            None => Err(LookupError::Abandoned),
        }
    }

    /// Wait for the result for at most `timeout`.
    pub async fn wait_timeout(self, timeout: Duration) -> Result<PeerRecord, LookupError> {
        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(result) => result,
            Err(_) => Err(LookupError::TimedOut(timeout)),
        }
    }
}

impl Drop for PeerLookup {
    fn drop(&mut self) {
        self.pending.cancel(&self.nonce);
    }
}

impl std::fmt::Debug for PeerLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerLookup")
            .field("nonce", &self.nonce)
            .field("target", &self.target)
            .finish()
    }
}
