//! Transport layer: opens outbound streams and dispatches inbound ones.
//!
//! The discovery node never touches sockets directly. It asks a [`Transport`]
//! for a fresh bidirectional stream per outbound message and registers a
//! [`StreamHandler`] that the transport invokes once per accepted inbound
//! stream, each on its own task.
//!
//! [`MemoryNetwork`] is an in-process transport hub: every node gets a
//! [`MemoryTransport`] bound to its peer id, and streams are
//! `tokio::io::duplex` pipes. The TCP implementation lives in [`crate::tcp`].

use crate::error::WireError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;
use waypoint_types::PeerId;

/// A bidirectional byte stream.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// A boxed transport stream.
pub type BoxedStream = Box<dyn AsyncStream>;

/// Callback invoked once per accepted inbound stream.
pub type StreamHandler = Arc<dyn Fn(BoxedStream) -> BoxFuture<'static, ()> + Send + Sync>;

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a new stream to `peer` speaking `protocol_id`.
    ///
    /// Fails with [`WireError::Connection`] if the peer is unreachable.
    async fn open_stream(&self, protocol_id: &str, peer: &PeerId)
        -> Result<BoxedStream, WireError>;

    /// Install the handler for inbound streams of `protocol_id`, replacing any
    /// previous one.
    fn register_stream_handler(&self, protocol_id: &str, handler: StreamHandler);
}

/// Buffer size of each in-memory pipe direction.
const MEMORY_PIPE_CAPACITY: usize = 64 * 1024;

/// In-process network connecting any number of [`MemoryTransport`]s.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    handlers: Arc<RwLock<HashMap<(PeerId, String), StreamHandler>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose inbound handlers are reachable as `local`.
    pub fn transport(&self, local: impl Into<PeerId>) -> MemoryTransport {
        MemoryTransport {
            local: local.into(),
            network: self.clone(),
        }
    }

    /// Make `peer` unreachable by dropping all of its handlers.
    pub fn disconnect(&self, peer: &PeerId) {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        handlers.retain(|(id, _), _| id != peer);
    }

    fn handler(&self, peer: &PeerId, protocol_id: &str) -> Option<StreamHandler> {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        handlers
            .get(&(peer.clone(), protocol_id.to_string()))
            .cloned()
    }
}

/// One node's view of a [`MemoryNetwork`].
#[derive(Clone)]
pub struct MemoryTransport {
    local: PeerId,
    network: MemoryNetwork,
}

impl MemoryTransport {
    pub fn local_id(&self) -> &PeerId {
        &self.local
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open_stream(
        &self,
        protocol_id: &str,
        peer: &PeerId,
    ) -> Result<BoxedStream, WireError> {
        let handler = self.network.handler(peer, protocol_id).ok_or_else(|| {
            WireError::Connection(format!("{peer} is not reachable for {protocol_id}"))
        })?;

        let (local_end, remote_end) = tokio::io::duplex(MEMORY_PIPE_CAPACITY);
        debug!(from = %self.local, to = %peer, protocol = protocol_id, "memory stream opened");
        tokio::spawn(handler(Box::new(remote_end)));
        Ok(Box::new(local_end))
    }

    fn register_stream_handler(&self, protocol_id: &str, handler: StreamHandler) {
        let mut handlers = self
            .network
            .handlers
            .write()
            .unwrap_or_else(|e| e.into_inner());
        handlers.insert((self.local.clone(), protocol_id.to_string()), handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::mpsc;

    /// Handler that forwards the whole inbound stream content to a channel.
    fn collecting_handler(tx: mpsc::UnboundedSender<Vec<u8>>) -> StreamHandler {
        Arc::new(move |mut stream: BoxedStream| {
            let tx = tx.clone();
            async move {
                let mut buf = Vec::new();
                let _ = stream.read_to_end(&mut buf).await;
                let _ = tx.send(buf);
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_open_stream_reaches_registered_handler() {
        let network = MemoryNetwork::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        network
            .transport("server")
            .register_stream_handler("/test/1", collecting_handler(tx));

        let client = network.transport("client");
        let mut stream = client
            .open_stream("/test/1", &PeerId::from("server"))
            .await
            .unwrap();
        stream.write_all(b"hello\n").await.unwrap();
        stream.shutdown().await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), b"hello\n");
    }

    #[tokio::test]
    async fn test_unknown_peer_or_protocol_is_connection_error() {
        let network = MemoryNetwork::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        network
            .transport("server")
            .register_stream_handler("/test/1", collecting_handler(tx));
        let client = network.transport("client");

        let err = client
            .open_stream("/test/1", &PeerId::from("nobody"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, WireError::Connection(_)));

        let err = client
            .open_stream("/test/2", &PeerId::from("server"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, WireError::Connection(_)));
    }

    #[tokio::test]
    async fn test_disconnect_makes_peer_unreachable() {
        let network = MemoryNetwork::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        network
            .transport("server")
            .register_stream_handler("/test/1", collecting_handler(tx));
        network.disconnect(&PeerId::from("server"));

        let result = network
            .transport("client")
            .open_stream("/test/1", &PeerId::from("server"))
            .await;
        assert!(result.is_err());
    }
}
