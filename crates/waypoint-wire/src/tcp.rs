//! TCP transport.
//!
//! [`TcpTransport::bind`] starts an accept loop on a local address. Every
//! connection opens with a single header line naming the protocol; the rest
//! of the connection is handed to the handler registered for that protocol.
//! Outbound streams resolve the destination peer through the [`PeerStore`]
//! and try each advertised address in order.

use crate::error::WireError;
use crate::registry::PeerStore;
use crate::transport::{BoxedStream, StreamHandler, Transport};

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use waypoint_types::PeerId;

/// Maximum length of the protocol header line.
const MAX_HEADER_LEN: u64 = 256;

/// How long an accepted connection may take to send its header.
const HEADER_TIMEOUT: Duration = Duration::from_secs(10);

type HandlerMap = Arc<RwLock<HashMap<String, StreamHandler>>>;

/// Transport over plain TCP connections.
pub struct TcpTransport {
    local_addr: SocketAddr,
    store: Arc<dyn PeerStore>,
    handlers: HandlerMap,
    accept_task: JoinHandle<()>,
}

impl TcpTransport {
    /// Bind `addr` and start accepting connections.
    ///
    /// `store` is used to resolve peer ids to addresses for outbound streams.
    pub async fn bind(addr: SocketAddr, store: Arc<dyn PeerStore>) -> Result<Arc<Self>, WireError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Waypoint: listening on {}", local_addr);

        let handlers: HandlerMap = Arc::new(RwLock::new(HashMap::new()));
        let accept_task = tokio::spawn(Self::accept_loop(listener, Arc::clone(&handlers)));

        Ok(Arc::new(Self {
            local_addr,
            store,
            handlers,
            accept_task,
        }))
    }

    /// The actual bound address (useful when binding to port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn accept_loop(listener: TcpListener, handlers: HandlerMap) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("Waypoint: accepted connection from {}", addr);
                    let handlers = Arc::clone(&handlers);
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_inbound(stream, &handlers).await {
                            debug!("Waypoint: inbound connection from {} ended: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Waypoint: accept error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Read the protocol header and hand the connection to its handler.
    async fn handle_inbound(stream: TcpStream, handlers: &HandlerMap) -> Result<(), WireError> {
        let mut reader = BufReader::new(stream);
        let protocol_id = tokio::time::timeout(HEADER_TIMEOUT, read_header(&mut reader))
            .await
            .map_err(|_| WireError::Connection("timed out waiting for protocol header".into()))??;

        let handler = {
            let handlers = handlers.read().unwrap_or_else(|e| e.into_inner());
            handlers.get(&protocol_id).cloned()
        };
        match handler {
            Some(handler) => {
                handler(Box::new(reader)).await;
                Ok(())
            }
            None => {
                warn!(protocol = %protocol_id, "Waypoint: no handler for protocol, closing");
                Err(WireError::Connection(format!(
                    "unsupported protocol {protocol_id}"
                )))
            }
        }
    }
}

async fn read_header(reader: &mut BufReader<TcpStream>) -> Result<String, WireError> {
    let mut header = Vec::new();
    (&mut *reader)
        .take(MAX_HEADER_LEN)
        .read_until(b'\n', &mut header)
        .await?;
    if header.last() != Some(&b'\n') {
        return Err(WireError::Connection("missing protocol header".into()));
    }
    let header = String::from_utf8(header)
        .map_err(|_| WireError::Connection("protocol header is not UTF-8".into()))?;
    Ok(header.trim_end().to_string())
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open_stream(
        &self,
        protocol_id: &str,
        peer: &PeerId,
    ) -> Result<BoxedStream, WireError> {
        let record = self
            .store
            .get(peer)
            .map_err(|_| WireError::Connection(format!("no known address for {peer}")))?;

        let mut last_error = format!("{peer} advertises no addresses");
        for address in &record.addresses {
            match TcpStream::connect(address.as_str()).await {
                Ok(mut stream) => {
                    stream
                        .write_all(format!("{protocol_id}\n").as_bytes())
                        .await?;
                    return Ok(Box::new(stream));
                }
                Err(e) => {
                    debug!(peer = %peer, address = %address, error = %e, "Waypoint: connect failed");
                    last_error = format!("{address}: {e}");
                }
            }
        }
        Err(WireError::Connection(last_error))
    }

    fn register_stream_handler(&self, protocol_id: &str, handler: StreamHandler) {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        handlers.insert(protocol_id.to_string(), handler);
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryPeerStore;
    use futures::FutureExt;
    use tokio::sync::mpsc;
    use waypoint_types::PeerRecord;

    fn echo_lines(tx: mpsc::UnboundedSender<String>) -> StreamHandler {
        Arc::new(move |stream: BoxedStream| {
            let tx = tx.clone();
            async move {
                let mut lines = BufReader::new(stream).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let _ = tx.send(line);
                }
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_stream_reaches_handler_by_protocol() {
        let server_store = MemoryPeerStore::new();
        let server = TcpTransport::bind("127.0.0.1:0".parse().unwrap(), Arc::new(server_store))
            .await
            .unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        server.register_stream_handler("/test/1", echo_lines(tx));

        let client_store = MemoryPeerStore::new();
        client_store.put(PeerRecord::new(
            "server",
            vec![
                "127.0.0.1:1".to_string(),
                server.local_addr().to_string(),
            ],
        ));
        let client = TcpTransport::bind("127.0.0.1:0".parse().unwrap(), Arc::new(client_store))
            .await
            .unwrap();

        let mut stream = client
            .open_stream("/test/1", &PeerId::from("server"))
            .await
            .unwrap();
        stream.write_all(b"one\ntwo\n").await.unwrap();
        stream.shutdown().await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), "one");
        assert_eq!(rx.recv().await.unwrap(), "two");
    }

    #[tokio::test]
    async fn test_unknown_peer_is_connection_error() {
        let transport = TcpTransport::bind(
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(MemoryPeerStore::new()),
        )
        .await
        .unwrap();
        let result = transport
            .open_stream("/test/1", &PeerId::from("nobody"))
            .await;
        assert!(matches!(result, Err(WireError::Connection(_))));
    }

    #[tokio::test]
    async fn test_unregistered_protocol_closes_connection() {
        let server = TcpTransport::bind(
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(MemoryPeerStore::new()),
        )
        .await
        .unwrap();

        let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();
        stream.write_all(b"/nope/1\nhello\n").await.unwrap();

        let mut buf = Vec::new();
        let n = tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);
    }
}
