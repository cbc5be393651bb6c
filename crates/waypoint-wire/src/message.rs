//! Wire protocol message types.
//!
//! All communication between Waypoint peers uses one compact JSON object per
//! line, UTF-8, newline-terminated. Field tags are single letters so that the
//! format stays compatible with existing `/fake-dht/v0` deployments:
//!
//! | tag | field |
//! |-----|-------|
//! | `t` | message type (`FIND_PEER` or `PING`) |
//! | `n` | nonce |
//! | `o` | originator record |
//! | `f` | target peer id |
//! | `p` | target peer record (responses only) |
//! | `r` | is-response flag |

use crate::error::WireError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use waypoint_types::{PeerId, PeerRecord};

/// Protocol identifier used to multiplex this protocol on a transport.
pub const PROTOCOL_ID: &str = waypoint_types::config::DEFAULT_PROTOCOL_ID;

/// Maximum length of a single encoded message line (64 KiB).
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Message type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    /// Discovery request or response.
    FindPeer,
    /// Liveness announcement; carries nothing but the sender's record.
    Ping,
    /// Missing or empty type tag.
    #[default]
    Unknown,
    /// Unrecognized type tag, kept verbatim for logging.
    Other(String),
}

impl MessageKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::FindPeer => "FIND_PEER",
            Self::Ping => "PING",
            Self::Unknown => "",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for MessageKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "FIND_PEER" => Self::FindPeer,
            "PING" => Self::Ping,
            "" => Self::Unknown,
            _ => Self::Other(s),
        }
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single protocol message.
///
/// A request (`is_response == false`) never carries `target_peer`; a
/// `FIND_PEER` response carries it only when the responder knew the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryMessage {
    #[serde(rename = "t", default)]
    pub kind: MessageKind,
    #[serde(rename = "n", default)]
    pub nonce: String,
    #[serde(rename = "o")]
    pub originator: PeerRecord,
    #[serde(rename = "f", default)]
    pub target_id: PeerId,
    #[serde(rename = "p", default, skip_serializing_if = "Option::is_none")]
    pub target_peer: Option<PeerRecord>,
    #[serde(rename = "r", default)]
    pub is_response: bool,
}

impl DiscoveryMessage {
    /// A `FIND_PEER` request for `target` with a fresh nonce.
    pub fn find_peer(originator: PeerRecord, target: PeerId) -> Self {
        Self {
            kind: MessageKind::FindPeer,
            nonce: new_nonce(),
            originator,
            target_id: target,
            target_peer: None,
            is_response: false,
        }
    }

    /// A `PING` announcement with a fresh nonce.
    pub fn announce(originator: PeerRecord) -> Self {
        Self {
            kind: MessageKind::Ping,
            nonce: new_nonce(),
            originator,
            target_id: PeerId::default(),
            target_peer: None,
            is_response: false,
        }
    }

    /// The answer to `request`, sent by `local`, resolving it to `found`.
    pub fn respond(request: &DiscoveryMessage, local: PeerRecord, found: PeerRecord) -> Self {
        Self {
            kind: request.kind.clone(),
            nonce: request.nonce.clone(),
            originator: local,
            target_id: request.target_id.clone(),
            target_peer: Some(found),
            is_response: true,
        }
    }
}

/// Generate a fresh correlation nonce.
pub fn new_nonce() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Encode a message as one JSON line, including the trailing newline.
pub fn encode_message(msg: &DiscoveryMessage) -> Result<Vec<u8>, WireError> {
    let mut bytes = serde_json::to_vec(msg)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decode one line into a message.
///
/// Either the whole message is produced or [`WireError::MalformedMessage`]
/// is returned.
pub fn decode_message(line: &[u8]) -> Result<DiscoveryMessage, WireError> {
    let line = trim_line_end(line);
    if line.len() > MAX_LINE_LEN {
        return Err(WireError::MalformedMessage(format!(
            "line of {} bytes exceeds {MAX_LINE_LEN}",
            line.len()
        )));
    }

    let msg: DiscoveryMessage =
        serde_json::from_slice(line).map_err(|e| WireError::MalformedMessage(e.to_string()))?;

    if msg.originator.id.is_empty() {
        return Err(WireError::MalformedMessage("originator has no id".into()));
    }
    if !msg.is_response && msg.target_peer.is_some() {
        return Err(WireError::MalformedMessage(
            "request carries a target peer".into(),
        ));
    }
    Ok(msg)
}

fn trim_line_end(mut line: &[u8]) -> &[u8] {
    if let [rest @ .., b'\n'] = line {
        line = rest;
    }
    if let [rest @ .., b'\r'] = line {
        line = rest;
    }
    line
}

/// Outcome of reading one line from a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// A line (possibly without its final newline at end of stream) is in the buffer.
    Line,
    /// The line exceeded [`MAX_LINE_LEN`] and was discarded up to its newline.
    Oversized,
    /// The stream is closed.
    Eof,
}

/// Read one newline-delimited line into `buf`, never buffering more than
/// [`MAX_LINE_LEN`] bytes of it.
pub async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let limit = MAX_LINE_LEN as u64 + 2;
    let n = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(Frame::Eof);
    }
    if buf.last() == Some(&b'\n') || (n as u64) < limit {
        return Ok(Frame::Line);
    }

    // Discard the rest of the oversized line.
    let mut scratch = Vec::new();
    loop {
        scratch.clear();
        let n = (&mut *reader)
            .take(MAX_LINE_LEN as u64)
            .read_until(b'\n', &mut scratch)
            .await?;
        if n == 0 || scratch.last() == Some(&b'\n') {
            break;
        }
    }
    buf.clear();
    Ok(Frame::Oversized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> PeerRecord {
        PeerRecord::new(id, vec![format!("{id}.local:60800")])
    }

    #[test]
    fn test_encode_is_one_line_with_short_tags() {
        let msg = DiscoveryMessage::find_peer(record("a"), PeerId::from("b"));
        let bytes = encode_message(&msg).unwrap();
        assert_eq!(bytes.last(), Some(&b'\n'));
        assert_eq!(bytes.iter().filter(|b| **b == b'\n').count(), 1);

        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["t"], "FIND_PEER");
        assert_eq!(json["f"], "b");
        assert_eq!(json["r"], false);
        assert_eq!(json["o"]["id"], "a");
        assert!(json.get("p").is_none());
        assert_eq!(json["n"].as_str().unwrap().len(), 36);
    }

    #[test]
    fn test_decode_response_from_existing_deployment() {
        let line = br#"{"t":"FIND_PEER","n":"abc","o":{"id":"boot","addresses":["bootstrap.nimona.io:60800"]},"f":"p2","p":{"id":"p2","addresses":["10.0.0.2:1"]},"r":true}"#;
        let msg = decode_message(line).unwrap();
        assert_eq!(msg.kind, MessageKind::FindPeer);
        assert_eq!(msg.nonce, "abc");
        assert!(msg.is_response);
        assert_eq!(msg.target_peer.unwrap().addresses, vec!["10.0.0.2:1"]);
    }

    #[test]
    fn test_decode_ping_with_null_peer() {
        let line = b"{\"t\":\"PING\",\"n\":\"x\",\"o\":{\"id\":\"a\",\"addresses\":[]},\"f\":\"\",\"p\":null,\"r\":false}\r\n";
        let msg = decode_message(line).unwrap();
        assert_eq!(msg.kind, MessageKind::Ping);
        assert!(msg.target_id.is_empty());
        assert!(msg.target_peer.is_none());
    }

    #[test]
    fn test_unknown_type_is_preserved() {
        let line = br#"{"t":"STORE","n":"x","o":{"id":"a"}}"#;
        let msg = decode_message(line).unwrap();
        assert_eq!(msg.kind, MessageKind::Other("STORE".to_string()));
        assert_eq!(msg.kind.to_string(), "STORE");

        let missing = decode_message(br#"{"n":"x","o":{"id":"a"}}"#).unwrap();
        assert_eq!(missing.kind, MessageKind::Unknown);
    }

    #[test]
    fn test_missing_nonce_decodes_as_empty() {
        let msg = decode_message(br#"{"t":"PING","o":{"id":"a"}}"#).unwrap();
        assert!(msg.nonce.is_empty());
    }

    #[test]
    fn test_malformed_lines_are_rejected() {
        for line in [
            &b"not json"[..],
            b"{\"t\":\"PING\",\"n\":\"x\"",
            b"{\"t\":\"PING\",\"n\":\"x\"}",
            b"{\"t\":\"PING\",\"n\":\"x\",\"o\":{\"id\":\"\"}}",
            b"",
            b"\xff\xfe",
        ] {
            let err = decode_message(line).unwrap_err();
            assert!(
                matches!(err, WireError::MalformedMessage(_)),
                "expected malformed for {:?}, got {err:?}",
                String::from_utf8_lossy(line)
            );
        }
    }

    #[test]
    fn test_request_with_target_peer_is_malformed() {
        let line = br#"{"t":"FIND_PEER","n":"x","o":{"id":"a"},"f":"b","p":{"id":"b"},"r":false}"#;
        assert!(matches!(
            decode_message(line),
            Err(WireError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_respond_keeps_nonce_and_target() {
        let request = DiscoveryMessage::find_peer(record("a"), PeerId::from("b"));
        let reply = DiscoveryMessage::respond(&request, record("boot"), record("b"));
        assert_eq!(reply.nonce, request.nonce);
        assert_eq!(reply.kind, MessageKind::FindPeer);
        assert_eq!(reply.target_id, PeerId::from("b"));
        assert_eq!(reply.originator.id, PeerId::from("boot"));
        assert!(reply.is_response);

        let decoded = decode_message(&encode_message(&reply).unwrap()).unwrap();
        assert_eq!(decoded, reply);
    }

    #[test]
    fn test_fresh_nonces_differ() {
        let a = DiscoveryMessage::announce(record("a"));
        let b = DiscoveryMessage::announce(record("a"));
        assert_ne!(a.nonce, b.nonce);
    }

    #[tokio::test]
    async fn test_read_frame_splits_lines() {
        let data: &[u8] = b"first\nsecond\nlast";
        let mut reader = tokio::io::BufReader::new(data);
        let mut buf = Vec::new();

        assert_eq!(read_frame(&mut reader, &mut buf).await.unwrap(), Frame::Line);
        assert_eq!(buf, b"first\n");
        assert_eq!(read_frame(&mut reader, &mut buf).await.unwrap(), Frame::Line);
        assert_eq!(buf, b"second\n");
        assert_eq!(read_frame(&mut reader, &mut buf).await.unwrap(), Frame::Line);
        assert_eq!(buf, b"last");
        assert_eq!(read_frame(&mut reader, &mut buf).await.unwrap(), Frame::Eof);
    }

    #[tokio::test]
    async fn test_read_frame_joins_partial_reads() {
        let mock = tokio_test::io::Builder::new()
            .read(b"{\"t\":\"PI")
            .read(b"NG\",\"n\":\"x\",\"o\":{\"id\":\"a\"}}")
            .read(b"\n")
            .build();
        let mut reader = tokio::io::BufReader::new(mock);
        let mut buf = Vec::new();

        assert_eq!(read_frame(&mut reader, &mut buf).await.unwrap(), Frame::Line);
        let msg = decode_message(&buf).unwrap();
        assert_eq!(msg.kind, MessageKind::Ping);
        assert_eq!(read_frame(&mut reader, &mut buf).await.unwrap(), Frame::Eof);
    }

    #[tokio::test]
    async fn test_read_frame_limit_boundary() {
        // Up to MAX_LINE_LEN + 1 bytes (content plus "\r\n" headroom) is a line.
        for len in [MAX_LINE_LEN, MAX_LINE_LEN + 1] {
            let mut data = vec![b'x'; len];
            data.push(b'\n');
            let mut reader = tokio::io::BufReader::new(data.as_slice());
            let mut buf = Vec::new();
            assert_eq!(read_frame(&mut reader, &mut buf).await.unwrap(), Frame::Line);
            assert_eq!(buf.len(), len + 1);
        }

        let mut data = vec![b'x'; MAX_LINE_LEN + 2];
        data.extend_from_slice(b"\nok\n");
        let mut reader = tokio::io::BufReader::new(data.as_slice());
        let mut buf = Vec::new();
        assert_eq!(
            read_frame(&mut reader, &mut buf).await.unwrap(),
            Frame::Oversized
        );
        assert_eq!(read_frame(&mut reader, &mut buf).await.unwrap(), Frame::Line);
        assert_eq!(buf, b"ok\n");
    }

    #[tokio::test]
    async fn test_read_frame_skips_oversized_line() {
        let mut data = vec![b'x'; MAX_LINE_LEN * 3];
        data.extend_from_slice(b"\nok\n");
        let mut reader = tokio::io::BufReader::new(data.as_slice());
        let mut buf = Vec::new();

        assert_eq!(
            read_frame(&mut reader, &mut buf).await.unwrap(),
            Frame::Oversized
        );
        assert!(buf.is_empty());
        assert_eq!(read_frame(&mut reader, &mut buf).await.unwrap(), Frame::Line);
        assert_eq!(buf, b"ok\n");
    }
}
