//! Connection identifiers, payloads and send handles

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::anyhow;
use axum::extract::ws::Message;
use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::Result;

/// Identifier of one live client connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Arc<str>);

impl ConnectionId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Derive the id from the remote endpoint of the transport.
    ///
    /// The full `ip:port` pair is unique among the connections open on a
    /// single listening socket, so two live clients never share an id
    /// unless an intermediary rewrites addresses.
    pub fn from_peer(addr: SocketAddr) -> Self {
        Self(addr.to_string().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// An opaque message body as received from a client.
///
/// The frame kind is kept so text arrives as text and binary as binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(Arc<str>),
    Binary(Bytes),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Payload::Text(text) => text.len(),
            Payload::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Binary(bytes) => &bytes[..],
        }
    }

    /// Map a WebSocket frame to a relayable payload.
    ///
    /// Control frames return `None`.
    pub fn from_message(message: Message) -> Option<Self> {
        match message {
            Message::Text(text) => Some(Payload::Text(text.into())),
            Message::Binary(data) => Some(Payload::Binary(Bytes::from(data))),
            Message::Ping(_) | Message::Pong(_) | Message::Close(_) => None,
        }
    }

    pub fn into_message(self) -> Message {
        match self {
            Payload::Text(text) => Message::Text(text.to_string()),
            Payload::Binary(bytes) => Message::Binary(bytes.to_vec()),
        }
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Binary(Bytes::copy_from_slice(bytes))
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.into())
    }
}

/// Outbound queue length used when none is configured
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Send side of a connection's outbound queue.
///
/// Sending never waits on the peer: the payload is queued and the
/// connection's writer task drains the queue into the socket in order.
/// A queue that is full or whose writer has gone away refuses the payload.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    tx: mpsc::Sender<Payload>,
}

impl ConnectionHandle {
    /// Create a handle with the default queue length, together with the
    /// receiver its writer drains
    pub fn channel() -> (Self, mpsc::Receiver<Payload>) {
        Self::bounded(DEFAULT_OUTBOUND_CAPACITY)
    }

    /// Create a handle whose queue holds at most `capacity` payloads
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<Payload>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn send(&self, payload: Payload) -> Result<()> {
        self.tx.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => anyhow!("connection outbound queue is full"),
            TrySendError::Closed(_) => anyhow!("connection outbound queue is closed"),
        })
    }

    /// Whether the receiving side has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Whether both handles feed the same connection
    pub fn same_connection(&self, other: &ConnectionHandle) -> bool {
        self.tx.same_channel(&other.tx)
    }
}
