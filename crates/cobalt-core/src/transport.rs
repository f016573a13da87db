//! Transport collaborator types.
//!
//! A [`Transport`] produces a [`Connection`]: an outbound frame queue, drained
//! by exactly one writer, and an inbound stream of [`Incoming`] items that ends
//! with a single closure signal.
//!
//! ```text
//!   Bot / ApiCaller ──▶ outbound mpsc ──▶ writer task ──▶ socket
//!   socket ──▶ reader task ──▶ inbound mpsc ──▶ driver (reply / event demux)
//! ```

use std::fmt;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{TransportError, TransportResult};

/// Default capacity of connection queues.
pub const DEFAULT_BUFFER: usize = 256;

/// An item read from a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// One text frame.
    Frame(Vec<u8>),
    /// The connection closed. Sent at most once, as the last item.
    Closed(Option<String>),
}

/// An established connection.
pub struct Connection {
    /// Outbound frame queue.
    pub outbound: mpsc::Sender<Vec<u8>>,
    /// Inbound items.
    pub inbound: mpsc::Receiver<Incoming>,
}

impl Connection {
    /// Wraps existing channel halves.
    pub fn new(outbound: mpsc::Sender<Vec<u8>>, inbound: mpsc::Receiver<Incoming>) -> Self {
        Self { outbound, inbound }
    }

    /// Creates an in-memory connection and the peer end that plays the gateway.
    pub fn pair(buffer: usize) -> (Self, RemotePeer) {
        let (out_tx, out_rx) = mpsc::channel(buffer);
        let (in_tx, in_rx) = mpsc::channel(buffer);
        (
            Self::new(out_tx, in_rx),
            RemotePeer {
                frames: out_rx,
                incoming: in_tx,
            },
        )
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("outbound_closed", &self.outbound.is_closed())
            .finish_non_exhaustive()
    }
}

/// The gateway side of an in-memory [`Connection`].
#[derive(Debug)]
pub struct RemotePeer {
    /// Frames written by the bot.
    pub frames: mpsc::Receiver<Vec<u8>>,
    /// Sender feeding the bot's inbound stream.
    pub incoming: mpsc::Sender<Incoming>,
}

impl RemotePeer {
    /// Waits for the next frame the bot writes, decoded as JSON.
    pub async fn recv_json(&mut self) -> Option<Value> {
        let bytes = self.frames.recv().await?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Pushes a raw frame to the bot.
    pub async fn send_frame(&self, bytes: impl Into<Vec<u8>>) -> TransportResult<()> {
        self.incoming
            .send(Incoming::Frame(bytes.into()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    /// Pushes a JSON frame to the bot.
    pub async fn send_json(&self, value: &Value) -> TransportResult<()> {
        self.send_frame(value.to_string()).await
    }

    /// Signals closure to the bot.
    pub async fn close(self, reason: Option<String>) {
        let _ = self.incoming.send(Incoming::Closed(reason)).await;
    }
}

/// Something that can open a [`Connection`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Opens a connection.
    async fn connect(&self) -> TransportResult<Connection>;
}

/// A [`Transport`] handing out one pre-built connection.
pub struct MemoryTransport {
    connection: Mutex<Option<Connection>>,
}

impl MemoryTransport {
    /// Creates a transport and the peer end of its connection.
    pub fn new(buffer: usize) -> (Self, RemotePeer) {
        let (connection, peer) = Connection::pair(buffer);
        (
            Self {
                connection: Mutex::new(Some(connection)),
            },
            peer,
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self) -> TransportResult<Connection> {
        self.connection
            .lock()
            .take()
            .ok_or_else(|| TransportError::ConnectionFailed {
                url: "memory://".into(),
                reason: "connection already taken".into(),
            })
    }
}
