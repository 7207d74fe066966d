//! Connection transport contract.
//!
//! A [`Transport`] is one established bidirectional text-frame connection:
//! a sink for outbound frames and a stream of inbound frames. The stream
//! ending means the peer closed. Concrete transports (WebSocket client and
//! server) live in the engine crates; [`memory_pair`] wires two in-process
//! endpoints back to back.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::PollSender;

use crate::errors::TransportError;

/// Outbound half of a transport.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Inbound half of a transport.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// One established connection.
pub struct Transport {
    /// Outbound frames.
    pub sink: FrameSink,
    /// Inbound frames; ends when the peer closes.
    pub stream: FrameStream,
    /// Human-readable peer address, when known.
    pub peer: Option<String>,
}

impl Transport {
    /// Assemble a transport from its halves.
    pub fn new(sink: FrameSink, stream: FrameStream, peer: Option<String>) -> Self {
        Self { sink, stream, peer }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").field("peer", &self.peer).finish_non_exhaustive()
    }
}

/// Produces a fresh [`Transport`] for every (re)connect attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a new connection.
    async fn connect(&self) -> Result<Transport, TransportError>;

    /// Endpoint description for logs.
    fn endpoint(&self) -> String;
}

/// Two in-process transports wired back to back.
///
/// Frames written to one side's sink arrive on the other side's stream.
/// Closing or dropping one side's sink ends the other side's stream.
pub fn memory_pair(capacity: usize) -> (Transport, Transport) {
    let (a_tx, a_rx) = mpsc::channel::<String>(capacity);
    let (b_tx, b_rx) = mpsc::channel::<String>(capacity);
    let a = Transport::new(
        memory_sink(a_tx),
        memory_stream(b_rx),
        Some("memory:a".into()),
    );
    let b = Transport::new(
        memory_sink(b_tx),
        memory_stream(a_rx),
        Some("memory:b".into()),
    );
    (a, b)
}

fn memory_sink(tx: mpsc::Sender<String>) -> FrameSink {
    Box::pin(PollSender::new(tx).sink_map_err(|_| TransportError::Closed))
}

fn memory_stream(rx: mpsc::Receiver<String>) -> FrameStream {
    Box::pin(ReceiverStream::new(rx).map(Ok))
}
