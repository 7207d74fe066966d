//! Outbound side of a connection.
//!
//! The frame sink is owned by a single writer task; everything else talks to
//! it through a [`Link`] handle. Each write is acknowledged back to its
//! caller, so a failed write is reported to exactly the caller that issued
//! it and no lock is ever held across network I/O.

use futures::SinkExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::{ProtocolError, Result, TransportError};
use crate::messages::Message;
use crate::transport::FrameSink;

/// Queue depth between callers and the writer task.
const OUTBOUND_QUEUE: usize = 256;

enum Outbound {
    Frame {
        text: String,
        ack: oneshot::Sender<std::result::Result<(), TransportError>>,
    },
    Close,
}

/// Cloneable handle to a connection's writer task.
#[derive(Clone)]
pub struct Link {
    tx: mpsc::Sender<Outbound>,
}

impl Link {
    /// Spawn the writer task owning `sink`.
    pub fn spawn(sink: FrameSink) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        let handle = tokio::spawn(run_writer(sink, rx));
        (Self { tx }, handle)
    }

    /// Write one text frame and wait until the transport accepted it.
    pub async fn send_text(&self, text: String) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Outbound::Frame { text, ack })
            .await
            .map_err(|_| ProtocolError::from(TransportError::Closed))?;
        match done.await {
            Ok(result) => result.map_err(ProtocolError::from),
            Err(_) => Err(TransportError::Closed.into()),
        }
    }

    /// Encode and write one message.
    pub async fn send_message(&self, message: &Message) -> Result<()> {
        let text = message.encode()?;
        self.send_text(text).await
    }

    /// Ask the writer to close the sink. Idempotent.
    pub async fn close(&self) {
        let _ = self.tx.send(Outbound::Close).await;
    }

    /// Whether the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

async fn run_writer(mut sink: FrameSink, mut rx: mpsc::Receiver<Outbound>) {
    while let Some(outbound) = rx.recv().await {
        match outbound {
            Outbound::Frame { text, ack } => {
                let result = sink.send(text).await;
                let failed = result.is_err();
                if let Err(ref e) = result {
                    warn!(error = %e, "write failed, closing writer");
                }
                let _ = ack.send(result);
                if failed {
                    break;
                }
            }
            Outbound::Close => {
                if let Err(e) = sink.close().await {
                    debug!(error = %e, "error while closing sink");
                }
                break;
            }
        }
    }
}
