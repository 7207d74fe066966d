//! One accepted connection.

use std::time::{Duration, Instant};

use siyi_core::{Link, Message, Result};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A live connection tracked by the registry.
///
/// Handlers receive it as `Arc<Connection>` to tell callers apart; address
/// it in registry calls by [`id`](Self::id).
pub struct Connection {
    id: String,
    peer: Option<String>,
    link: Link,
    cancel: CancellationToken,
    connected_at: Instant,
}

impl Connection {
    pub(crate) fn new(peer: Option<String>, link: Link, cancel: CancellationToken) -> Self {
        Self {
            id: format!("conn_{}", Uuid::new_v4().simple()),
            peer,
            link,
            cancel,
            connected_at: Instant::now(),
        }
    }

    /// Registry-unique connection id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Remote address, when the transport knows it.
    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    /// When the connection was accepted.
    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Time since the connection was accepted.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Whether [`close`](Self::close) was called or the server is stopping.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Close the connection. Its receive loop then unregisters it.
    /// Idempotent.
    pub async fn close(&self) {
        self.cancel.cancel();
        self.link.close().await;
    }

    pub(crate) async fn closed(&self) {
        self.cancel.cancelled().await;
    }

    pub(crate) async fn send_message(&self, message: &Message) -> Result<()> {
        self.link.send_message(message).await
    }

    pub(crate) async fn send_text(&self, text: String) -> Result<()> {
        self.link.send_text(text).await
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
