//! Protocol error taxonomy.
//!
//! Every failure the protocol surfaces to a caller is a [`ProtocolError`].
//! Transport-level failures originate as [`TransportError`] and convert into
//! [`ProtocolError::Connection`] at the engine boundary.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the external connection transport.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The connection is closed (by either side).
    #[error("connection closed")]
    Closed,
    /// Any other I/O or protocol-level failure of the transport.
    #[error("transport failure: {0}")]
    Io(String),
}

/// Errors surfaced by the protocol library.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Inbound payload was malformed JSON or failed schema validation.
    #[error("failed to decode message: {reason}")]
    Decode {
        /// What went wrong.
        reason: String,
        /// The offending raw payload.
        payload: String,
    },

    /// A message was constructed in violation of its invariants.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A send operation was attempted with no live connection.
    #[error("not connected")]
    NotConnected,

    /// No matching response arrived before the deadline.
    #[error("request {id} timed out after {after:?}")]
    Timeout {
        /// Correlation id of the abandoned request.
        id: String,
        /// The deadline that expired.
        after: Duration,
    },

    /// The connection a request was waiting on was torn down.
    #[error("request {id} cancelled: connection closed")]
    Cancelled {
        /// Correlation id of the cancelled request.
        id: String,
    },

    /// A correlation slot for this id is already pending.
    #[error("duplicate pending request id: {0}")]
    DuplicateId(String),

    /// Transport-level failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// An application callback failed.
    #[error("handler error: {0}")]
    Handler(String),
}

impl From<TransportError> for ProtocolError {
    fn from(err: TransportError) -> Self {
        Self::Connection(err.to_string())
    }
}

impl ProtocolError {
    /// Whether this error means the underlying connection is unusable.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::Connection(_) | Self::Cancelled { .. }
        )
    }
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
