//! # siyi-core
//!
//! Shared vocabulary of the Siyi bidirectional messaging protocol.
//!
//! - **Messages**: [`Request`], [`Response`], [`Event`] and the tagged
//!   [`Message`] union with validated encode/decode
//! - **Ids**: [`MessageId`] with normalized string equality
//! - **Correlation**: [`CorrelationTable`] mapping request ids to one-shot
//!   completion slots with timeout and scoped cancellation
//! - **Transport**: the [`Transport`]/[`Connector`] contract and an
//!   in-process [`memory_pair`]
//! - **Link**: the single-owner writer task every connection writes through
//! - **Errors**: [`ProtocolError`] and [`TransportError`]

#![deny(unsafe_code)]

pub mod correlation;
pub mod dispatch;
pub mod errors;
pub mod ids;
pub mod link;
pub mod messages;
pub mod transport;

pub use correlation::{CorrelationTable, PendingResponse};
pub use errors::{ProtocolError, Result, TransportError};
pub use ids::MessageId;
pub use link::Link;
pub use messages::{
    Event, Message, MessageKind, Params, Request, Response, ResponseStatus, decode, encode,
    to_params,
};
pub use transport::{Connector, FrameSink, FrameStream, Transport, memory_pair};

/// Payload of the automatic heartbeat reply.
pub fn heartbeat_reply_data() -> serde_json::Value {
    serde_json::json!({ "status": "alive" })
}

/// Error text sent back when a request arrives and no handler is registered.
pub const NO_HANDLER_MESSAGE: &str = "No request handler registered";
