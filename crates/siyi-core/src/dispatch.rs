//! Helpers shared by the client and server inbound dispatch.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use crate::errors::{ProtocolError, Result};
use crate::ids::MessageId;
use crate::messages::{Request, Response};

/// Run an application callback, turning both `Err` and panics into
/// [`ProtocolError::Handler`].
pub async fn run_guarded<T, F>(fut: F) -> Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(ProtocolError::Handler(format!("{err:#}"))),
        Err(panic) => Err(ProtocolError::Handler(panic_message(panic.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_owned()
    }
}

/// Whether `request` is a liveness probe.
pub fn is_heartbeat(request: &Request, heartbeat_command: &str) -> bool {
    request.command() == heartbeat_command
}

/// The automatic reply to a liveness probe.
pub fn heartbeat_reply(request: &Request) -> Response {
    Response::success(request.id().clone(), crate::heartbeat_reply_data())
}

/// Error reply for request `id` whose handler failed.
///
/// Carries the handler's own message rather than the wrapped display text.
pub fn failure_reply(id: MessageId, err: &ProtocolError) -> Response {
    let message = match err {
        ProtocolError::Handler(m) => m.clone(),
        other => other.to_string(),
    };
    Response::fail(id, message)
}

/// Error reply for a request that arrived with no handler registered.
pub fn no_handler_reply(request: &Request) -> Response {
    Response::fail(request.id().clone(), crate::NO_HANDLER_MESSAGE)
}
