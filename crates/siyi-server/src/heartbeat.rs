//! Per-connection liveness probing.

use std::sync::Arc;
use std::time::Duration;

use siyi_core::ProtocolError;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::registry::ServerRegistry;

/// Why a heartbeat loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// A probe went unanswered for `request_timeout`; the connection was closed.
    TimedOut,
    /// A probe could not be written; the connection was closed.
    ConnectionLost,
    /// The connection is no longer registered.
    Removed,
    /// The connection was closed by someone else.
    Cancelled,
    /// The interval was zero; no probe was sent.
    Disabled,
}

/// Probe `connection` every `interval` with the configured heartbeat command.
///
/// An error response is logged and probing continues. A timeout or a
/// transport failure closes the connection and ends the loop.
pub async fn run_heartbeat(
    registry: ServerRegistry,
    connection: Arc<Connection>,
    interval: Duration,
) -> HeartbeatResult {
    if interval.is_zero() {
        warn!(conn_id = connection.id(), "zero heartbeat interval, not probing");
        return HeartbeatResult::Disabled;
    }
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    let _ = ticker.tick().await;
    let command = registry.config().heartbeat_command.clone();
    let conn_id = connection.id();

    loop {
        tokio::select! {
            () = connection.closed() => return HeartbeatResult::Cancelled,
            _ = ticker.tick() => {}
        }
        if !registry.contains(conn_id) {
            return HeartbeatResult::Removed;
        }

        let outcome = tokio::select! {
            outcome = registry.send_request(conn_id, &command, None, None) => outcome,
            () = connection.closed() => return HeartbeatResult::Cancelled,
        };

        match outcome {
            Ok(resp) if resp.is_ok() => debug!(conn_id, "heartbeat ok"),
            Ok(resp) => {
                warn!(conn_id, error = resp.error().unwrap_or_default(), "heartbeat answered with error");
            }
            Err(ProtocolError::NotConnected) => return HeartbeatResult::Removed,
            Err(e @ ProtocolError::Timeout { .. }) => {
                warn!(conn_id, error = %e, "heartbeat timed out, closing connection");
                connection.close().await;
                return HeartbeatResult::TimedOut;
            }
            Err(e) => {
                warn!(conn_id, error = %e, "heartbeat failed, closing connection");
                connection.close().await;
                return HeartbeatResult::ConnectionLost;
            }
        }
    }
}
