//! Correlation of outstanding requests with their responses.
//!
//! A sender registers a slot keyed by the request id before writing the
//! request, then awaits the returned [`PendingResponse`]. The receive loop of
//! whichever connection the response arrives on calls
//! [`CorrelationTable::resolve`]. Slots can be scoped to a connection so that
//! tearing that connection down cancels only its own waiters.
//!
//! A [`PendingResponse`] removes its slot when dropped, so success, timeout,
//! and cancellation all leave the table clean.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::errors::{ProtocolError, Result};
use crate::ids::MessageId;
use crate::messages::Response;

#[derive(Debug)]
struct Slot {
    tx: oneshot::Sender<Response>,
    scope: Option<String>,
}

/// Map of request id → single-result completion slot.
#[derive(Clone, Default, Debug)]
pub struct CorrelationTable {
    slots: Arc<Mutex<HashMap<MessageId, Slot>>>,
}

impl CorrelationTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an unscoped slot for `id`.
    pub fn register(&self, id: &MessageId) -> Result<PendingResponse> {
        self.insert(id, None)
    }

    /// Register a slot for `id` owned by `scope` (typically a connection id).
    pub fn register_scoped(&self, id: &MessageId, scope: &str) -> Result<PendingResponse> {
        self.insert(id, Some(scope.to_owned()))
    }

    fn insert(&self, id: &MessageId, scope: Option<String>) -> Result<PendingResponse> {
        let (tx, rx) = oneshot::channel();
        let mut slots = self.slots.lock();
        if slots.contains_key(id) {
            return Err(ProtocolError::DuplicateId(id.to_string()));
        }
        let _ = slots.insert(id.clone(), Slot { tx, scope });
        Ok(PendingResponse {
            id: id.clone(),
            rx,
            table: self.clone(),
        })
    }

    /// Complete the slot matching the response id.
    ///
    /// Returns `false` (and logs) if no slot is waiting, which happens when
    /// the caller already timed out or the peer answered an unknown id.
    pub fn resolve(&self, response: Response) -> bool {
        let slot = self.slots.lock().remove(response.id());
        match slot {
            Some(slot) => {
                let id = response.id().clone();
                if slot.tx.send(response).is_err() {
                    debug!(request_id = %id, "waiter dropped before response arrived");
                    return false;
                }
                true
            }
            None => {
                warn!(request_id = %response.id(), status = response.status().as_str(), "response for unknown request");
                false
            }
        }
    }

    /// Remove a slot without completing it.
    pub fn remove(&self, id: &MessageId) {
        let _ = self.slots.lock().remove(id);
    }

    /// Cancel every pending slot.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.slots.lock().drain().collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "cancelled pending requests");
        }
        drained.len()
    }

    /// Cancel the pending slots owned by `scope`.
    pub fn cancel_scope(&self, scope: &str) -> usize {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| slot.scope.as_deref() != Some(scope));
        let cancelled = before - slots.len();
        if cancelled > 0 {
            debug!(scope, count = cancelled, "cancelled pending requests for scope");
        }
        cancelled
    }

    /// Whether a slot is pending for `id`.
    pub fn contains(&self, id: &MessageId) -> bool {
        self.slots.lock().contains_key(id)
    }

    /// Number of pending slots.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Whether no slots are pending.
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

/// Handle to one pending request's future response.
#[derive(Debug)]
pub struct PendingResponse {
    id: MessageId,
    rx: oneshot::Receiver<Response>,
    table: CorrelationTable,
}

impl PendingResponse {
    /// The request id this slot waits on.
    pub fn id(&self) -> &MessageId {
        &self.id
    }

    /// Wait for the response, up to `timeout`.
    ///
    /// Fails with [`ProtocolError::Timeout`] on expiry and
    /// [`ProtocolError::Cancelled`] if the slot was cancelled.
    pub async fn wait(mut self, timeout: Duration) -> Result<Response> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ProtocolError::Cancelled {
                id: self.id.to_string(),
            }),
            Err(_) => Err(ProtocolError::Timeout {
                id: self.id.to_string(),
                after: timeout,
            }),
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        self.table.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use siyi_logging::capture_logs;
    use tracing::Level;

    #[tokio::test]
    async fn resolve_completes_waiter() {
        let table = CorrelationTable::new();
        let id = MessageId::new();
        let pending = table.register(&id).unwrap();
        assert!(table.contains(&id));

        assert!(table.resolve(Response::success(id.clone(), json!({"v": 1}))));
        let resp = pending.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(resp.data().unwrap()["v"], 1);
        assert!(table.is_empty());
    }

    #[test]
    fn duplicate_id_rejected() {
        let table = CorrelationTable::new();
        let id = MessageId::from("dup");
        let _first = table.register(&id).unwrap();
        assert_matches!(table.register(&id), Err(ProtocolError::DuplicateId(ref d)) if d == "dup");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn resolve_unknown_is_logged_noop() {
        let (logs, _guard) = capture_logs();
        let table = CorrelationTable::new();
        assert!(!table.resolve(Response::success("ghost", json!(null))));
        assert!(logs.has_event(Level::WARN, "response for unknown request"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_removes_slot() {
        let table = CorrelationTable::new();
        let id = MessageId::new();
        let pending = table.register(&id).unwrap();

        let started = tokio::time::Instant::now();
        let err = pending.wait(Duration::from_millis(500)).await.unwrap_err();
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert_matches!(err, ProtocolError::Timeout { after, .. } if after == Duration::from_millis(500));
        assert!(!table.contains(&id));
    }

    #[tokio::test]
    async fn late_response_after_timeout_is_noop() {
        let table = CorrelationTable::new();
        let id = MessageId::new();
        let pending = table.register(&id).unwrap();
        let _ = pending.wait(Duration::from_millis(5)).await;
        assert!(!table.resolve(Response::success(id, json!(1))));
    }

    #[tokio::test]
    async fn cancel_all_fails_every_waiter() {
        let table = CorrelationTable::new();
        let a = table.register(&MessageId::new()).unwrap();
        let b = table.register(&MessageId::new()).unwrap();
        assert_eq!(table.cancel_all(), 2);

        assert_matches!(a.wait(Duration::from_secs(5)).await, Err(ProtocolError::Cancelled { .. }));
        assert_matches!(b.wait(Duration::from_secs(5)).await, Err(ProtocolError::Cancelled { .. }));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn cancel_scope_leaves_other_scopes_untouched() {
        let table = CorrelationTable::new();
        let doomed = table.register_scoped(&MessageId::new(), "conn_a").unwrap();
        let kept_id = MessageId::new();
        let kept = table.register_scoped(&kept_id, "conn_b").unwrap();
        let _unscoped = table.register(&MessageId::new()).unwrap();

        assert_eq!(table.cancel_scope("conn_a"), 1);
        assert_eq!(table.len(), 2);
        assert_matches!(
            doomed.wait(Duration::from_secs(5)).await,
            Err(ProtocolError::Cancelled { .. })
        );

        assert!(table.resolve(Response::success(kept_id, json!("still here"))));
        assert!(kept.wait(Duration::from_secs(1)).await.unwrap().is_ok());
    }

    #[test]
    fn dropping_pending_removes_slot() {
        let table = CorrelationTable::new();
        let id = MessageId::new();
        {
            let _pending = table.register(&id).unwrap();
            assert_eq!(table.len(), 1);
        }
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn concurrent_registrations_do_not_collide() {
        let table = CorrelationTable::new();
        let mut handles = Vec::new();
        for _ in 0..32 {
            let table = table.clone();
            handles.push(tokio::spawn(async move {
                let id = MessageId::new();
                let pending = table.register(&id).unwrap();
                let responder = table.clone();
                let rid = id.clone();
                let _ = tokio::spawn(async move {
                    let _ = responder.resolve(Response::success(rid, json!(true)));
                });
                pending.wait(Duration::from_secs(5)).await
            }));
        }
        for h in handles {
            assert!(h.await.unwrap().unwrap().is_ok());
        }
        assert!(table.is_empty());
    }
}
