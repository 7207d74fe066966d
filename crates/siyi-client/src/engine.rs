//! Client engine: one outbound connection with reconnect, correlated
//! requests and inbound dispatch.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──ok──▶ Connected
//!      ▲                        ▲                  │ transport failure
//!      │ stop / no reconnect    │ after interval   ▼
//!      └────────────────── Reconnecting ◀──────────┘
//! ```

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use siyi_core::dispatch::{failure_reply, heartbeat_reply, is_heartbeat, no_handler_reply, run_guarded};
use siyi_core::{
    Connector, CorrelationTable, Event, Link, Message, Params, ProtocolError, Request, Response,
    Result, Transport,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::handlers::{EventHandler, RequestHandler};
use crate::ws::WsConnector;

/// Connection state of a [`ClientEngine`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not trying.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// The transport is up and the receive loop is running.
    Connected,
    /// Waiting out the reconnect interval after a failure.
    Reconnecting,
}

struct Inner {
    connector: Box<dyn Connector>,
    config: ClientConfig,
    table: CorrelationTable,
    request_handler: RwLock<Option<Arc<dyn RequestHandler>>>,
    event_handler: RwLock<Option<Arc<dyn EventHandler>>>,
    state: watch::Sender<ConnectionState>,
    link: Mutex<Option<Link>>,
    stop: Mutex<CancellationToken>,
    driving: AtomicBool,
}

/// Handle to a client engine. Cheap to clone; all clones share one
/// connection.
#[derive(Clone)]
pub struct ClientEngine {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ClientEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientEngine")
            .field("endpoint", &self.inner.connector.endpoint())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Clears the "connect loop running" flag however the loop exits.
struct DriveGuard<'a>(&'a AtomicBool);

impl Drop for DriveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ClientEngine {
    /// Engine dialing `config.url` over WebSocket.
    pub fn new(config: ClientConfig) -> Self {
        let connector = WsConnector::new(config.url.clone());
        Self::with_connector(connector, config)
    }

    /// Engine using a caller-supplied transport factory.
    pub fn with_connector(connector: impl Connector + 'static, config: ClientConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                connector: Box::new(connector),
                config,
                table: CorrelationTable::new(),
                request_handler: RwLock::new(None),
                event_handler: RwLock::new(None),
                state,
                link: Mutex::new(None),
                stop: Mutex::new(CancellationToken::new()),
                driving: AtomicBool::new(false),
            }),
        }
    }

    /// Endpoint this engine connects to.
    pub fn url(&self) -> String {
        self.inner.connector.endpoint()
    }

    /// Engine configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Whether a transport is currently up.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Wait until connected, up to `timeout`. Returns whether it connected.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut rx = self.subscribe_state();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|s| *s == ConnectionState::Connected)).await,
            Ok(Ok(_))
        )
    }

    /// Number of requests awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.table.len()
    }

    /// Register the request handler, replacing any previous one.
    pub fn on_request(&self, handler: impl RequestHandler) {
        *self.inner.request_handler.write() = Some(Arc::new(handler));
    }

    /// Register the event handler, replacing any previous one.
    pub fn on_event(&self, handler: impl EventHandler) {
        *self.inner.event_handler.write() = Some(Arc::new(handler));
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.inner.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "connection state changed");
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Drive the connection until [`disconnect`](Self::disconnect).
    ///
    /// With `auto_reconnect`, every transport failure (including a peer
    /// close) is followed by a fixed `reconnect_interval` wait and another
    /// attempt. Without it, the first failure is returned as
    /// [`ProtocolError::Connection`]. Returns `Ok(())` only once stopped.
    ///
    /// The stop signal is bound when `connect` is called, not when the
    /// returned future is first polled, so a [`disconnect`](Self::disconnect)
    /// issued in between still stops this run.
    pub fn connect(&self, auto_reconnect: bool) -> impl Future<Output = Result<()>> + Send + '_ {
        let stop = self.inner.stop.lock().clone();
        self.drive(auto_reconnect, stop)
    }

    async fn drive(&self, auto_reconnect: bool, stop: CancellationToken) -> Result<()> {
        if self.inner.driving.swap(true, Ordering::AcqRel) {
            return Err(ProtocolError::Connection("connect already running".into()));
        }
        let _guard = DriveGuard(&self.inner.driving);
        let endpoint = self.inner.connector.endpoint();

        loop {
            if stop.is_cancelled() {
                break;
            }
            self.set_state(ConnectionState::Connecting);
            debug!(endpoint = %endpoint, "connecting");

            let attempt = tokio::select! {
                attempt = self.inner.connector.connect() => attempt,
                () = stop.cancelled() => break,
            };

            let failure = match attempt {
                Ok(transport) => {
                    info!(endpoint = %endpoint, peer = ?transport.peer, "connected");
                    match self.run_session(transport, &stop).await {
                        Some(err) => err,
                        None => break,
                    }
                }
                Err(e) => ProtocolError::from(e),
            };

            if stop.is_cancelled() {
                break;
            }
            if !auto_reconnect {
                warn!(endpoint = %endpoint, error = %failure, "connection lost");
                self.set_state(ConnectionState::Disconnected);
                return Err(failure);
            }

            let wait = self.inner.config.reconnect_interval;
            warn!(endpoint = %endpoint, error = %failure, retry_in = ?wait, "connection lost, reconnecting");
            self.set_state(ConnectionState::Reconnecting);
            tokio::select! {
                () = tokio::time::sleep(wait) => {}
                () = stop.cancelled() => break,
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!(endpoint = %endpoint, "client stopped");
        Ok(())
    }

    /// Run [`connect`](Self::connect) on a background task.
    pub fn spawn(&self, auto_reconnect: bool) -> JoinHandle<Result<()>> {
        let engine = self.clone();
        let stop = self.inner.stop.lock().clone();
        tokio::spawn(async move { engine.drive(auto_reconnect, stop).await })
    }

    /// Stop the engine: end the receive loop, close the transport and cancel
    /// every pending request. Idempotent.
    ///
    /// A later [`connect`](Self::connect) starts afresh.
    pub async fn disconnect(&self) {
        {
            let mut stop = self.inner.stop.lock();
            stop.cancel();
            *stop = CancellationToken::new();
        }
        let link = self.inner.link.lock().take();
        if let Some(link) = link {
            link.close().await;
        }
        let cancelled = self.inner.table.cancel_all();
        if cancelled > 0 {
            debug!(cancelled, "cancelled pending requests on disconnect");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Serve one established transport until it fails (`Some`) or the
    /// engine is stopped (`None`).
    async fn run_session(&self, transport: Transport, stop: &CancellationToken) -> Option<ProtocolError> {
        let Transport { sink, mut stream, .. } = transport;
        let (link, _writer) = Link::spawn(sink);
        *self.inner.link.lock() = Some(link.clone());
        self.set_state(ConnectionState::Connected);

        let outcome = loop {
            tokio::select! {
                biased;
                () = stop.cancelled() => break None,
                frame = stream.next() => match frame {
                    Some(Ok(text)) => self.handle_frame(&link, &text).await,
                    Some(Err(e)) => break Some(ProtocolError::from(e)),
                    None => break Some(ProtocolError::Connection("connection closed by peer".into())),
                },
            }
        };

        let _ = self.inner.link.lock().take();
        link.close().await;
        let cancelled = self.inner.table.cancel_all();
        if cancelled > 0 {
            debug!(cancelled, "cancelled pending requests of closed session");
        }
        outcome
    }

    // ── Outbound ────────────────────────────────────────────────────────

    fn current_link(&self) -> Result<Link> {
        self.inner.link.lock().clone().ok_or(ProtocolError::NotConnected)
    }

    /// Send a request and wait for its response.
    ///
    /// `timeout = None` uses the configured `request_timeout`. The
    /// correlation slot is released on every outcome.
    pub async fn send_request(
        &self,
        command: &str,
        params: Option<Params>,
        timeout: Option<Duration>,
    ) -> Result<Response> {
        let link = self.current_link()?;
        let request = Request::new(command)?.with_params_opt(params);
        let id = request.id().clone();
        let pending = self.inner.table.register(&id)?;

        debug!(request_id = %id, command, "sending request");
        link.send_message(&request.into()).await?;

        let timeout = timeout.unwrap_or(self.inner.config.request_timeout);
        let result = pending.wait(timeout).await;
        match &result {
            Ok(resp) => debug!(request_id = %id, status = resp.status().as_str(), "response received"),
            Err(e @ ProtocolError::Timeout { .. }) => warn!(request_id = %id, command, error = %e, "request timed out"),
            Err(e) => debug!(request_id = %id, error = %e, "request failed"),
        }
        result
    }

    /// Send an event without waiting for anything.
    pub async fn send_event(&self, name: &str, data: Option<Params>) -> Result<()> {
        let link = self.current_link()?;
        let event = Event::new(name)?.with_data_opt(data);
        debug!(event = name, event_id = %event.id(), "sending event");
        link.send_message(&event.into()).await
    }

    // ── Inbound ─────────────────────────────────────────────────────────

    async fn handle_frame(&self, link: &Link, text: &str) {
        let message = match Message::decode(text) {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "dropping undecodable frame");
                return;
            }
        };

        match message {
            Message::Request(request) => {
                let reply = self.answer(request).await;
                if let Err(e) = link.send_message(&reply.into()).await {
                    warn!(error = %e, "failed to send response");
                }
            }
            Message::Response(response) => {
                debug!(request_id = %response.id(), status = response.status().as_str(), "inbound response");
                let _ = self.inner.table.resolve(response);
            }
            Message::Event(event) => self.deliver(event).await,
        }
    }

    async fn answer(&self, request: Request) -> Response {
        if is_heartbeat(&request, &self.inner.config.heartbeat_command) {
            debug!(request_id = %request.id(), "answering heartbeat");
            return heartbeat_reply(&request);
        }

        let handler = self.inner.request_handler.read().clone();
        let Some(handler) = handler else {
            warn!(command = request.command(), "no request handler registered");
            return no_handler_reply(&request);
        };

        let id = request.id().clone();
        let command = request.command().to_owned();
        debug!(request_id = %id, command = %command, "dispatching request");
        match run_guarded(handler.handle(request)).await {
            Ok(response) => response,
            Err(e) => {
                error!(request_id = %id, command = %command, error = %e, "request handler failed");
                failure_reply(id, &e)
            }
        }
    }

    async fn deliver(&self, event: Event) {
        let handler = self.inner.event_handler.read().clone();
        let Some(handler) = handler else {
            debug!(event = event.name(), "no event handler, dropping event");
            return;
        };
        let name = event.name().to_owned();
        if let Err(e) = run_guarded(handler.handle(event)).await {
            error!(event = %name, error = %e, "event handler failed");
        }
    }
}
