//! Server registry: the set of live connections, their receive loops and
//! heartbeats, and unicast/broadcast messaging over them.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::StreamExt;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use siyi_core::dispatch::{failure_reply, heartbeat_reply, is_heartbeat, no_handler_reply, run_guarded};
use siyi_core::{
    CorrelationTable, Event, Link, Message, Params, ProtocolError, Request, Response, Result,
    Transport,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::handlers::{ConnectionHandler, EventHandler, RequestHandler};
use crate::heartbeat::run_heartbeat;
use crate::shutdown::ShutdownCoordinator;

#[derive(Default)]
struct Handlers {
    request: RwLock<Option<Arc<dyn RequestHandler>>>,
    event: RwLock<Option<Arc<dyn EventHandler>>>,
    connect: RwLock<Option<Arc<dyn ConnectionHandler>>>,
    disconnect: RwLock<Option<Arc<dyn ConnectionHandler>>>,
}

struct Inner {
    config: ServerConfig,
    connections: DashMap<String, Arc<Connection>>,
    heartbeats: DashMap<String, JoinHandle<()>>,
    table: CorrelationTable,
    handlers: Handlers,
    shutdown: ShutdownCoordinator,
    serve_tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Per-connection outcome of a broadcast request.
pub type BroadcastResponses = HashMap<String, Result<Response>>;

/// Handle to a server registry. Cheap to clone.
#[derive(Clone)]
pub struct ServerRegistry {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ServerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerRegistry")
            .field("bind", &self.inner.config.bind_addr())
            .field("connections", &self.connection_count())
            .finish_non_exhaustive()
    }
}

impl ServerRegistry {
    /// Create a registry. Nothing is bound until [`listen`](Self::listen).
    pub fn new(config: ServerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                connections: DashMap::new(),
                heartbeats: DashMap::new(),
                table: CorrelationTable::new(),
                handlers: Handlers::default(),
                shutdown: ShutdownCoordinator::new(),
                serve_tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Registry configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    // ── Handlers ────────────────────────────────────────────────────────

    /// Register the request handler, replacing any previous one.
    pub fn on_request(&self, handler: impl RequestHandler) {
        *self.inner.handlers.request.write() = Some(Arc::new(handler));
    }

    /// Register the event handler, replacing any previous one.
    pub fn on_event(&self, handler: impl EventHandler) {
        *self.inner.handlers.event.write() = Some(Arc::new(handler));
    }

    /// Register the connection-opened handler, replacing any previous one.
    pub fn on_connect(&self, handler: impl ConnectionHandler) {
        *self.inner.handlers.connect.write() = Some(Arc::new(handler));
    }

    /// Register the connection-closed handler, replacing any previous one.
    pub fn on_disconnect(&self, handler: impl ConnectionHandler) {
        *self.inner.handlers.disconnect.write() = Some(Arc::new(handler));
    }

    // ── Connection set ──────────────────────────────────────────────────

    /// Snapshot of the live connections.
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.inner
            .connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }

    /// Look up a live connection.
    pub fn connection(&self, id: &str) -> Option<Arc<Connection>> {
        self.inner.connections.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether `id` is a live connection.
    pub fn contains(&self, id: &str) -> bool {
        self.inner.connections.contains_key(id)
    }

    /// Requests awaiting a response, across all connections.
    pub fn pending_requests(&self) -> usize {
        self.inner.table.len()
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Bind the configured address and accept WebSocket upgrades on a
    /// background task. Returns the bound address.
    pub async fn listen(&self) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind(self.inner.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let app = crate::ws::router(self.clone()).into_make_service_with_connect_info::<SocketAddr>();
        let token = self.inner.shutdown.token();

        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "server accept loop failed");
            }
        });
        self.inner.serve_tasks.lock().push(task);
        info!(%addr, "server listening");
        Ok(addr)
    }

    /// [`listen`](Self::listen), then wait until [`stop`](Self::stop).
    pub async fn start(&self) -> std::io::Result<()> {
        let _addr = self.listen().await?;
        self.inner.shutdown.token().cancelled().await;
        Ok(())
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        self.inner.shutdown.is_shutting_down()
    }

    /// Stop accepting, close every connection, end every heartbeat and
    /// cancel every pending request. A stopped registry stays stopped.
    pub async fn stop(&self) {
        self.inner.shutdown.shutdown();

        let connections = self.connections();
        info!(connections = connections.len(), "stopping server");
        for conn in &connections {
            conn.close().await;
        }

        self.inner.heartbeats.retain(|_, handle| {
            handle.abort();
            false
        });

        let cancelled = self.inner.table.cancel_all();
        if cancelled > 0 {
            debug!(cancelled, "cancelled pending requests on stop");
        }

        let serve_tasks = std::mem::take(&mut *self.inner.serve_tasks.lock());
        self.inner.shutdown.graceful_shutdown(serve_tasks, None).await;
    }

    /// Run the full lifecycle of one established transport: register it,
    /// notify, start its heartbeat, dispatch inbound frames until it ends,
    /// then unregister and notify again.
    pub async fn serve_connection(&self, transport: Transport) {
        if self.is_stopped() {
            debug!(peer = ?transport.peer, "rejecting connection, server stopped");
            return;
        }

        let Transport { sink, mut stream, peer } = transport;
        let (link, _writer) = Link::spawn(sink);
        let conn = Arc::new(Connection::new(peer, link, self.inner.shutdown.child_token()));
        let _ = self.inner.connections.insert(conn.id().to_owned(), Arc::clone(&conn));
        info!(
            conn_id = conn.id(),
            peer = conn.peer().unwrap_or("unknown"),
            total = self.connection_count(),
            "connection opened"
        );

        let connect_handler = self.inner.handlers.connect.read().clone();
        notify(connect_handler, &conn, "connect").await;

        if let Some(interval) = self.inner.config.heartbeat_interval.filter(|d| !d.is_zero()) {
            let registry = self.clone();
            let target = Arc::clone(&conn);
            let handle = tokio::spawn(async move {
                let conn_id = target.id().to_owned();
                let result = run_heartbeat(registry, target, interval).await;
                debug!(conn_id, ?result, "heartbeat loop ended");
            });
            let _ = self.inner.heartbeats.insert(conn.id().to_owned(), handle);
        }

        loop {
            tokio::select! {
                biased;
                () = conn.closed() => break,
                frame = stream.next() => match frame {
                    Some(Ok(text)) => self.handle_frame(&conn, &text).await,
                    Some(Err(e)) => {
                        warn!(conn_id = conn.id(), error = %e, "transport error");
                        break;
                    }
                    None => break,
                },
            }
        }

        self.release(&conn).await;
    }

    async fn release(&self, conn: &Arc<Connection>) {
        let _ = self.inner.connections.remove(conn.id());
        if let Some((_, heartbeat)) = self.inner.heartbeats.remove(conn.id()) {
            heartbeat.abort();
        }
        conn.close().await;
        let cancelled = self.inner.table.cancel_scope(conn.id());
        info!(
            conn_id = conn.id(),
            cancelled,
            remaining = self.connection_count(),
            "connection closed"
        );

        let disconnect_handler = self.inner.handlers.disconnect.read().clone();
        notify(disconnect_handler, conn, "disconnect").await;
    }

    // ── Unicast ─────────────────────────────────────────────────────────

    fn live(&self, conn_id: &str) -> Result<Arc<Connection>> {
        self.connection(conn_id).ok_or(ProtocolError::NotConnected)
    }

    /// Send a request to one connection and wait for its response.
    ///
    /// `timeout = None` uses the configured `request_timeout`. Fails with
    /// [`ProtocolError::NotConnected`] if `conn_id` is not registered.
    pub async fn send_request(
        &self,
        conn_id: &str,
        command: &str,
        params: Option<Params>,
        timeout: Option<Duration>,
    ) -> Result<Response> {
        let conn = self.live(conn_id)?;
        let request = Request::new(command)?.with_params_opt(params);
        let id = request.id().clone();
        let pending = self.inner.table.register_scoped(&id, conn.id())?;

        debug!(conn_id, request_id = %id, command, "sending request");
        conn.send_message(&request.into()).await?;

        let timeout = timeout.unwrap_or(self.inner.config.request_timeout);
        let result = pending.wait(timeout).await;
        if let Err(e @ ProtocolError::Timeout { .. }) = &result {
            warn!(conn_id, request_id = %id, command, error = %e, "request timed out");
        }
        result
    }

    /// Send an event to one connection.
    pub async fn send_event(&self, conn_id: &str, name: &str, data: Option<Params>) -> Result<()> {
        let conn = self.live(conn_id)?;
        let event = Event::new(name)?.with_data_opt(data);
        debug!(conn_id, event = name, "sending event");
        conn.send_message(&event.into()).await
    }

    // ── Broadcast ───────────────────────────────────────────────────────

    fn targets(&self, exclude: &[&str]) -> Vec<Arc<Connection>> {
        self.connections()
            .into_iter()
            .filter(|c| !exclude.contains(&c.id()))
            .collect()
    }

    /// Write one event to every connection not in `exclude`.
    ///
    /// Writes run concurrently and fail independently. Returns the failures
    /// keyed by connection id; an empty map means every write succeeded.
    /// Only an invalid event name fails the call as a whole.
    pub async fn broadcast_event(
        &self,
        name: &str,
        data: Option<Params>,
        exclude: &[&str],
    ) -> Result<HashMap<String, ProtocolError>> {
        let event = Event::new(name)?.with_data_opt(data);
        let text = Message::from(event).encode()?;
        let targets = self.targets(exclude);
        debug!(event = name, recipients = targets.len(), "broadcasting event");

        let writes = targets.into_iter().map(|conn| {
            let text = text.clone();
            async move {
                let outcome = conn.send_text(text).await;
                (conn, outcome)
            }
        });

        let mut failures = HashMap::new();
        for (conn, outcome) in join_all(writes).await {
            if let Err(e) = outcome {
                warn!(conn_id = conn.id(), event = name, error = %e, "broadcast write failed");
                let _ = failures.insert(conn.id().to_owned(), e);
            }
        }
        Ok(failures)
    }

    /// Send one correlated request to every connection not in `exclude`,
    /// concurrently. Each connection's outcome is reported on its own.
    pub async fn broadcast_request(
        &self,
        command: &str,
        params: Option<Params>,
        timeout: Option<Duration>,
        exclude: &[&str],
    ) -> BroadcastResponses {
        let targets = self.targets(exclude);
        debug!(command, recipients = targets.len(), "broadcasting request");

        let calls = targets.into_iter().map(|conn| {
            let params = params.clone();
            async move {
                let outcome = self.send_request(conn.id(), command, params, timeout).await;
                (conn.id().to_owned(), outcome)
            }
        });
        join_all(calls).await.into_iter().collect()
    }

    // ── Inbound ─────────────────────────────────────────────────────────

    async fn handle_frame(&self, conn: &Arc<Connection>, text: &str) {
        let message = match Message::decode(text) {
            Ok(message) => message,
            Err(e) => {
                error!(conn_id = conn.id(), error = %e, "dropping undecodable frame");
                return;
            }
        };

        match message {
            Message::Request(request) => {
                let reply = self.answer(conn, request).await;
                if let Err(e) = conn.send_message(&reply.into()).await {
                    warn!(conn_id = conn.id(), error = %e, "failed to send response");
                }
            }
            Message::Response(response) => {
                debug!(conn_id = conn.id(), request_id = %response.id(), status = response.status().as_str(), "inbound response");
                let _ = self.inner.table.resolve(response);
            }
            Message::Event(event) => self.deliver(conn, event).await,
        }
    }

    async fn answer(&self, conn: &Arc<Connection>, request: Request) -> Response {
        if is_heartbeat(&request, &self.inner.config.heartbeat_command) {
            debug!(conn_id = conn.id(), "answering heartbeat");
            return heartbeat_reply(&request);
        }

        let handler = self.inner.handlers.request.read().clone();
        let Some(handler) = handler else {
            warn!(conn_id = conn.id(), command = request.command(), "no request handler registered");
            return no_handler_reply(&request);
        };

        let id = request.id().clone();
        let command = request.command().to_owned();
        debug!(conn_id = conn.id(), request_id = %id, command = %command, "dispatching request");
        match run_guarded(handler.handle(Arc::clone(conn), request)).await {
            Ok(response) => response,
            Err(e) => {
                error!(conn_id = conn.id(), request_id = %id, command = %command, error = %e, "request handler failed");
                failure_reply(id, &e)
            }
        }
    }

    async fn deliver(&self, conn: &Arc<Connection>, event: Event) {
        let handler = self.inner.handlers.event.read().clone();
        let Some(handler) = handler else {
            debug!(conn_id = conn.id(), event = event.name(), "no event handler, dropping event");
            return;
        };
        let name = event.name().to_owned();
        if let Err(e) = run_guarded(handler.handle(Arc::clone(conn), event)).await {
            error!(conn_id = conn.id(), event = %name, error = %e, "event handler failed");
        }
    }
}

async fn notify(handler: Option<Arc<dyn ConnectionHandler>>, conn: &Arc<Connection>, what: &'static str) {
    let Some(handler) = handler else {
        return;
    };
    if let Err(e) = run_guarded(handler.handle(Arc::clone(conn))).await {
        error!(conn_id = conn.id(), handler = what, error = %e, "connection handler failed");
    }
}
