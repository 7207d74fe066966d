//! # siyi-server
//!
//! Server side of the Siyi protocol: accepts WebSocket connections and
//! exchanges requests and events with each of them.
//!
//! - [`ServerRegistry`]: the live connection set, per-connection receive
//!   loops, unicast and broadcast messaging
//! - Heartbeat: a periodic probe per connection that closes peers which
//!   stop answering
//! - [`ShutdownCoordinator`]: cancellation tree rooted at the registry
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use siyi_core::{Request, Response};
//! use siyi_server::{Connection, ServerConfig, ServerRegistry};
//!
//! # async fn run() -> std::io::Result<()> {
//! let registry = ServerRegistry::new(ServerConfig::default());
//! registry.on_request(|_conn: Arc<Connection>, req: Request| async move {
//!     Ok(Response::success(req.id().clone(), serde_json::json!({ "echo": req.params() })))
//! });
//! let addr = registry.listen().await?;
//! println!("listening on {addr}");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod handlers;
pub mod heartbeat;
pub mod registry;
pub mod shutdown;
pub mod ws;

pub use config::ServerConfig;
pub use connection::Connection;
pub use handlers::{ConnectionHandler, EventHandler, RequestHandler};
pub use heartbeat::HeartbeatResult;
pub use registry::{BroadcastResponses, ServerRegistry};
pub use shutdown::{DEFAULT_SHUTDOWN_TIMEOUT, ShutdownCoordinator};
