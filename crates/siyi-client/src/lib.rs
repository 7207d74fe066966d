//! # siyi-client
//!
//! The connecting side of the Siyi protocol.
//!
//! A [`ClientEngine`] owns one outbound connection. It reconnects on a fixed
//! interval, correlates outbound requests with their responses, answers
//! heartbeats on its own, and hands other inbound requests and events to
//! the registered [`RequestHandler`] / [`EventHandler`].
//!
//! ```no_run
//! # async fn demo() -> siyi_core::Result<()> {
//! use siyi_client::{ClientConfig, ClientEngine};
//!
//! let engine = ClientEngine::new(ClientConfig::default());
//! let _driver = engine.spawn(true);
//! engine.wait_connected(std::time::Duration::from_secs(5)).await;
//! let resp = engine.send_request("status", None, None).await?;
//! # let _ = resp; Ok(()) }
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod engine;
pub mod handlers;
pub mod ws;

pub use config::ClientConfig;
pub use engine::{ClientEngine, ConnectionState};
pub use handlers::{EventHandler, RequestHandler};
pub use ws::{WsConnector, ws_transport};
