//! Application callbacks invoked by the server registry.
//!
//! Every callback gets the originating [`Connection`]. Async closures
//! implement the traits directly.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use siyi_core::{Event, Request, Response};

use crate::connection::Connection;

/// Answers inbound requests.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Produce the response to `request` from `connection`. An `Err`
    /// becomes an error response carrying its message.
    async fn handle(&self, connection: Arc<Connection>, request: Request) -> anyhow::Result<Response>;
}

/// Receives inbound events.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Consume `event` from `connection`. Errors are logged.
    async fn handle(&self, connection: Arc<Connection>, event: Event) -> anyhow::Result<()>;
}

/// Observes connections opening or closing.
#[async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Called once per transition. Errors are logged.
    async fn handle(&self, connection: Arc<Connection>) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> RequestHandler for F
where
    F: Fn(Arc<Connection>, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Response>> + Send,
{
    async fn handle(&self, connection: Arc<Connection>, request: Request) -> anyhow::Result<Response> {
        (self)(connection, request).await
    }
}

#[async_trait]
impl<F, Fut> EventHandler for F
where
    F: Fn(Arc<Connection>, Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, connection: Arc<Connection>, event: Event) -> anyhow::Result<()> {
        (self)(connection, event).await
    }
}

#[async_trait]
impl<F, Fut> ConnectionHandler for F
where
    F: Fn(Arc<Connection>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, connection: Arc<Connection>) -> anyhow::Result<()> {
        (self)(connection).await
    }
}
