//! Application callbacks invoked by the client engine.
//!
//! Plain async closures implement both traits, so
//! `engine.on_request(|req: Request| async move { ... })` works.

use std::future::Future;

use async_trait::async_trait;
use siyi_core::{Event, Request, Response};

/// Answers inbound requests.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Produce the response to `request`. An `Err` becomes an error
    /// response carrying its message.
    async fn handle(&self, request: Request) -> anyhow::Result<Response>;
}

/// Receives inbound events.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Consume `event`. Errors are logged.
    async fn handle(&self, event: Event) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> RequestHandler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Response>> + Send,
{
    async fn handle(&self, request: Request) -> anyhow::Result<Response> {
        (self)(request).await
    }
}

#[async_trait]
impl<F, Fut> EventHandler for F
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        (self)(event).await
    }
}
