//! Axum WebSocket upgrade endpoint.

use std::net::SocketAddr;

use axum::Router;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::Response as HttpResponse;
use futures::{SinkExt, StreamExt, future};
use siyi_core::{FrameSink, FrameStream, Transport, TransportError};
use tracing::{debug, trace, warn};

use crate::registry::ServerRegistry;

/// Router upgrading a WebSocket on any path and handing it to `registry`.
pub fn router(registry: ServerRegistry) -> Router {
    Router::new().fallback(upgrade).with_state(registry)
}

async fn upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(registry): State<ServerRegistry>,
) -> HttpResponse {
    debug!(%addr, "websocket upgrade");
    ws.on_upgrade(move |socket| async move {
        registry
            .serve_connection(axum_transport(socket, Some(addr.to_string())))
            .await;
    })
}

/// Adapt an upgraded axum socket to a [`Transport`].
pub fn axum_transport(socket: WebSocket, peer: Option<String>) -> Transport {
    let (sink, stream) = socket.split();

    let sink: FrameSink = Box::pin(
        sink.with(|text: String| future::ready(Ok::<_, axum::Error>(WsMessage::Text(text.into()))))
            .sink_map_err(|e| TransportError::Io(e.to_string())),
    );

    let stream: FrameStream = Box::pin(stream.filter_map(|frame| {
        future::ready(match frame {
            Ok(WsMessage::Text(text)) => Some(Ok(text.as_str().to_owned())),
            Ok(WsMessage::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => Some(Ok(text.to_owned())),
                Err(_) => {
                    warn!(len = bytes.len(), "dropping non-UTF-8 binary frame");
                    None
                }
            },
            Ok(WsMessage::Close(frame)) => {
                trace!(?frame, "peer sent close");
                None
            }
            Ok(_) => None,
            Err(e) => Some(Err(TransportError::Io(e.to_string()))),
        })
    }));

    Transport::new(sink, stream, peer)
}
