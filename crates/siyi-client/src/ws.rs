//! WebSocket connector over `tokio-tungstenite`.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt, future};
use siyi_core::{Connector, FrameSink, FrameStream, Transport, TransportError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{WebSocketStream, connect_async};
use tracing::{trace, warn};

/// Dials a `ws://` or `wss://` URL on every connect attempt.
#[derive(Clone, Debug)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    /// Connector for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Transport, TransportError> {
        let (ws, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Io(format!("connect {}: {e}", self.url)))?;
        Ok(ws_transport(ws, Some(self.url.clone())))
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

/// Adapt an established tungstenite socket to a [`Transport`].
///
/// Text frames pass through, binary frames are accepted when they are valid
/// UTF-8, control frames are skipped.
pub fn ws_transport<S>(ws: WebSocketStream<S>, peer: Option<String>) -> Transport
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = ws.split();

    let sink: FrameSink = Box::pin(
        sink.with(|text: String| future::ready(Ok::<_, tungstenite::Error>(WsMessage::text(text))))
            .sink_map_err(|e| TransportError::Io(e.to_string())),
    );

    let stream: FrameStream = Box::pin(stream.filter_map(|frame| {
        future::ready(match frame {
            Ok(WsMessage::Text(text)) => Some(Ok(text.as_str().to_owned())),
            Ok(WsMessage::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => Some(Ok(text)),
                Err(_) => {
                    warn!(len = bytes.len(), "dropping non-UTF-8 binary frame");
                    None
                }
            },
            Ok(other) => {
                trace!(frame = ?other, "skipping control frame");
                None
            }
            Err(e) => Some(Err(TransportError::Io(e.to_string()))),
        })
    }));

    Transport::new(sink, stream, peer)
}
