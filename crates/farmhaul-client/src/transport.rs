//! Real-time transport.
//!
//! The channel only needs "open a connection with this credential and give
//! me its text frames". [`WsConnector`] does that over WebSocket.

use futures_util::stream::BoxStream;
use futures_util::{future, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// Inbound text frames. The stream ending or yielding an error means the
/// connection is gone.
pub type FrameStream = BoxStream<'static, Result<String, ChannelError>>;

/// Opens authenticated connections.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, token: &str) -> impl Future<Output = Result<FrameStream, ChannelError>> + Send;
}

impl<T: Connector> Connector for Arc<T> {
    fn connect(&self, token: &str) -> impl Future<Output = Result<FrameStream, ChannelError>> + Send {
        (**self).connect(token)
    }
}

/// A connection-level fault. Absorbed by the reconnect loop, never surfaced
/// to the UI.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("connection closed by server")]
    Closed,
}

/// WebSocket connector. The credential travels as the `token` query
/// parameter of the handshake URL.
pub struct WsConnector {
    endpoint: Url,
}

impl WsConnector {
    pub fn new(endpoint: Url) -> Self {
        Self { endpoint }
    }

    pub fn handshake_url(&self, token: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("token", token);
        url
    }
}

impl Connector for WsConnector {
    async fn connect(&self, token: &str) -> Result<FrameStream, ChannelError> {
        let url = self.handshake_url(token);
        tracing::debug!("Connecting to {}", self.endpoint);
        let (ws, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;

        let frames = ws.filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(_)) => Some(Err(ChannelError::Closed)),
                // Ping/pong is answered by tungstenite; binary is not part of the protocol.
                Ok(_) => None,
                Err(e) => Some(Err(ChannelError::Transport(e.to_string()))),
            })
        });
        Ok(frames.boxed())
    }
}
