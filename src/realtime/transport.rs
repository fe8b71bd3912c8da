//! Message transport underneath the hub protocol.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::ChannelError;

/// An open, text-framed duplex connection.
#[async_trait]
pub trait Transport: Send {
    async fn send_text(&mut self, text: String) -> Result<(), ChannelError>;

    /// Next text payload, or `None` once the peer has closed.
    async fn recv_text(&mut self) -> Option<Result<String, ChannelError>>;

    async fn close(&mut self);
}

/// Opens transports to a hub URL.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Transport>, ChannelError>;
}

#[async_trait]
impl<T: Connector> Connector for std::sync::Arc<T> {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Transport>, ChannelError> {
        (**self).connect(url).await
    }
}

/// Websocket connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Transport>, ChannelError> {
        let (stream, resp) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        debug!(status = %resp.status(), "websocket upgraded");
        Ok(Box::new(WsTransport { stream }))
    }
}

struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<(), ChannelError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| ChannelError::Closed(e.to_string()))
    }

    async fn recv_text(&mut self) -> Option<Result<String, ChannelError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(e) => return Some(Err(ChannelError::Protocol(e.to_string()))),
                },
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "websocket closed by peer");
                    return None;
                }
                // tungstenite answers pings itself
                Ok(_) => continue,
                Err(e) => return Some(Err(ChannelError::Closed(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "websocket close failed");
        }
    }
}
