//! WebSocket transport to the controller.
//!
//! A connection is split into a writer and a reader so the owning task can
//! drive both from one `select!` loop. Control frames are handled here; only
//! text frames reach the caller.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[error("connection closed")]
    Closed,
    #[error("transport io: {0}")]
    Io(#[from] tokio_tungstenite::tungstenite::Error),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }

    pub async fn connect(&self, endpoint: &str) -> Result<(WsSink, WsStream), TransportError> {
        let (socket, _) = connect_async(endpoint)
            .await
            .map_err(|source| TransportError::Connect {
                endpoint: endpoint.to_string(),
                source,
            })?;
        tracing::debug!(endpoint, "websocket handshake complete");
        let (write, read) = socket.split();
        Ok((WsSink { write }, WsStream { read }))
    }
}

pub struct WsSink {
    write: SplitSink<Socket, Message>,
}

impl WsSink {
    pub async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.write.send(Message::Text(text)).await?;
        Ok(())
    }

    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.write.close().await?;
        Ok(())
    }
}

pub struct WsStream {
    read: SplitStream<Socket>,
}

impl WsStream {
    /// Next text frame. `None` once the peer closed the connection.
    pub async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.read.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => tracing::warn!("dropping non-utf8 binary frame"),
                },
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "peer closed websocket");
                    return None;
                }
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}
