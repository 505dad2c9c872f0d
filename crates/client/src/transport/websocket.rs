//! WebSocket transport (tokio-tungstenite)
//!
//! Single socket per connection; text frames carry one JSON message each.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{MessageSink, MessageStream, Transport};
use crate::error::{Error, Result};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Handshake and split the socket
pub async fn connect(url: &str) -> Result<Transport> {
    tracing::debug!("Opening WebSocket to {}", url);
    let (socket, _) = connect_async(url).await?;
    let (sink, stream) = socket.split();
    Ok(Transport::new(WsSink { sink }, WsStream { stream }))
}

pub struct WsSink {
    sink: SplitSink<Socket, Message>,
}

#[async_trait]
impl MessageSink for WsSink {
    async fn send(&mut self, message: String) -> Result<()> {
        self.sink.send(Message::Text(message)).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.sink.close().await?;
        Ok(())
    }
}

pub struct WsStream {
    stream: SplitStream<Socket>,
}

#[async_trait]
impl MessageStream for WsStream {
    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => {
                    return Some(
                        String::from_utf8(bytes)
                            .map_err(|e| Error::Transport(format!("non UTF-8 frame: {}", e))),
                    )
                }
                Ok(Message::Close(frame)) => {
                    tracing::debug!("WebSocket close frame: {:?}", frame);
                    return None;
                }
                // ping/pong are answered by tungstenite itself
                Ok(_) => continue,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return None
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}
