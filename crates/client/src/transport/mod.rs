//! Transport - duplex message channel under the dispatcher
//!
//! A transport is two halves:
//! - `MessageSink`: write one text message, or close
//! - `MessageStream`: next inbound message; `None` means the peer closed
//!
//! "Open" is simply a successfully constructed `Transport`. The dispatcher
//! owns the sink behind a lock and moves the stream into its reader task.

use async_trait::async_trait;

use crate::error::Result;

pub mod pipe;
pub mod websocket;

pub use pipe::{PipeSink, PipeStream};
pub use websocket::{WsSink, WsStream};

/// Outbound half of a transport
#[async_trait]
pub trait MessageSink: Send {
    /// Write one complete message
    async fn send(&mut self, message: String) -> Result<()>;

    /// Close the outbound direction. Called at most once by the dispatcher.
    async fn close(&mut self) -> Result<()>;
}

/// Inbound half of a transport
#[async_trait]
pub trait MessageStream: Send {
    /// Next complete message, `None` once the peer has gone away
    async fn recv(&mut self) -> Option<Result<String>>;
}

/// An opened transport, ready to be handed to `Client::with_transport`
pub struct Transport {
    pub(crate) sink: Box<dyn MessageSink>,
    pub(crate) stream: Box<dyn MessageStream>,
}

impl Transport {
    /// Wrap any sink/stream pair
    pub fn new(sink: impl MessageSink + 'static, stream: impl MessageStream + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            stream: Box::new(stream),
        }
    }

    /// Open a WebSocket connection to a debugger URL
    pub async fn websocket(url: &str) -> Result<Self> {
        websocket::connect(url).await
    }

    /// NUL-delimited JSON over an arbitrary byte pipe
    pub fn pipe<R, W>(reader: R, writer: W) -> Self
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
        W: tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        Self::new(PipeSink::new(writer), PipeStream::new(reader))
    }

    pub fn into_parts(self) -> (Box<dyn MessageSink>, Box<dyn MessageStream>) {
        (self.sink, self.stream)
    }
}
