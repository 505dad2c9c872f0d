//! Pipe transport - NUL-terminated JSON messages over a byte stream
//!
//! This is the framing Chrome uses for `--remote-debugging-pipe`. It also
//! works over `tokio::io::duplex`, which makes it the in-process transport.
//!
//! Reads are buffered: a message split across several reads is reassembled,
//! several messages in one read come out one by one.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use super::{MessageSink, MessageStream};
use crate::error::{Error, Result};

const DELIMITER: u8 = 0;

pub struct PipeSink<W> {
    writer: W,
}

impl<W> PipeSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl<W> MessageSink for PipeSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, message: String) -> Result<()> {
        self.writer.write_all(message.as_bytes()).await?;
        self.writer.write_all(&[DELIMITER]).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

pub struct PipeStream<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead> PipeStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buf: Vec::new(),
        }
    }
}

#[async_trait]
impl<R> MessageStream for PipeStream<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn recv(&mut self) -> Option<Result<String>> {
        self.buf.clear();
        match self.reader.read_until(DELIMITER, &mut self.buf).await {
            Ok(0) => None,
            Ok(_) => {
                if self.buf.last() != Some(&DELIMITER) {
                    tracing::warn!(
                        "Pipe closed with {} bytes of unterminated message, discarding",
                        self.buf.len()
                    );
                    return None;
                }
                self.buf.pop();
                let bytes = std::mem::take(&mut self.buf);
                Some(
                    String::from_utf8(bytes)
                        .map_err(|e| Error::Transport(format!("non UTF-8 message: {}", e))),
                )
            }
            Err(e) => Some(Err(e.into())),
        }
    }
}
