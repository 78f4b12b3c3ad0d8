//! Persistent line-stream client.

use crate::domain::config::ClientConfig;
use crate::domain::error::TransportError;
use crate::domain::ports::{derive_stream_port, split_host_port, with_derived_port};
use dispatch_core::{codec, Document};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::debug;

/// One TCP connection, one call at a time.
///
/// A failed call (timeout, I/O, broken reply) closes the connection since
/// the position in the reply stream is no longer known.
#[derive(Debug)]
pub struct StreamClient {
    addr: String,
    lines: Option<Framed<TcpStream, LinesCodec>>,
    read_write_timeout: Duration,
}

impl StreamClient {
    pub async fn connect(address: &str, config: &ClientConfig) -> Result<Self, TransportError> {
        let addr = match split_host_port(address) {
            Some((host, port)) if !host.is_empty() && !port.is_empty() => format!("{host}:{port}"),
            _ => return Err(TransportError::InvalidAddress(address.to_string())),
        };

        let socket = timeout(config.dial_timeout, TcpStream::connect(&addr))
            .await?
            .map_err(|source| TransportError::Dial {
                addr: addr.clone(),
                source,
            })?;
        socket.set_nodelay(true)?;
        debug!(%addr, "stream client connected");

        Ok(Self {
            addr,
            lines: Some(Framed::new(
                socket,
                LinesCodec::new_with_max_length(config.max_message_size),
            )),
            read_write_timeout: config.read_write_timeout,
        })
    }

    /// Connect to the line-stream server of the dispatcher whose HTTP
    /// endpoint is `http_address`.
    pub async fn from_http_port(http_address: &str, config: &ClientConfig) -> Result<Self, TransportError> {
        let addr = with_derived_port(http_address, derive_stream_port)
            .ok_or_else(|| TransportError::InvalidAddress(http_address.to_string()))?;
        Self::connect(&addr, config).await
    }

    /// Connect, send one document, disconnect.
    pub async fn call(address: &str, doc: &Document, config: &ClientConfig) -> Result<Document, TransportError> {
        let mut client = Self::connect(address, config).await?;
        let reply = client.send(doc).await;
        client.close();
        reply
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn is_closed(&self) -> bool {
        self.lines.is_none()
    }

    pub fn close(&mut self) {
        self.lines = None;
    }

    /// Send `doc` and wait for its reply. A reply of type Error becomes
    /// [`TransportError::Remote`].
    pub async fn send(&mut self, doc: &Document) -> Result<Document, TransportError> {
        let lines = self.lines.as_mut().ok_or(TransportError::Closed)?;
        let encoded = codec::encode_line(doc)?;

        let exchange = async {
            lines.send(encoded).await?;
            lines.next().await.transpose()
        };
        let line = match timeout(self.read_write_timeout, exchange).await {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => {
                self.lines = None;
                return Err(TransportError::EmptyResponse);
            }
            Ok(Err(e)) => {
                self.lines = None;
                return Err(e.into());
            }
            Err(elapsed) => {
                self.lines = None;
                return Err(elapsed.into());
            }
        };

        if line.trim().is_empty() {
            self.lines = None;
            return Err(TransportError::EmptyResponse);
        }
        let reply = codec::decode_line(&line)?;
        if reply.is_error() {
            return Err(TransportError::Remote(Box::new(reply)));
        }
        Ok(reply)
    }
}
