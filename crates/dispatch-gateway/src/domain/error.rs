//! Gateway and client error types.
//!
//! Dispatch failures never show up here: they are Error documents. These
//! types cover what happens around the engine, i.e. serving and calling.

use dispatch_core::Document;
use std::io;

/// Server-side lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Server socket bind error
    #[error("server bind error on {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: io::Error,
    },

    /// A running server stopped with an error
    #[error("server error: {0}")]
    Serve(String),
}

/// Client-side failures. The call may never have reached an engine.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("dial {addr} failed: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("deadline exceeded")]
    Timeout,

    #[error("codec error: {0}")]
    Codec(String),

    #[error("empty response")]
    EmptyResponse,

    #[error("client is closed")]
    Closed,

    #[error("pool is closed")]
    PoolClosed,

    #[error("pool size must be > 0")]
    InvalidPoolSize,

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rpc failed: {0}")]
    Rpc(#[from] tonic::Status),

    #[error("rpc transport failed: {0}")]
    RpcTransport(#[from] tonic::transport::Error),

    /// The remote answered with an Error document.
    #[error("remote error: {}", .0.error.as_deref().unwrap_or_default())]
    Remote(Box<Document>),
}

impl TransportError {
    /// The Error document behind a `Remote` failure.
    pub fn document(&self) -> Option<&Document> {
        match self {
            TransportError::Remote(doc) => Some(doc),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Codec(e.to_string())
    }
}

impl From<dispatch_core::DecodeError> for TransportError {
    fn from(e: dispatch_core::DecodeError) -> Self {
        TransportError::Codec(e.to_string())
    }
}

impl From<tokio_util::codec::LinesCodecError> for TransportError {
    fn from(e: tokio_util::codec::LinesCodecError) -> Self {
        match e {
            tokio_util::codec::LinesCodecError::Io(io) => TransportError::Io(io),
            other => TransportError::Codec(other.to_string()),
        }
    }
}

impl From<tokio::time::error::Elapsed> for TransportError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        TransportError::Timeout
    }
}
