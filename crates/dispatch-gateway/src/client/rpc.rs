//! gRPC client for the `dispatcher.Dispatcher` service.

use crate::domain::config::ClientConfig;
use crate::domain::error::TransportError;
use crate::domain::ports::{derive_rpc_port, split_host_port, with_derived_port};
use crate::grpc::{DocumentCodec, EXECUTE_PATH, STREAM_PATH};
use dispatch_core::Document;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tonic::{Status, Streaming};
use tracing::debug;

/// Outbound documents buffered per stream.
const STREAM_BUFFER: usize = 16;

/// One gRPC channel. Cloning shares the channel.
#[derive(Debug, Clone)]
pub struct RpcClient {
    grpc: tonic::client::Grpc<Channel>,
}

impl RpcClient {
    pub async fn connect(address: &str, config: &ClientConfig) -> Result<Self, TransportError> {
        let (host, port) = split_host_port(address)
            .filter(|(host, port)| !host.is_empty() && !port.is_empty())
            .ok_or_else(|| TransportError::InvalidAddress(address.to_string()))?;

        let channel = Endpoint::from_shared(format!("http://{host}:{port}"))?
            .connect_timeout(config.dial_timeout)
            .connect()
            .await?;
        debug!(%host, %port, "rpc client connected");

        let grpc = tonic::client::Grpc::new(channel)
            .max_decoding_message_size(config.max_message_size)
            .max_encoding_message_size(config.max_message_size);
        Ok(Self { grpc })
    }

    /// Connect to the gRPC server of the dispatcher whose HTTP endpoint is
    /// `http_address`.
    pub async fn from_http_port(http_address: &str, config: &ClientConfig) -> Result<Self, TransportError> {
        let addr = with_derived_port(http_address, derive_rpc_port)
            .ok_or_else(|| TransportError::InvalidAddress(http_address.to_string()))?;
        Self::connect(&addr, config).await
    }

    /// Connect, execute one document, disconnect.
    pub async fn call_unary(address: &str, doc: Document, config: &ClientConfig) -> Result<Document, TransportError> {
        let mut client = Self::connect(address, config).await?;
        client.execute(doc).await
    }

    /// Unary `Execute`. Error documents are returned as documents.
    pub async fn execute(&mut self, doc: Document) -> Result<Document, TransportError> {
        self.ready().await?;
        let response = self
            .grpc
            .unary(
                tonic::Request::new(doc),
                PathAndQuery::from_static(EXECUTE_PATH),
                DocumentCodec,
            )
            .await?;
        Ok(response.into_inner())
    }

    /// Open a bidirectional `Stream`.
    pub async fn stream(&mut self) -> Result<RpcStream, TransportError> {
        self.ready().await?;
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let response = self
            .grpc
            .streaming(
                tonic::Request::new(ReceiverStream::new(rx)),
                PathAndQuery::from_static(STREAM_PATH),
                DocumentCodec,
            )
            .await?;

        Ok(RpcStream {
            outbound: Some(tx),
            inbound: response.into_inner(),
        })
    }

    async fn ready(&mut self) -> Result<(), TransportError> {
        self.grpc
            .ready()
            .await
            .map_err(|e| TransportError::Rpc(Status::unknown(format!("service was not ready: {e}"))))
    }
}

/// Both halves of an open `Stream` call. Each sent document is answered by
/// exactly one received document.
#[derive(Debug)]
pub struct RpcStream {
    outbound: Option<mpsc::Sender<Document>>,
    inbound: Streaming<Document>,
}

impl RpcStream {
    pub async fn send(&self, doc: Document) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::Closed)?;
        outbound.send(doc).await.map_err(|_| TransportError::Closed)
    }

    /// Next reply, `None` once the server finished the stream.
    pub async fn recv(&mut self) -> Result<Option<Document>, TransportError> {
        Ok(self.inbound.message().await?)
    }

    /// Half-close: the server sees the end of input after what was sent.
    pub fn close_send(&mut self) {
        self.outbound = None;
    }
}
