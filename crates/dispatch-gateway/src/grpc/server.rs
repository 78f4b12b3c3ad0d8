//! `dispatcher.Dispatcher` service.
//!
//! Routing follows what tonic's generated servers do, without the
//! generated code: the request path picks a unary or streaming handler and
//! [`tonic::server::Grpc`] drives it with [`ServerCodec`]. A frame that is
//! not a document is answered with an Error document, like a bad HTTP body.

use super::codec::{Inbound, ServerCodec};
use super::{EXECUTE_PATH, SERVICE_NAME, STREAM_PATH};
use crate::domain::error::GatewayError;
use dispatch_core::{DispatchContext, DispatchEngine, Document};
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::codegen::{empty_body, http, Body, BoxFuture, Service, StdError};
use tonic::server::{NamedService, StreamingService, UnaryService};
use tonic::{Code, Request, Response, Status, Streaming};
use tracing::{debug, info, warn};

/// Replies buffered per bidirectional stream before the handler waits.
const STREAM_BUFFER: usize = 16;

#[derive(Debug, Clone)]
pub struct DispatcherServer {
    engine: Arc<DispatchEngine>,
    max_message_size: Option<usize>,
}

impl DispatcherServer {
    pub fn new(engine: Arc<DispatchEngine>) -> Self {
        Self {
            engine,
            max_message_size: None,
        }
    }

    /// Limit for both decoded and encoded frames.
    pub fn max_message_size(mut self, limit: usize) -> Self {
        self.max_message_size = Some(limit);
        self
    }
}

impl NamedService for DispatcherServer {
    const NAME: &'static str = SERVICE_NAME;
}

impl<B> Service<http::Request<B>> for DispatcherServer
where
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<tonic::body::BoxBody>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let limit = self.max_message_size;
        let engine = Arc::clone(&self.engine);

        match req.uri().path() {
            EXECUTE_PATH => Box::pin(async move {
                let mut grpc = tonic::server::Grpc::new(ServerCodec)
                    .apply_max_message_size_config(limit, limit);
                Ok(grpc.unary(ExecuteSvc(engine), req).await)
            }),
            STREAM_PATH => Box::pin(async move {
                let mut grpc = tonic::server::Grpc::new(ServerCodec)
                    .apply_max_message_size_config(limit, limit);
                Ok(grpc.streaming(StreamSvc(engine), req).await)
            }),
            path => {
                debug!(path, "unimplemented rpc method");
                Box::pin(async move { Ok(unimplemented()) })
            }
        }
    }
}

fn unimplemented() -> http::Response<tonic::body::BoxBody> {
    let mut response = http::Response::new(empty_body());
    let headers = response.headers_mut();
    headers.insert("grpc-status", http::HeaderValue::from(Code::Unimplemented as i32));
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/grpc"),
    );
    response
}

struct ExecuteSvc(Arc<DispatchEngine>);

impl UnaryService<Inbound> for ExecuteSvc {
    type Response = Document;
    type Future = BoxFuture<Response<Document>, Status>;

    fn call(&mut self, request: Request<Inbound>) -> Self::Future {
        let engine = Arc::clone(&self.0);
        Box::pin(async move { Ok(Response::new(answer(&engine, request.into_inner()).await)) })
    }
}

async fn answer(engine: &DispatchEngine, inbound: Inbound) -> Document {
    match inbound.into_document() {
        Ok(doc) => {
            let ctx = DispatchContext::from_document(&doc);
            engine.dispatch(doc, &ctx).await
        }
        Err(reply) => reply,
    }
}

struct StreamSvc(Arc<DispatchEngine>);

impl StreamingService<Inbound> for StreamSvc {
    type Response = Document;
    type ResponseStream = ReceiverStream<Result<Document, Status>>;
    type Future = BoxFuture<Response<Self::ResponseStream>, Status>;

    fn call(&mut self, request: Request<Streaming<Inbound>>) -> Self::Future {
        let engine = Arc::clone(&self.0);
        Box::pin(async move {
            let mut inbound = request.into_inner();
            let (tx, rx) = mpsc::channel(STREAM_BUFFER);

            tokio::spawn(async move {
                loop {
                    let reply = match inbound.message().await {
                        Ok(Some(frame)) => answer(&engine, frame).await,
                        Ok(None) => break,
                        Err(status) => {
                            warn!(code = ?status.code(), "rpc stream failed: {}", status.message());
                            break;
                        }
                    };
                    if tx.send(Ok(reply)).await.is_err() {
                        debug!("rpc stream peer went away");
                        break;
                    }
                }
            });

            Ok(Response::new(ReceiverStream::new(rx)))
        })
    }
}

/// Serve the dispatcher on an already bound listener until `shutdown`
/// resolves.
pub async fn serve<F>(
    listener: TcpListener,
    engine: Arc<DispatchEngine>,
    max_message_size: usize,
    shutdown: F,
) -> Result<(), GatewayError>
where
    F: Future<Output = ()> + Send,
{
    if let Ok(addr) = listener.local_addr() {
        info!("RPC server listening on {}", addr);
    }

    tonic::transport::Server::builder()
        .add_service(DispatcherServer::new(engine).max_message_size(max_message_size))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await
        .map_err(|e| GatewayError::Serve(format!("rpc: {e}")))
}
