//! Line-delimited document server.
//!
//! One task per connection. Each line is a complete JSON document and is
//! answered by exactly one line.

use crate::domain::error::GatewayError;
use dispatch_core::{codec, CorrelationId, DispatchContext, DispatchEngine, Document};
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, error, info, warn, Instrument};

/// Accept connections until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    engine: Arc<DispatchEngine>,
    max_line_length: usize,
    shutdown: F,
) -> Result<(), GatewayError>
where
    F: Future<Output = ()> + Send,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Stream server listening on {}", addr);
    }
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Stream server stopped accepting connections");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (socket, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Stream accept failed: {}", e);
                        continue;
                    }
                };
                let connection_id = CorrelationId::new();
                let span = tracing::info_span!("stream_connection", %connection_id, %peer);
                let engine = Arc::clone(&engine);
                tokio::spawn(
                    async move {
                        debug!("connection opened");
                        handle_connection(socket, engine, max_line_length).await;
                        debug!("connection closed");
                    }
                    .instrument(span),
                );
            }
        }
    }
}

async fn handle_connection(socket: TcpStream, engine: Arc<DispatchEngine>, max_line_length: usize) {
    let mut lines = Framed::new(socket, LinesCodec::new_with_max_length(max_line_length));

    while let Some(next) = lines.next().await {
        let line = match next {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                warn!(max_line_length, "line too long, closing connection");
                return;
            }
            Err(LinesCodecError::Io(e)) => {
                warn!("read failed: {}", e);
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let reply = match codec::decode_line(&line) {
            Ok(doc) => {
                let ctx = DispatchContext::from_document(&doc);
                engine.dispatch(doc, &ctx).await
            }
            Err(e) => {
                debug!("undecodable line: {}", e);
                Document::error(e.to_string())
            }
        };

        let encoded = match codec::encode_line(&reply) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!("reply encoding failed: {}", e);
                return;
            }
        };
        if let Err(e) = lines.send(encoded).await {
            warn!("write failed: {}", e);
            return;
        }
    }
}
