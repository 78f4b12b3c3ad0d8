//! Request/response client over HTTP.

use crate::domain::config::ClientConfig;
use crate::domain::error::TransportError;
use crate::http::VERIFY_CODE_HEADER;
use dispatch_core::{codec, DispatchContext, Document, Form};
use reqwest::header::{ACCEPT, CONNECTION};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::error::Error as StdError;
use std::io;
use std::marker::PhantomData;
use tracing::{debug, warn};

/// Posts documents to a dispatcher's HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    url: String,
}

impl HttpClient {
    pub fn new(address: &str) -> Result<Self, TransportError> {
        Self::with_config(address, &ClientConfig::default())
    }

    pub fn with_config(address: &str, config: &ClientConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.dial_timeout)
            .build()?;
        Ok(Self {
            client,
            url: normalize_url(address)?,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send `doc` and decode the reply. Error documents are returned as
    /// documents; only transport failures are errors.
    pub async fn send(&self, doc: &Document) -> Result<Document, TransportError> {
        match self.post(doc, false).await {
            Err(TransportError::Http(e)) if is_connection_closed(&e) => {
                warn!(url = %self.url, "connection dropped, retrying once: {}", e);
                self.post(doc, true).await
            }
            other => other,
        }
    }

    async fn post(&self, doc: &Document, close: bool) -> Result<Document, TransportError> {
        let mut request = self
            .client
            .post(&self.url)
            .header(ACCEPT, "application/json")
            .json(doc);
        if let Some(code) = doc.verify_code() {
            request = request.header(VERIFY_CODE_HEADER, code);
        }
        if close {
            request = request.header(CONNECTION, "close");
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        debug!(url = %self.url, %status, bytes = body.len(), "http reply");

        Ok(codec::decode(&body)?)
    }
}

fn normalize_url(address: &str) -> Result<String, TransportError> {
    let address = address.trim();
    let (scheme, rest) = match address.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => ("http", address),
    };
    let authority = rest.split('/').next().unwrap_or_default();
    if authority.is_empty() {
        return Err(TransportError::InvalidAddress(address.to_string()));
    }
    Ok(format!("{scheme}://{authority}/"))
}

/// EOF, reset and closed-connection failures are worth one more attempt.
fn is_connection_closed(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = source {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ) {
                return true;
            }
        }
        let message = e.to_string();
        if message.contains("connection closed") || message.contains("closed network connection") {
            return true;
        }
        source = e.source();
    }
    false
}

/// Typed call of one remote transaction.
///
/// `T` is serialized into the form and the reply's `output` is decoded
/// into `R`. The caller's verify code travels along; its licence does not.
pub struct ServiceRequest<T, R> {
    client: HttpClient,
    department: String,
    transaction: String,
    _marker: PhantomData<fn(T) -> R>,
}

impl<T, R> ServiceRequest<T, R>
where
    T: Serialize,
    R: DeserializeOwned,
{
    pub fn new(
        client: HttpClient,
        department: impl Into<String>,
        transaction: impl Into<String>,
    ) -> Self {
        Self {
            client,
            department: department.into(),
            transaction: transaction.into(),
            _marker: PhantomData,
        }
    }

    pub async fn call(&self, request: &T, ctx: &DispatchContext) -> Result<R, TransportError> {
        let form = match serde_json::to_value(request)? {
            Value::Object(form) => form,
            Value::Null => Form::new(),
            other => {
                return Err(TransportError::Codec(format!(
                    "request must serialize to an object, got {other}"
                )))
            }
        };

        let mut doc = Document::new(&self.department, &self.transaction).with_form(form);
        if let Some(code) = ctx.verify_code() {
            doc = doc.with_verify_code(code);
        }

        let reply = self.client.send(&doc).await?;
        if reply.is_error() {
            return Err(TransportError::Remote(Box::new(reply)));
        }
        Ok(serde_json::from_value(reply.output.unwrap_or(Value::Null))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::GatewayConfig;
    use crate::http::build_router;
    use dispatch_core::{
        async_trait, DispatchEngine, FieldKind, Registry, Schema, SecurityOptions, Transaction,
        TransactionError, TransactionOptions,
    };
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[derive(Debug, Serialize, Deserialize)]
    struct Sum {
        a: i64,
        b: i64,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Total {
        total: i64,
        verify_code: Option<String>,
    }

    struct Add;

    #[async_trait]
    impl Transaction for Add {
        type Request = Sum;
        type Response = Total;

        fn request_schema() -> Schema {
            Schema::builder()
                .field("a", FieldKind::Number, r#"json:"a" require:"true""#)
                .field("b", FieldKind::Number, r#"json:"b" require:"true""#)
                .build()
        }

        async fn transact(&mut self, req: Sum, ctx: &DispatchContext) -> Result<Total, TransactionError> {
            Ok(Total {
                total: req.a + req.b,
                verify_code: ctx.verify_code().map(str::to_string),
            })
        }
    }

    async fn start_server() -> String {
        let mut registry = Registry::new();
        registry.register_transaction("math", "add", |_| Add).unwrap();
        registry.seal();
        let engine = Arc::new(DispatchEngine::new(Arc::new(registry)));
        let app = build_router(engine, &GatewayConfig::default());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr.to_string()
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("localhost:9000").unwrap(), "http://localhost:9000/");
        assert_eq!(
            normalize_url("http://localhost:9000/some/path").unwrap(),
            "http://localhost:9000/"
        );
        assert_eq!(normalize_url("https://api.example").unwrap(), "https://api.example/");
        assert!(normalize_url("http://").is_err());
    }

    #[tokio::test]
    async fn test_send_document() {
        let client = HttpClient::new(&start_server().await).unwrap();
        let doc = Document::new("math", "add")
            .with_form(json!({"a": 2, "b": 3}).as_object().unwrap().clone())
            .with_verify_code("vc-1");

        let reply = client.send(&doc).await.unwrap();
        assert!(!reply.is_error());
        assert_eq!(reply.output.unwrap(), json!({"total": 5, "verify_code": "vc-1"}));
    }

    #[tokio::test]
    async fn test_error_document_is_not_a_transport_error() {
        let client = HttpClient::new(&start_server().await).unwrap();
        let reply = client.send(&Document::new("math", "divide")).await.unwrap();
        assert_eq!(reply.error.as_deref(), Some("transaction not found"));
    }

    #[tokio::test]
    async fn test_service_request() {
        let client = HttpClient::new(&start_server().await).unwrap();
        let add: ServiceRequest<Sum, Total> = ServiceRequest::new(client.clone(), "math", "add");
        let ctx = DispatchContext::new().with_verify_code("code-9");

        let total = add.call(&Sum { a: 40, b: 2 }, &ctx).await.unwrap();
        assert_eq!(
            total,
            Total {
                total: 42,
                verify_code: Some("code-9".to_string())
            }
        );

        let missing: ServiceRequest<Sum, Total> = ServiceRequest::new(client, "math", "nope");
        let err = missing.call(&Sum { a: 1, b: 1 }, &ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "remote error: transaction not found");
    }

    #[tokio::test]
    async fn test_retries_once_after_dropped_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            // First connection: read the request, then hang up without replying.
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let _ = socket.read(&mut buf).await;
            drop(socket);

            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            assert!(request.to_ascii_lowercase().contains("connection: close"));

            let body = serde_json::to_string(&Document::error("second attempt")).unwrap();
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });

        let client = HttpClient::new(&addr.to_string()).unwrap();
        let reply = client.send(&Document::new("a", "b")).await.unwrap();
        assert_eq!(reply.error.as_deref(), Some("second attempt"));
    }

    /// Licence-protected transaction that calls `math/add` downstream.
    struct Relay {
        downstream: String,
    }

    #[async_trait]
    impl Transaction for Relay {
        type Request = Form;
        type Response = Total;

        fn request_schema() -> Schema {
            Schema::default()
        }

        fn options() -> TransactionOptions {
            TransactionOptions {
                security: SecurityOptions {
                    licence_checker: true,
                },
                ..Default::default()
            }
        }

        fn licence_valid(token: &str) -> bool {
            token == "relay-key"
        }

        async fn transact(&mut self, _: Form, ctx: &DispatchContext) -> Result<Total, TransactionError> {
            let client = HttpClient::new(&self.downstream).map_err(TransactionError::new)?;
            ServiceRequest::<Sum, Total>::new(client, "math", "add")
                .call(&Sum { a: 1, b: 2 }, ctx)
                .await
                .map_err(TransactionError::new)
        }
    }

    #[tokio::test]
    async fn test_service_request_forwards_verify_code_not_licence() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let downstream = listener.local_addr().unwrap().to_string();
        let (seen_tx, seen_rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let _ = seen_tx.send(request);

            let reply = Document::new("math", "add");
            let body = serde_json::to_string(&Document {
                doc_type: Some(dispatch_core::DocumentType::Result),
                output: Some(json!({"total": 3, "verify_code": null})),
                ..reply
            })
            .unwrap();
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });

        let mut registry = Registry::new();
        registry
            .register_transaction("gate", "relay", move |_| Relay {
                downstream: downstream.clone(),
            })
            .unwrap();
        registry.seal();
        let engine = DispatchEngine::new(Arc::new(registry));

        let reply = engine
            .dispatch_root(
                Document::new("gate", "relay")
                    .with_licence("relay-key")
                    .with_verify_code("vc-3"),
            )
            .await;
        assert!(!reply.is_error(), "{:?}", reply.error);
        assert_eq!(reply.output.unwrap()["total"], 3);

        let request = seen_rx.await.unwrap();
        assert!(request.contains("vc-3"));
        assert!(!request.contains("relay-key"));
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&data);
            if let Some(head_end) = text.find("\r\n\r\n") {
                let length = text[..head_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if data.len() >= head_end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).into_owned()
    }
}
