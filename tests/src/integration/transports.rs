//! # Cross-Transport Integration
//!
//! One served dispatcher, the same documents over every transport:
//!
//! 1. **HTTP**: in-process router and a real socket via [`HttpClient`].
//! 2. **Line stream**: single client and pooled clients.
//! 3. **gRPC**: unary, bidirectional stream and pooled channels.
//!
//! Every transport must agree on the reply for the same input.

#[cfg(test)]
mod tests {
    use crate::fixtures::{engine, form, Product, Served, VALID_LICENCE};
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use dispatch_core::{DispatchContext, Document, DocumentType};
    use dispatch_gateway::http::build_router;
    use dispatch_gateway::{
        ClientConfig, GatewayConfig, HttpClient, RpcClient, RpcClientPool, ServiceRequest,
        StreamClient, StreamClientPool, TransportError,
    };
    use serde::Serialize;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn shirt() -> Document {
        Document::new("product", "create").with_form(form(json!({
            "name": "Shirt",
            "slug": "shirt",
            "counter": 1
        })))
    }

    /// Fields that survive any transport untouched.
    fn assert_round_trip(sent: &Document, reply: &Document) {
        assert_eq!(reply.department, sent.department);
        assert_eq!(reply.transaction, sent.transaction);
        assert_eq!(reply.form, sent.form);
        assert_eq!(reply.licence(), sent.licence());
    }

    // =============================================================================
    // HTTP
    // =============================================================================

    #[tokio::test]
    async fn test_http_router_in_process() {
        let app = build_router(Arc::new(engine()), &GatewayConfig::default());
        let req = Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&shirt()).unwrap()))
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-department").unwrap(), "product");
        assert!(response.headers().contains_key("x-request-id"));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let reply: Document = serde_json::from_slice(&body).unwrap();
        assert_eq!(reply.doc_type, Some(DocumentType::Result));
        assert_eq!(reply.output.unwrap()["name"], "Shirt");
    }

    #[tokio::test]
    async fn test_http_over_socket() {
        let served = Served::start().await;
        let client = HttpClient::new(&served.http()).unwrap();

        let sent = shirt().with_licence("opaque");
        let reply = client.send(&sent).await.unwrap();
        assert_round_trip(&sent, &reply);
        assert_eq!(reply.output.unwrap()["slug"], "shirt");

        let mut missing = shirt();
        missing.form.remove("name");
        let reply = client.send(&missing).await.unwrap();
        assert_eq!(
            reply.error.as_deref(),
            Some("the field named name is requre but not found")
        );
    }

    #[tokio::test]
    async fn test_typed_service_request() {
        #[derive(Serialize)]
        struct NewProduct<'a> {
            name: &'a str,
            slug: &'a str,
            counter: i64,
        }

        let served = Served::start().await;
        let client = HttpClient::new(&served.http()).unwrap();
        let create: ServiceRequest<NewProduct<'_>, Product> =
            ServiceRequest::new(client, "product", "create");

        let product = create
            .call(
                &NewProduct {
                    name: "Hat",
                    slug: "hat",
                    counter: 3,
                },
                &DispatchContext::new(),
            )
            .await
            .unwrap();
        assert_eq!(product.name, "Hat");
        assert_eq!(product.description, "");
    }

    #[tokio::test]
    async fn test_docs_endpoint() {
        let served = Served::start().await;
        let url = format!("http://{}/help?format=json", served.http());
        let docs: Value = reqwest::get(url).await.unwrap().json().await.unwrap();

        let departments = docs["departments"].as_array().unwrap();
        let names: Vec<_> = departments.iter().map(|d| d["name"].as_str().unwrap()).collect();
        assert_eq!(names, ["product", "secure"]);
        assert_eq!(departments[0]["transactions"][0]["name"], "create");
    }

    // =============================================================================
    // LINE STREAM
    // =============================================================================

    #[tokio::test]
    async fn test_stream_round_trip() {
        let served = Served::start().await;
        let mut client = StreamClient::connect(&served.stream(), &ClientConfig::default())
            .await
            .unwrap();

        let sent = shirt().with_licence("opaque");
        let reply = client.send(&sent).await.unwrap();
        assert_round_trip(&sent, &reply);

        let err = client
            .send(&Document::new("secure", "whoami"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "remote error: licence not found");
    }

    #[tokio::test]
    async fn test_stream_chaining_matches_engine() {
        let served = Served::start().await;
        let doc = Document::new("product", "echo")
            .with_form(form(json!({"x": 1})))
            .with_licence(VALID_LICENCE)
            .with_dispatching(Document::new("secure", "whoami"));

        let expected = engine().dispatch_root(doc.clone()).await;
        let reply = StreamClient::call(&served.stream(), &doc, &ClientConfig::default())
            .await
            .unwrap();

        assert_eq!(reply.dispatchings.len(), expected.dispatchings.len());
        assert_eq!(reply.dispatchings[0].output, expected.dispatchings[0].output);
    }

    #[tokio::test]
    async fn test_stream_pool() {
        let served = Served::start().await;
        let config = ClientConfig {
            pool_size: 2,
            ..Default::default()
        };
        let pool = Arc::new(StreamClientPool::stream(served.stream(), config).unwrap());

        let calls = (0..8).map(|i| {
            let pool = Arc::clone(&pool);
            async move {
                let doc = Document::new("product", "echo").with_form(form(json!({"i": i})));
                pool.send(&doc).await
            }
        });
        let replies = futures::future::join_all(calls).await;

        for (i, reply) in replies.into_iter().enumerate() {
            assert_eq!(reply.unwrap().output.unwrap()["i"], i);
        }
        assert!(pool.idle() <= 2);

        // A remote error discards the connection it travelled on.
        let before = pool.idle();
        assert!(pool.send(&Document::new("product", "fail")).await.is_err());
        assert!(pool.idle() < before || before == 0);

        pool.close();
        assert!(matches!(
            pool.send(&shirt()).await,
            Err(TransportError::PoolClosed)
        ));
    }

    // =============================================================================
    // gRPC
    // =============================================================================

    #[tokio::test]
    async fn test_rpc_round_trip() {
        let served = Served::start().await;
        let mut client = RpcClient::connect(&served.rpc(), &ClientConfig::default())
            .await
            .unwrap();

        let sent = shirt().with_licence("opaque");
        let reply = client.execute(sent.clone()).await.unwrap();
        assert_round_trip(&sent, &reply);
        assert_eq!(reply.output.unwrap()["name"], "Shirt");

        let procedure = client
            .execute(Document::new("product", "create").with_type(DocumentType::Procedure))
            .await
            .unwrap();
        assert_eq!(procedure.doc_type, Some(DocumentType::Procedure));
    }

    #[tokio::test]
    async fn test_rpc_stream_one_reply_per_document() {
        let served = Served::start().await;
        let mut client = RpcClient::connect(&served.rpc(), &ClientConfig::default())
            .await
            .unwrap();
        let mut stream = client.stream().await.unwrap();

        stream.send(shirt()).await.unwrap();
        stream.send(Document::new("product", "missing")).await.unwrap();
        stream.close_send();

        let first = stream.recv().await.unwrap().unwrap();
        assert_eq!(first.doc_type, Some(DocumentType::Result));
        let second = stream.recv().await.unwrap().unwrap();
        assert_eq!(second.error.as_deref(), Some("transaction not found"));
        assert!(stream.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rpc_pool() {
        let served = Served::start().await;
        let pool = RpcClientPool::rpc(served.rpc(), ClientConfig::default()).unwrap();

        let replies = futures::future::join_all((0..4).map(|_| pool.execute(shirt()))).await;
        for reply in replies {
            assert_eq!(reply.unwrap().output.unwrap()["slug"], "shirt");
        }
        assert!(pool.idle() >= 1);
    }

    // =============================================================================
    // AGREEMENT & LIFECYCLE
    // =============================================================================

    #[tokio::test]
    async fn test_transports_agree() {
        let served = Served::start().await;
        let config = ClientConfig::default();
        let doc = Document::new("product", "echo").with_form(form(json!({"a": [1, 2], "b": "c"})));

        let http = HttpClient::new(&served.http()).unwrap().send(&doc).await.unwrap();
        let stream = StreamClient::call(&served.stream(), &doc, &config).await.unwrap();
        let rpc = RpcClient::call_unary(&served.rpc(), doc.clone(), &config)
            .await
            .unwrap();

        assert_eq!(http, stream);
        assert_eq!(stream, rpc);
    }

    #[tokio::test]
    async fn test_graceful_stop() {
        let served = Served::start().await;
        let http = served.http();
        served.stop().await.unwrap();

        let client = HttpClient::new(&http).unwrap();
        assert!(client.send(&shirt()).await.is_err());
    }
}
