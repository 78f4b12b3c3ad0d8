//! Request tracing middleware.
//!
//! Every HTTP request runs inside a `dispatch_request` span carrying a fresh
//! request id, the `department/transaction` route taken from the path and,
//! when the caller sent a valid W3C `traceparent`, the remote trace ids.
//! The request id is echoed back in [`REQUEST_ID_HEADER`].

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    response::Response,
};
use dispatch_core::CorrelationId;
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::{field, info_span, Instrument, Span};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone, Default)]
pub struct TracingLayer;

impl TracingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for TracingLayer {
    type Service = TracingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TracingService { inner }
    }
}

#[derive(Clone)]
pub struct TracingService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for TracingService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();
        let request_id = CorrelationId::new().to_string();

        let span = info_span!(
            "dispatch_request",
            request_id = %request_id,
            http.method = %req.method(),
            route = %route_of(req.uri().path()),
            trace_id = field::Empty,
            parent_span_id = field::Empty,
            http.status_code = field::Empty,
            latency_ms = field::Empty,
        );
        if let Some(parent) = TraceParent::from_request(&req) {
            span.record("trace_id", parent.trace_id);
            span.record("parent_span_id", parent.span_id);
        }

        Box::pin(
            async move {
                let started = Instant::now();
                let mut response = inner.call(req).await?;

                let current = Span::current();
                current.record("http.status_code", response.status().as_u16());
                current.record("latency_ms", started.elapsed().as_millis() as u64);

                if let Ok(value) = HeaderValue::from_str(&request_id) {
                    response.headers_mut().insert(REQUEST_ID_HEADER, value);
                }
                Ok(response)
            }
            .instrument(span),
        )
    }
}

/// First two path segments, or `-` for anything shorter.
fn route_of(path: &str) -> String {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    match (segments.next(), segments.next()) {
        (Some(department), Some(transaction)) => format!("{department}/{transaction}"),
        _ => "-".to_string(),
    }
}

/// Ids from a W3C `traceparent` header: `version-trace_id-parent_id-flags`.
#[derive(Debug, PartialEq, Eq)]
struct TraceParent<'a> {
    trace_id: &'a str,
    span_id: &'a str,
}

impl<'a> TraceParent<'a> {
    fn from_request<B>(req: &'a Request<B>) -> Option<Self> {
        Self::parse(req.headers().get("traceparent")?.to_str().ok()?)
    }

    fn parse(value: &'a str) -> Option<Self> {
        let mut parts = value.trim().split('-');
        let (version, trace_id, span_id, flags) =
            (parts.next()?, parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }

        let hex = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit());
        let all_zero = |s: &str| s.bytes().all(|b| b == b'0');
        if !hex(version, 2) || !hex(flags, 2) || !hex(trace_id, 32) || !hex(span_id, 16) {
            return None;
        }
        if all_zero(trace_id) || all_zero(span_id) {
            return None;
        }

        Some(Self { trace_id, span_id })
    }
}
