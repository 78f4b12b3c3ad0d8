//! CORS middleware.
//!
//! Wrapper around tower-http CORS with gateway configuration, plus an
//! [`OriginGuardLayer`] that sits outside it to answer preflights with
//! `204 No Content` and, when configured, enforce same-origin requests.

use crate::domain::config::CorsConfig;
use axum::{
    body::Body,
    http::{header, HeaderName, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use dispatch_core::Document;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service};
use tower_http::cors::{Any, CorsLayer as TowerCorsLayer};
use tracing::debug;

pub const ORIGIN_NOT_ALLOWED: &str = "origin not allowed";

/// Create CORS layer from gateway config. A disabled config allows no
/// origin, so browsers keep their same-origin policy.
pub fn create_cors_layer(config: &CorsConfig) -> TowerCorsLayer {
    if !config.enabled {
        return TowerCorsLayer::new();
    }

    let mut cors = TowerCorsLayer::new();

    // Configure origins
    if config.allowed_origins.iter().any(|o| o == "*") {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Vec<_> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors = cors.allow_origin(origins);
    }

    // Configure methods
    let methods: Vec<Method> = config
        .allowed_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();
    cors = cors.allow_methods(methods);

    // Configure headers
    if config.allowed_headers.iter().any(|h| h == "*") {
        cors = cors.allow_headers(Any);
    } else {
        let headers: Vec<HeaderName> = config
            .allowed_headers
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();
        cors = cors.allow_headers(headers);
    }

    if !config.expose_headers.is_empty() {
        let expose: Vec<HeaderName> = config
            .expose_headers
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();
        cors = cors.expose_headers(expose);
    }

    cors = cors.max_age(Duration::from_secs(config.max_age));

    // Credentials cannot be combined with a wildcard origin.
    if config.allow_credentials && !config.allowed_origins.iter().any(|o| o == "*") {
        cors = cors.allow_credentials(true);
    }

    cors
}

/// Preflight status rewrite and optional same-origin check.
#[derive(Clone)]
pub struct OriginGuardLayer {
    config: Arc<CorsConfig>,
}

impl OriginGuardLayer {
    pub fn new(config: CorsConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl<S> Layer<S> for OriginGuardLayer {
    type Service = OriginGuardService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        OriginGuardService {
            inner,
            config: Arc::clone(&self.config),
        }
    }
}

#[derive(Clone)]
pub struct OriginGuardService<S> {
    inner: S,
    config: Arc<CorsConfig>,
}

impl<S> Service<Request<Body>> for OriginGuardService<S>
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

        if self.config.enabled && self.config.same_origin && !is_same_origin(&req) {
            debug!(
                origin = ?req.headers().get(header::ORIGIN),
                host = ?req.headers().get(header::HOST),
                "cross-origin request rejected"
            );
            return Box::pin(async move {
                Ok((
                    StatusCode::FORBIDDEN,
                    Json(Document::error(ORIGIN_NOT_ALLOWED)),
                )
                    .into_response())
            });
        }

        let preflight = is_preflight(&req);

        Box::pin(async move {
            let mut response = inner.call(req).await?;
            if preflight && response.status() == StatusCode::OK {
                *response.status_mut() = StatusCode::NO_CONTENT;
            }
            Ok(response)
        })
    }
}

fn is_preflight<B>(req: &Request<B>) -> bool {
    req.method() == Method::OPTIONS
        && req
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
}

/// Requests without an Origin header are not cross-origin.
fn is_same_origin<B>(req: &Request<B>) -> bool {
    let Some(origin) = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
    else {
        return true;
    };
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let origin_host = origin
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(origin)
        .trim_end_matches('/');

    !host.is_empty() && origin_host.eq_ignore_ascii_case(host)
}
