//! HTTP transport adapter.
//!
//! Every path reaches [`handle_dispatch`] except `GET /help`. The request
//! becomes a [`Document`] according to its content type:
//!
//! - `application/json`: the body is the document.
//! - `application/x-www-form-urlencoded` and `multipart/form-data`: the first
//!   two path segments name department and transaction, the fields form the
//!   form. Integers are coerced, repeated keys collapse into arrays.
//!
//! Anything else is answered with a fixed Error document and status 400.

pub mod docs;

use crate::domain::config::GatewayConfig;
use crate::middleware::{create_cors_layer, OriginGuardLayer, TracingLayer};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Form as UrlEncodedForm, Json, Router,
};
use dispatch_core::{codec, DecodeError, DispatchContext, DispatchEngine, Document, Form};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::{debug, warn};

pub const VERIFY_CODE_HEADER: &str = "x-verify-code";

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    engine: Arc<DispatchEngine>,
}

impl HttpState {
    pub fn new(engine: Arc<DispatchEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<DispatchEngine> {
        &self.engine
    }
}

/// Build the HTTP router with its middleware stack.
pub fn build_router(engine: Arc<DispatchEngine>, config: &GatewayConfig) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(OriginGuardLayer::new(config.cors.clone()))
        .layer(create_cors_layer(&config.cors))
        .layer(TracingLayer::new());

    Router::new()
        .route("/help", get(docs::handle_docs).fallback(handle_dispatch))
        .fallback(handle_dispatch)
        .layer(DefaultBodyLimit::max(config.http.max_body_size))
        .layer(middleware)
        .with_state(HttpState::new(engine))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentKind {
    Json,
    UrlEncoded,
    Multipart,
}

impl ContentKind {
    fn detect(headers: &HeaderMap) -> Option<Self> {
        let content_type = headers
            .get(header::CONTENT_TYPE)?
            .to_str()
            .ok()?
            .trim()
            .to_ascii_lowercase();

        if content_type.starts_with("application/json") {
            Some(ContentKind::Json)
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            Some(ContentKind::UrlEncoded)
        } else if content_type.starts_with("multipart/form-data") {
            Some(ContentKind::Multipart)
        } else {
            None
        }
    }
}

/// Single dispatch entry point.
pub async fn handle_dispatch(State(state): State<HttpState>, req: Request) -> Response {
    let Some(kind) = ContentKind::detect(req.headers()) else {
        debug!(content_type = ?req.headers().get(header::CONTENT_TYPE), "unsupported content type");
        return error_response(StatusCode::BAD_REQUEST, DecodeError::UnsupportedContent);
    };

    let licence = bearer_token(req.headers());
    let verify_code = header_str(req.headers(), VERIFY_CODE_HEADER);

    let decoded = match kind {
        ContentKind::Json => decode_json(req, &state).await,
        ContentKind::UrlEncoded => decode_url_encoded(req, &state).await,
        ContentKind::Multipart => decode_multipart(req, &state).await,
    };
    let mut doc = match decoded {
        Ok(doc) => doc,
        Err((status, e)) => return error_response(status, e),
    };
    apply_credentials(&mut doc, licence, verify_code);

    let holder = state.engine.resolve(&doc);
    let ctx = DispatchContext::from_document(&doc);
    let result = state.engine.dispatch(doc, &ctx).await;

    let status = if holder.is_some() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    let mut response = (status, Json(result)).into_response();

    if let Some(holder) = holder {
        for (key, value) in &holder.options().header {
            match (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    response.headers_mut().insert(name, value);
                }
                _ => warn!(header = %key, "declared response header is not valid HTTP"),
            }
        }
    }

    response
}

type DecodeResult = Result<Document, (StatusCode, DecodeError)>;

async fn decode_json(req: Request, state: &HttpState) -> DecodeResult {
    let body = Bytes::from_request(req, state)
        .await
        .map_err(|e| (e.status(), DecodeError::Malformed(e.body_text())))?;
    codec::decode(&body).map_err(|e| (StatusCode::BAD_REQUEST, e))
}

async fn decode_url_encoded(req: Request, state: &HttpState) -> DecodeResult {
    let (department, transaction) = route_from_path(req.uri().path())?;
    let UrlEncodedForm(pairs) = UrlEncodedForm::<Vec<(String, String)>>::from_request(req, state)
        .await
        .map_err(|e| (e.status(), DecodeError::Malformed(e.body_text())))?;

    Ok(Document::new(department, transaction).with_form(form_from_pairs(pairs)))
}

async fn decode_multipart(req: Request, state: &HttpState) -> DecodeResult {
    let (department, transaction) = route_from_path(req.uri().path())?;
    let mut multipart = Multipart::from_request(req, state)
        .await
        .map_err(|e| (e.status(), DecodeError::Malformed(e.body_text())))?;

    let mut pairs = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err((e.status(), DecodeError::Malformed(e.body_text()))),
        };
        // File parts are not part of the form.
        if field.file_name().is_some() {
            continue;
        }
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let value = field
            .text()
            .await
            .map_err(|e| (e.status(), DecodeError::Malformed(e.body_text())))?;
        pairs.push((name, value));
    }

    Ok(Document::new(department, transaction).with_form(form_from_pairs(pairs)))
}

fn route_from_path(path: &str) -> Result<(String, String), (StatusCode, DecodeError)> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    match (segments.next(), segments.next()) {
        (Some(department), Some(transaction)) => {
            Ok((department.to_string(), transaction.to_string()))
        }
        _ => Err((StatusCode::BAD_REQUEST, DecodeError::InvalidPath)),
    }
}

/// Integer-looking values become numbers; a key seen twice becomes an array.
fn form_from_pairs(pairs: Vec<(String, String)>) -> Form {
    let mut form = Form::new();
    for (key, raw) in pairs {
        let value = match raw.parse::<i64>() {
            Ok(n) => Value::from(n),
            Err(_) => Value::String(raw),
        };
        match form.get_mut(&key) {
            None => {
                form.insert(key, value);
            }
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        }
    }
    form
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = header_str(headers, header::AUTHORIZATION.as_str())?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

/// Header credentials fill the document only where it has none of its own.
fn apply_credentials(doc: &mut Document, licence: Option<String>, verify_code: Option<String>) {
    if doc.licence().is_none() {
        if let Some(licence) = licence {
            doc.security.get_or_insert_with(Default::default).licence = licence;
        }
    }
    if doc.verify_code().is_none() {
        if let Some(code) = verify_code {
            doc.security.get_or_insert_with(Default::default).verify_code = code;
        }
    }
}

fn error_response(status: StatusCode, error: DecodeError) -> Response {
    (status, Json(Document::error(error.to_string()))).into_response()
}
