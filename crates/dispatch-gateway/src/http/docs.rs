//! `GET /help`: the registered departments and their transaction shapes.

use super::HttpState;
use axum::{
    extract::{Query, State},
    http::header,
    response::{Html, IntoResponse, Response},
    Json,
};
use dispatch_core::{Registry, Schema};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt::Write;

pub const TOON_CONTENT_TYPE: &str = "text/toon; charset=utf-8";

#[derive(Debug, Default, Deserialize)]
pub struct DocsQuery {
    pub format: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocsFormat {
    Json,
    Toon,
    Html,
}

impl DocsFormat {
    fn parse(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("json") => DocsFormat::Json,
            Some("toon") => DocsFormat::Toon,
            _ => DocsFormat::Html,
        }
    }
}

pub async fn handle_docs(State(state): State<HttpState>, Query(query): Query<DocsQuery>) -> Response {
    let registry = state.engine().registry();
    match DocsFormat::parse(query.format.as_deref()) {
        DocsFormat::Json => Json(describe_json(registry)).into_response(),
        DocsFormat::Toon => (
            [(header::CONTENT_TYPE, TOON_CONTENT_TYPE)],
            describe_toon(registry),
        )
            .into_response(),
        DocsFormat::Html => Html(describe_html(registry)).into_response(),
    }
}

pub fn describe_json(registry: &Registry) -> Value {
    let departments: Vec<Value> = registry
        .departments()
        .iter()
        .map(|department| {
            let transactions: Vec<Value> = department
                .transactions()
                .iter()
                .map(|holder| {
                    json!({
                        "name": holder.name(),
                        "request": holder.request_schema().describe(),
                        "response": holder.response_schema().describe(),
                        "options": holder.options(),
                    })
                })
                .collect();
            json!({
                "name": department.name(),
                "slug": department.slug(),
                "transactions": transactions,
            })
        })
        .collect();

    json!({ "departments": departments })
}

/// Indented outline, one `key: value` per line.
pub fn describe_toon(registry: &Registry) -> String {
    let mut out = String::new();
    let departments = registry.departments();
    // Writing into a String cannot fail.
    let _ = writeln!(out, "departments[{}]:", departments.len());

    for department in departments {
        let _ = writeln!(out, "  - name: {}", department.name());
        let _ = writeln!(out, "    slug: {}", department.slug());
        let _ = writeln!(out, "    transactions[{}]:", department.transactions().len());

        for holder in department.transactions() {
            let _ = writeln!(out, "      - name: {}", holder.name());
            write_schema(&mut out, "request", holder.request_schema());
            write_schema(&mut out, "response", holder.response_schema());
            if holder.options().licence_required() {
                let _ = writeln!(out, "        licence: required");
            }
        }
    }

    out
}

fn write_schema(out: &mut String, label: &str, schema: &Schema) {
    let _ = writeln!(out, "        {label}[{}]:", schema.fields().len());
    for field in schema.fields() {
        let mut flags = Vec::new();
        if field.tag().is_required() {
            flags.push("require");
        }
        if field.tag().rejects_empty() {
            flags.push("not-empty");
        }
        let _ = write!(out, "          {}: {}", field.external_name(), field.kind().as_str());
        if !flags.is_empty() {
            let _ = write!(out, " ({})", flags.join(", "));
        }
        out.push('\n');
    }
}

pub fn describe_html(registry: &Registry) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Dispatcher</title></head>\n\
         <body>\n<h1>Dispatcher</h1>\n<pre>{}</pre>\n</body>\n</html>\n",
        escape_html(&describe_toon(registry))
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
