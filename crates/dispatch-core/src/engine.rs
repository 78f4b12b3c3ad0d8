//! Dispatch engine.
//!
//! One document node moves through
//! `Matching -> Validating -> Authorizing -> Executing -> Chaining` and ends
//! as a Result, Procedure or Error document. Nested dispatchings run through
//! the same routine, so every transport gets identical chaining.
//!
//! ```text
//!   input ──► lookup ──miss──────────────────────────────► Error
//!               │
//!               ├─ Procedure ─► describe shapes ─┐
//!               │                                │ (nothing forwarded)
//!               └─► validate ─► licence ─► run ──┤
//!                       │          │        │    │ (output, remapped)
//!                       └──────────┴────────┴────┼──► Error
//!                                                ▼
//!                                  dispatchings, in order, stop at Error
//! ```

use crate::context::DispatchContext;
use crate::document::{ChainRequestOption, Document, DocumentType};
use crate::errors::DispatchError;
use crate::registry::Registry;
use crate::transaction::TransactionHolder;
use crate::validator::validate_form;
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct DispatchEngine {
    registry: Arc<Registry>,
}

impl DispatchEngine {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Runs `input` and its dispatchings to completion. Never fails: every
    /// error becomes an Error document.
    pub async fn dispatch(&self, input: Document, ctx: &DispatchContext) -> Document {
        self.run_node(input, ctx).await
    }

    /// Runs `input` under a fresh root context.
    pub async fn dispatch_root(&self, input: Document) -> Document {
        let ctx = DispatchContext::new();
        self.run_node(input, &ctx).await
    }

    /// Resolved holder for a document, used by adapters for response headers.
    pub fn resolve(&self, doc: &Document) -> Option<Arc<TransactionHolder>> {
        self.registry.lookup(&doc.department, &doc.transaction)
    }

    fn run_node<'a>(&'a self, input: Document, parent: &'a DispatchContext) -> BoxFuture<'a, Document> {
        async move {
            let mut ctx = parent.for_node(&input);
            let Document {
                department,
                transaction,
                doc_type,
                form,
                dispatchings,
                security,
                chain_request_option,
                ..
            } = input;

            let mut output = Document {
                department,
                transaction,
                form,
                security,
                ..Default::default()
            };

            let Some(holder) = self.registry.lookup(&output.department, &output.transaction) else {
                debug!(
                    department = %output.department,
                    transaction = %output.transaction,
                    request_id = %ctx.request_id(),
                    "no matching transaction"
                );
                return fail(output, DispatchError::NotFound);
            };

            let forwarded = if doc_type == Some(DocumentType::Procedure) {
                output.doc_type = Some(DocumentType::Procedure);
                output.output = Some(holder.describe());
                output.options = Some(holder.options().clone());
                None
            } else {
                match self.execute(&holder, &output, &mut ctx).await {
                    Ok(value) => {
                        output.doc_type = Some(DocumentType::Result);
                        output.output = Some(value.clone());
                        Some(remap(value, chain_request_option.as_ref()))
                    }
                    Err(e) => {
                        debug!(
                            department = %output.department,
                            transaction = %output.transaction,
                            request_id = %ctx.request_id(),
                            error = %e,
                            "dispatch failed"
                        );
                        return fail(output, e);
                    }
                }
            };

            let licence = output.licence().map(str::to_string);
            output.dispatchings = self
                .chain(dispatchings, forwarded, licence.as_deref(), &ctx)
                .await;
            output
        }
        .boxed()
    }

    async fn execute(
        &self,
        holder: &TransactionHolder,
        input: &Document,
        ctx: &mut DispatchContext,
    ) -> Result<Value, DispatchError> {
        validate_form(&input.form, holder.request_schema())?;

        if holder.options().licence_required() {
            let token = input.licence().ok_or(DispatchError::Authorization)?;
            if !holder.licence_valid(token) {
                return Err(DispatchError::Authorization);
            }
            ctx.authorize(token);
        }

        let runnable = holder.instantiate(input);
        runnable
            .run(input.form.clone(), holder.request_schema().is_optional(), ctx)
            .await
    }

    async fn chain(
        &self,
        children: Vec<Document>,
        forwarded: Option<Value>,
        licence: Option<&str>,
        ctx: &DispatchContext,
    ) -> Vec<Document> {
        let mut results = Vec::with_capacity(children.len());

        for mut child in children {
            if let Some(Value::Object(fields)) = &forwarded {
                for (key, value) in fields {
                    child.form.insert(key.clone(), value.clone());
                }
            }
            if child.licence().is_none() {
                if let Some(licence) = licence {
                    child = child.with_licence(licence);
                }
            }

            let result = self.run_node(child, ctx).await;
            let failed = result.is_error();
            results.push(result);
            if failed {
                break;
            }
        }

        results
    }
}

fn fail(mut output: Document, error: DispatchError) -> Document {
    output.doc_type = Some(DocumentType::Error);
    output.error = Some(error.to_string());
    output
}

/// Copies each present output field under its alias. The original key stays.
fn remap(value: Value, aliases: Option<&ChainRequestOption>) -> Value {
    match (value, aliases) {
        (Value::Object(mut fields), Some(aliases)) => {
            for (field, alias) in aliases {
                if let Some(v) = fields.get(field).cloned() {
                    fields.insert(alias.clone(), v);
                }
            }
            Value::Object(fields)
        }
        (value, _) => value,
    }
}
