//! # Dispatch Core
//!
//! Transport-independent half of the dispatcher: the [`Document`] envelope,
//! schema descriptions, the transaction registry and the [`DispatchEngine`].
//!
//! ## Design Principles
//!
//! - **One envelope**: every transport decodes into a [`Document`] and
//!   encodes the Document the engine returns.
//! - **Errors are documents**: decode, lookup, validation, licence and
//!   handler failures all end as a `type: "Error"` Document; nothing escapes
//!   [`DispatchEngine::dispatch`].
//! - **Explicit context**: the verify code travels in a [`DispatchContext`]
//!   argument, never in task-local state.
//!
//! ## Usage
//!
//! ```ignore
//! let mut registry = Registry::new();
//! registry.register_transaction("product", "create", |_| ProductCreate::default())?;
//! registry.seal();
//!
//! let engine = DispatchEngine::new(Arc::new(registry));
//! let reply = engine.dispatch(doc, &DispatchContext::from_document(&doc)).await;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod codec;
pub mod context;
pub mod correlation;
pub mod document;
pub mod engine;
pub mod errors;
pub mod registry;
pub mod schema;
pub mod transaction;
pub mod validator;

pub use context::DispatchContext;
pub use correlation::CorrelationId;
pub use document::{
    ChainRequestOption, Document, DocumentType, Form, Security, SecurityOptions,
    TransactionOptions,
};
pub use engine::DispatchEngine;
pub use errors::{DecodeError, DispatchError, FieldError, RegistryError, TransactionError};
pub use registry::{Department, Registry};
pub use schema::{FieldKind, FieldSpec, FieldTag, Schema, SchemaBuilder};
pub use transaction::{Transaction, TransactionHolder};
pub use validator::validate_form;

// Handlers implement `Transaction` with `#[async_trait]`.
pub use async_trait::async_trait;
