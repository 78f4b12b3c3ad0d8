//! Transaction contract and its type-erased registry entry.

use crate::context::DispatchContext;
use crate::document::{Document, Form, TransactionOptions};
use crate::errors::{DispatchError, TransactionError};
use crate::schema::Schema;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

/// A named unit of business logic.
///
/// A fresh instance is created for every invocation and owned by that call
/// alone. The form is validated against [`Transaction::request_schema`] and
/// then bound into `Request` before [`Transaction::transact`] runs.
#[async_trait]
pub trait Transaction: Send + 'static {
    type Request: DeserializeOwned + Send;
    type Response: Serialize + Send;

    fn request_schema() -> Schema;

    fn response_schema() -> Schema {
        Schema::default()
    }

    fn options() -> TransactionOptions {
        TransactionOptions::default()
    }

    /// Licence predicate, consulted only when `options()` requires a licence.
    fn licence_valid(_token: &str) -> bool {
        true
    }

    async fn transact(
        &mut self,
        request: Self::Request,
        ctx: &DispatchContext,
    ) -> Result<Self::Response, TransactionError>;
}

/// Handler instance bound to one inbound document.
#[async_trait]
pub(crate) trait Runnable: Send {
    async fn run(
        self: Box<Self>,
        form: Form,
        optional: bool,
        ctx: &DispatchContext,
    ) -> Result<Value, DispatchError>;
}

struct Bound<T>(T);

#[async_trait]
impl<T: Transaction> Runnable for Bound<T> {
    async fn run(
        self: Box<Self>,
        form: Form,
        optional: bool,
        ctx: &DispatchContext,
    ) -> Result<Value, DispatchError> {
        let Bound(mut transaction) = *self;

        let raw = if optional && form.is_empty() {
            Value::Null
        } else {
            Value::Object(form)
        };
        let request: T::Request =
            serde_json::from_value(raw).map_err(|e| DispatchError::Bind(e.to_string()))?;

        let response = transaction
            .transact(request, ctx)
            .await
            .map_err(|e| DispatchError::Handler(e.to_string()))?;

        serde_json::to_value(response).map_err(|e| DispatchError::Handler(e.to_string()))
    }
}

type Initializer = Arc<dyn Fn(&Document) -> Box<dyn Runnable> + Send + Sync>;
type LicenceValidator = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Registry entry. Immutable once registered.
#[derive(Clone)]
pub struct TransactionHolder {
    name: String,
    request: Schema,
    response: Schema,
    options: TransactionOptions,
    initializer: Initializer,
    licence_validator: LicenceValidator,
}

impl TransactionHolder {
    /// Captures `T`'s schemas, options and licence predicate; `init` builds
    /// the per-call instance from the inbound document.
    pub fn new<T, F>(name: impl Into<String>, init: F) -> Self
    where
        T: Transaction,
        F: Fn(&Document) -> T + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            request: T::request_schema(),
            response: T::response_schema(),
            options: T::options(),
            initializer: Arc::new(move |doc: &Document| {
                Box::new(Bound(init(doc))) as Box<dyn Runnable>
            }),
            licence_validator: Arc::new(T::licence_valid),
        }
    }

    /// Replaces the type-level licence predicate, e.g. with one backed by a
    /// token store.
    pub fn with_licence_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.licence_validator = Arc::new(validator);
        self
    }

    pub fn with_options(mut self, options: TransactionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn request_schema(&self) -> &Schema {
        &self.request
    }

    pub fn response_schema(&self) -> &Schema {
        &self.response
    }

    pub fn options(&self) -> &TransactionOptions {
        &self.options
    }

    pub fn licence_valid(&self, token: &str) -> bool {
        (self.licence_validator)(token)
    }

    /// Procedure output: request and response shapes.
    pub fn describe(&self) -> Value {
        json!({
            "request": self.request.describe(),
            "response": self.response.describe(),
        })
    }

    pub(crate) fn instantiate(&self, doc: &Document) -> Box<dyn Runnable> {
        (self.initializer)(doc)
    }
}

impl fmt::Debug for TransactionHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionHolder")
            .field("name", &self.name)
            .field("request", &self.request)
            .field("response", &self.response)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
