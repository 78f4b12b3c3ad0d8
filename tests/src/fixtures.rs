//! Shared fixtures: a `product` department, a licence-protected `secure`
//! department, and a fully served dispatcher on ephemeral ports.

use dispatch_core::{
    async_trait, CorrelationId, DispatchContext, DispatchEngine, FieldKind, Form, Registry,
    Schema, SecurityOptions, Transaction, TransactionError, TransactionOptions,
};
use dispatch_gateway::{BoundAddrs, DispatchService, GatewayConfig, GatewayError, ShutdownHandle};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub const VALID_LICENCE: &str = "letmein";

// =============================================================================
// PRODUCT DEPARTMENT
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateProduct {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    pub counter: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: String,
}

pub struct Create;

#[async_trait]
impl Transaction for Create {
    type Request = CreateProduct;
    type Response = Product;

    fn request_schema() -> Schema {
        Schema::builder()
            .field("name", FieldKind::String, r#"json:"name" require:"true" isEmpty:"false""#)
            .field("slug", FieldKind::String, r#"json:"slug" require:"true""#)
            .field("description", FieldKind::String, r#"json:"description""#)
            .field("counter", FieldKind::Number, r#"json:"counter" require:"true" isEmpty:"false""#)
            .build()
    }

    fn response_schema() -> Schema {
        Schema::builder()
            .field("id", FieldKind::String, r#"json:"id""#)
            .field("name", FieldKind::String, r#"json:"name""#)
            .field("slug", FieldKind::String, r#"json:"slug""#)
            .field("description", FieldKind::String, r#"json:"description""#)
            .build()
    }

    fn options() -> TransactionOptions {
        TransactionOptions {
            header: BTreeMap::from([("X-Department".to_string(), "product".to_string())]),
            ..Default::default()
        }
    }

    async fn transact(
        &mut self,
        request: CreateProduct,
        _ctx: &DispatchContext,
    ) -> Result<Product, TransactionError> {
        Ok(Product {
            id: CorrelationId::new().to_string(),
            name: request.name,
            slug: request.slug,
            description: request.description,
        })
    }
}

/// Returns its form unchanged. Side-effect free.
pub struct Echo;

#[async_trait]
impl Transaction for Echo {
    type Request = Form;
    type Response = Form;

    fn request_schema() -> Schema {
        Schema::default()
    }

    async fn transact(&mut self, form: Form, _ctx: &DispatchContext) -> Result<Form, TransactionError> {
        Ok(form)
    }
}

/// Always fails with `out of stock`.
pub struct Fail;

#[async_trait]
impl Transaction for Fail {
    type Request = Form;
    type Response = Value;

    fn request_schema() -> Schema {
        Schema::default()
    }

    async fn transact(&mut self, _: Form, _ctx: &DispatchContext) -> Result<Value, TransactionError> {
        Err(TransactionError::new("out of stock"))
    }
}

// =============================================================================
// SECURE DEPARTMENT
// =============================================================================

/// Reports the licence and verify code it ran with.
pub struct WhoAmI;

#[async_trait]
impl Transaction for WhoAmI {
    type Request = Form;
    type Response = Value;

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
        token == VALID_LICENCE
    }

    async fn transact(&mut self, _: Form, ctx: &DispatchContext) -> Result<Value, TransactionError> {
        Ok(serde_json::json!({
            "licence": ctx.licence(),
            "verify_code": ctx.verify_code(),
        }))
    }
}

// =============================================================================
// ASSEMBLY
// =============================================================================

pub fn registry() -> Registry {
    let mut registry = Registry::new();
    let registrations = [
        registry.register_transaction("product", "create", |_| Create),
        registry.register_transaction("product", "echo", |_| Echo),
        registry.register_transaction("product", "fail", |_| Fail),
        registry.register_transaction("secure", "whoami", |_| WhoAmI),
    ];
    for result in registrations {
        if let Err(e) = result {
            panic!("fixture registration failed: {e}");
        }
    }
    registry
}

pub fn engine() -> DispatchEngine {
    let mut registry = registry();
    registry.seal();
    DispatchEngine::new(Arc::new(registry))
}

/// Object literal to form; anything else is an empty form.
pub fn form(value: Value) -> Form {
    match value {
        Value::Object(form) => form,
        _ => Form::new(),
    }
}

/// A dispatcher serving the fixtures on ephemeral ports. Shuts down on drop.
pub struct Served {
    pub addrs: BoundAddrs,
    handle: ShutdownHandle,
    task: Option<JoinHandle<Result<(), GatewayError>>>,
}

impl Served {
    pub async fn start() -> Self {
        let mut config = GatewayConfig::default();
        config.http.host = Ipv4Addr::LOCALHOST.into();
        config.http.port = 0;

        let mut service = match DispatchService::new(config, registry()) {
            Ok(service) => service,
            Err(e) => panic!("service construction failed: {e}"),
        };
        let addrs = match service.bind().await {
            Ok(addrs) => addrs,
            Err(e) => panic!("bind failed: {e}"),
        };
        let handle = service.shutdown_handle();
        let task = tokio::spawn(async move { service.start().await });

        Self {
            addrs,
            handle,
            task: Some(task),
        }
    }

    pub fn http(&self) -> String {
        self.addrs.http.to_string()
    }

    pub fn stream(&self) -> String {
        self.addrs.stream.map(|a| a.to_string()).unwrap_or_default()
    }

    pub fn rpc(&self) -> String {
        self.addrs.rpc.map(|a| a.to_string()).unwrap_or_default()
    }

    /// Stop serving and wait for every server to drain.
    pub async fn stop(mut self) -> Result<(), GatewayError> {
        self.handle.shutdown();
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| GatewayError::Serve(e.to_string()))?,
            None => Ok(()),
        }
    }
}

impl Drop for Served {
    fn drop(&mut self) {
        self.handle.shutdown();
    }
}
