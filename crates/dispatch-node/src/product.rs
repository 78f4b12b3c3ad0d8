//! Sample `product` department backed by an in-memory store.

use dispatch_core::{
    async_trait, DispatchContext, FieldKind, Registry, RegistryError, Schema, Transaction,
    TransactionError,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub const DEPARTMENT: &str = "product";

pub type ProductStore = Arc<RwLock<BTreeMap<String, Product>>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: String,
}

fn product_schema() -> Schema {
    Schema::builder()
        .field("id", FieldKind::String, r#"json:"id""#)
        .field("name", FieldKind::String, r#"json:"name""#)
        .field("slug", FieldKind::String, r#"json:"slug""#)
        .field("description", FieldKind::String, r#"json:"description""#)
        .build()
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    pub counter: i64,
}

pub struct Create {
    store: ProductStore,
}

#[async_trait]
impl Transaction for Create {
    type Request = CreateRequest;
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
        product_schema()
    }

    async fn transact(
        &mut self,
        request: CreateRequest,
        _ctx: &DispatchContext,
    ) -> Result<Product, TransactionError> {
        let product = Product {
            id: Uuid::new_v4().to_string(),
            name: request.name,
            slug: request.slug,
            description: request.description,
        };
        self.store
            .write()
            .insert(product.id.clone(), product.clone());
        info!(id = %product.id, counter = request.counter, "product created");
        Ok(product)
    }
}

#[derive(Debug, Deserialize)]
pub struct GetRequest {
    pub id: String,
}

pub struct Get {
    store: ProductStore,
}

#[async_trait]
impl Transaction for Get {
    type Request = GetRequest;
    type Response = Product;

    fn request_schema() -> Schema {
        Schema::builder()
            .field("id", FieldKind::String, r#"json:"id" require:"true" isEmpty:"false""#)
            .build()
    }

    fn response_schema() -> Schema {
        product_schema()
    }

    async fn transact(
        &mut self,
        request: GetRequest,
        _ctx: &DispatchContext,
    ) -> Result<Product, TransactionError> {
        self.store
            .read()
            .get(&request.id)
            .cloned()
            .ok_or_else(|| TransactionError::new(format!("product {} not found", request.id)))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListRequest {
    #[serde(default)]
    pub slug_prefix: String,
}

/// Lists products; the whole request may be omitted.
pub struct List {
    store: ProductStore,
}

#[async_trait]
impl Transaction for List {
    type Request = Option<ListRequest>;
    type Response = Vec<Product>;

    fn request_schema() -> Schema {
        Schema::builder()
            .field("slug_prefix", FieldKind::String, r#"json:"slug_prefix""#)
            .optional()
            .build()
    }

    async fn transact(
        &mut self,
        request: Option<ListRequest>,
        _ctx: &DispatchContext,
    ) -> Result<Vec<Product>, TransactionError> {
        let request = request.unwrap_or_default();
        Ok(self
            .store
            .read()
            .values()
            .filter(|p| p.slug.starts_with(&request.slug_prefix))
            .cloned()
            .collect())
    }
}

/// Register `create`, `get` and `list` under [`DEPARTMENT`].
pub fn register(registry: &mut Registry, store: ProductStore) -> Result<(), RegistryError> {
    let create_store = Arc::clone(&store);
    registry.register_transaction(DEPARTMENT, "create", move |_| Create {
        store: Arc::clone(&create_store),
    })?;

    let get_store = Arc::clone(&store);
    registry.register_transaction(DEPARTMENT, "get", move |_| Get {
        store: Arc::clone(&get_store),
    })?;

    registry.register_transaction(DEPARTMENT, "list", move |_| List {
        store: Arc::clone(&store),
    })
}
