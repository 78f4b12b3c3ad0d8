// Allow missing docs for internal items in development
#![allow(missing_docs)]

//! Dispatch Gateway - transports in front of the dispatch engine.
//!
//! Three servers decode requests into documents, hand them to one shared
//! [`DispatchEngine`](dispatch_core::DispatchEngine) and encode whatever
//! document comes back.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        DISPATCH GATEWAY                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌──────────────┐   ┌───────────────────────┐  │
//! │  │    HTTP     │   │  Line stream │   │  gRPC (JSON codec)    │  │
//! │  │   Port P    │   │   Port P+1   │   │       Port P+2        │  │
//! │  └──────┬──────┘   └──────┬───────┘   └───────────┬───────────┘  │
//! │  OriginGuard → CORS       │                       │              │
//! │  → Tracing → BodyLimit    │                       │              │
//! │         │                 │                       │              │
//! │  ┌──────┴─────────────────┴───────────────────────┴──────────┐   │
//! │  │                     DispatchEngine                        │   │
//! │  │   match → validate → authorize → execute → chain          │   │
//! │  └───────────────────────────────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use dispatch_gateway::{DispatchService, GatewayConfig};
//!
//! let mut registry = Registry::new();
//! registry.register_transaction("product", "create", |_| ProductCreate::default())?;
//!
//! let mut service = DispatchService::new(GatewayConfig::from_env(), registry)?;
//! service.start().await?;
//! ```
//!
//! # Clients
//!
//! [`HttpClient`], [`StreamClient`] and [`RpcClient`] talk to the matching
//! servers; [`StreamClientPool`] and [`RpcClientPool`] bound how many
//! connections a caller keeps open.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod client;
pub mod domain;
pub mod grpc;
pub mod http;
pub mod middleware;
pub mod service;
pub mod stream;

// Re-exports for public API
pub use client::{
    HttpClient, Pool, RpcClient, RpcClientPool, RpcStream, ServiceRequest, StreamClient,
    StreamClientPool,
};
pub use domain::config::{ClientConfig, CorsConfig, GatewayConfig};
pub use domain::error::{GatewayError, TransportError};
pub use domain::ports::{derive_rpc_port, derive_stream_port};
pub use service::{BoundAddrs, DispatchService, ShutdownHandle};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
