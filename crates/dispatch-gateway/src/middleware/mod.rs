//! HTTP middleware stack.
//!
//! Layer order: Request → OriginGuard → CORS → Tracing → BodyLimit → Handler

pub mod cors;
pub mod tracing;

pub use cors::{create_cors_layer, OriginGuardLayer};
pub use tracing::TracingLayer;
