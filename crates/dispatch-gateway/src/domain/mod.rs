//! Domain types for the gateway: configuration, errors and port conventions.

pub mod config;
pub mod error;
pub mod ports;

// Re-exports for convenience
pub use config::{ClientConfig, CorsConfig, GatewayConfig};
pub use error::{GatewayError, TransportError};
pub use ports::{derive_rpc_port, derive_stream_port};
