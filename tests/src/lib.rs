//! # Dispatcher Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Sample departments and a served instance
//! │
//! └── integration/
//!     ├── flows.rs      # Engine scenarios: create, validation, procedure, chaining
//!     └── transports.rs # The same documents over HTTP, line stream and gRPC
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p dispatch-tests
//!
//! # By category
//! cargo test -p dispatch-tests integration::flows::
//! cargo test -p dispatch-tests integration::transports::
//! ```

#![allow(dead_code)]

pub mod fixtures;
pub mod integration;
