//! Line-stream transport: newline-delimited JSON documents over plain TCP.

pub mod server;

pub use server::serve;
