//! gRPC transport: a hand-written `dispatcher.Dispatcher` service whose
//! frames are JSON documents.

pub mod codec;
pub mod server;

pub use codec::{DocumentCodec, Inbound, ServerCodec};
pub use server::{serve, DispatcherServer};

pub const SERVICE_NAME: &str = "dispatcher.Dispatcher";
pub const EXECUTE_PATH: &str = "/dispatcher.Dispatcher/Execute";
pub const STREAM_PATH: &str = "/dispatcher.Dispatcher/Stream";
