//! Outbound clients for the three transports, plus connection pools.

pub mod http;
pub mod pool;
pub mod rpc;
pub mod stream;

pub use self::http::{HttpClient, ServiceRequest};
pub use pool::{Connector, Lease, Pool, RpcClientPool, RpcConnector, StreamClientPool, StreamConnector};
pub use rpc::{RpcClient, RpcStream};
pub use stream::StreamClient;
