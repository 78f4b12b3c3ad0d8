//! Bounded, lazily filled connection pools.
//!
//! Capacity is a [`Semaphore`]: a [`Lease`] holds one permit for as long as
//! it is borrowed. Connections are created on demand and only returned to
//! the idle list when the borrowing call succeeded.
//!
//! ```ignore
//! let pool = StreamClientPool::stream("127.0.0.1:9001", ClientConfig::default())?;
//! let reply = pool.send(&doc).await?;
//! ```

use crate::client::{RpcClient, StreamClient};
use crate::domain::config::ClientConfig;
use crate::domain::error::TransportError;
use async_trait::async_trait;
use dispatch_core::Document;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Opens new pooled connections.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: Send + 'static;

    async fn connect(&self) -> Result<Self::Connection, TransportError>;
}

struct PoolState<C> {
    idle: VecDeque<C>,
    closed: bool,
}

pub struct Pool<K: Connector> {
    connector: K,
    size: usize,
    permits: Arc<Semaphore>,
    state: Mutex<PoolState<K::Connection>>,
}

/// A borrowed connection. Dropping it discards the connection; hand it
/// back with [`Pool::release`] to keep it.
pub struct Lease<C> {
    conn: C,
    _permit: OwnedSemaphorePermit,
}

impl<C> Deref for Lease<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.conn
    }
}

impl<C> DerefMut for Lease<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.conn
    }
}

impl<K: Connector> Pool<K> {
    pub fn new(connector: K, size: usize) -> Result<Self, TransportError> {
        if size == 0 {
            return Err(TransportError::InvalidPoolSize);
        }
        Ok(Self {
            connector,
            size,
            permits: Arc::new(Semaphore::new(size)),
            state: Mutex::new(PoolState {
                idle: VecDeque::with_capacity(size),
                closed: false,
            }),
        })
    }

    /// Waits until a connection is idle or capacity allows a new one.
    pub async fn acquire(&self) -> Result<Lease<K::Connection>, TransportError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| TransportError::PoolClosed)?;

        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(TransportError::PoolClosed);
            }
            if let Some(conn) = state.idle.pop_front() {
                return Ok(Lease {
                    conn,
                    _permit: permit,
                });
            }
        }

        let conn = self.connector.connect().await?;
        debug!(size = self.size, "pool opened a connection");
        Ok(Lease {
            conn,
            _permit: permit,
        })
    }

    /// Return a lease. `ok == false` or a closed pool discards the connection.
    pub fn release(&self, lease: Lease<K::Connection>, ok: bool) {
        let Lease { conn, _permit } = lease;
        let mut state = self.state.lock();
        if ok && !state.closed && state.idle.len() < self.size {
            state.idle.push_back(conn);
        }
    }

    /// Drop idle connections and fail current and future waiters. Leases
    /// still out are discarded when released.
    pub fn close(&self) {
        let drained = {
            let mut state = self.state.lock();
            state.closed = true;
            std::mem::take(&mut state.idle)
        };
        self.permits.close();
        debug!(idle = drained.len(), "pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn idle(&self) -> usize {
        self.state.lock().idle.len()
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// Dials [`StreamClient`]s.
#[derive(Debug, Clone)]
pub struct StreamConnector {
    address: String,
    config: ClientConfig,
}

#[async_trait]
impl Connector for StreamConnector {
    type Connection = StreamClient;

    async fn connect(&self) -> Result<StreamClient, TransportError> {
        StreamClient::connect(&self.address, &self.config).await
    }
}

/// Dials [`RpcClient`]s.
#[derive(Debug, Clone)]
pub struct RpcConnector {
    address: String,
    config: ClientConfig,
}

#[async_trait]
impl Connector for RpcConnector {
    type Connection = RpcClient;

    async fn connect(&self) -> Result<RpcClient, TransportError> {
        RpcClient::connect(&self.address, &self.config).await
    }
}

pub type StreamClientPool = Pool<StreamConnector>;
pub type RpcClientPool = Pool<RpcConnector>;

impl Pool<StreamConnector> {
    /// Pool of `config.pool_size` stream connections to `address`.
    pub fn stream(address: impl Into<String>, config: ClientConfig) -> Result<Self, TransportError> {
        let size = config.pool_size;
        Self::new(
            StreamConnector {
                address: address.into(),
                config,
            },
            size,
        )
    }

    /// Send on a pooled connection. Any error, remote ones included,
    /// discards that connection.
    pub async fn send(&self, doc: &Document) -> Result<Document, TransportError> {
        let mut lease = self.acquire().await?;
        let result = lease.send(doc).await;
        self.release(lease, result.is_ok());
        result
    }
}

impl Pool<RpcConnector> {
    /// Pool of `config.pool_size` gRPC channels to `address`.
    pub fn rpc(address: impl Into<String>, config: ClientConfig) -> Result<Self, TransportError> {
        let size = config.pool_size;
        Self::new(
            RpcConnector {
                address: address.into(),
                config,
            },
            size,
        )
    }

    pub async fn execute(&self, doc: Document) -> Result<Document, TransportError> {
        let mut lease = self.acquire().await?;
        let result = lease.execute(doc).await;
        self.release(lease, result.is_ok());
        result
    }
}
