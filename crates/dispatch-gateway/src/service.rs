//! Dispatch service: owns the engine and runs the HTTP, line-stream and
//! gRPC servers side by side.

use crate::domain::config::GatewayConfig;
use crate::domain::error::GatewayError;
use crate::{grpc, http, stream};
use dispatch_core::{DispatchEngine, Registry};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};

/// Addresses the servers actually listen on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundAddrs {
    pub http: SocketAddr,
    pub stream: Option<SocketAddr>,
    pub rpc: Option<SocketAddr>,
}

struct Listeners {
    http: TcpListener,
    stream: Option<TcpListener>,
    rpc: Option<TcpListener>,
}

/// Stops a running [`DispatchService`] from another task.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }
}

pub struct DispatchService {
    config: GatewayConfig,
    engine: Arc<DispatchEngine>,
    listeners: Option<Listeners>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl DispatchService {
    /// Validate `config`, seal `registry` and build the engine.
    pub fn new(config: GatewayConfig, mut registry: Registry) -> Result<Self, GatewayError> {
        config
            .validate()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        registry.seal();
        info!(transactions = registry.len(), "Registry sealed");

        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            config,
            engine: Arc::new(DispatchEngine::new(Arc::new(registry))),
            listeners: None,
            shutdown_tx: Arc::new(shutdown_tx),
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn engine(&self) -> Arc<DispatchEngine> {
        Arc::clone(&self.engine)
    }

    /// Bind every enabled listener without serving yet. Idempotent.
    pub async fn bind(&mut self) -> Result<BoundAddrs, GatewayError> {
        if self.listeners.is_none() {
            let config_err = |e: crate::domain::config::ConfigError| GatewayError::Config(e.to_string());

            let http = bind(self.config.http_addr()).await?;
            let stream = if self.config.stream.enabled {
                Some(bind(self.config.stream_addr().map_err(config_err)?).await?)
            } else {
                None
            };
            let rpc = if self.config.rpc.enabled {
                Some(bind(self.config.rpc_addr().map_err(config_err)?).await?)
            } else {
                None
            };
            self.listeners = Some(Listeners { http, stream, rpc });
        }

        self.bound_addrs()
    }

    fn bound_addrs(&self) -> Result<BoundAddrs, GatewayError> {
        let Some(listeners) = &self.listeners else {
            return Err(GatewayError::Serve("listeners are not bound".into()));
        };
        let local = |listener: &TcpListener| {
            listener
                .local_addr()
                .map_err(|e| GatewayError::Serve(e.to_string()))
        };
        Ok(BoundAddrs {
            http: local(&listeners.http)?,
            stream: listeners.stream.as_ref().map(local).transpose()?,
            rpc: listeners.rpc.as_ref().map(local).transpose()?,
        })
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Serve until shutdown is requested or a server stops on its own.
    pub async fn start(&mut self) -> Result<(), GatewayError> {
        info!("Starting dispatch service...");
        let addrs = self.bind().await?;
        let Some(listeners) = self.listeners.take() else {
            return Err(GatewayError::Serve("listeners are not bound".into()));
        };

        let mut servers = JoinSet::new();

        let router = http::build_router(Arc::clone(&self.engine), &self.config);
        let signal = self.shutdown_signal();
        info!(addr = %addrs.http, "Starting HTTP server");
        servers.spawn(async move {
            let result = axum::serve(listeners.http, router)
                .with_graceful_shutdown(signal)
                .await
                .map_err(|e| GatewayError::Serve(format!("http: {e}")));
            ("http", result)
        });

        if let Some(listener) = listeners.stream {
            let engine = Arc::clone(&self.engine);
            let max_line_length = self.config.stream.max_line_length;
            let signal = self.shutdown_signal();
            servers.spawn(async move {
                ("stream", stream::serve(listener, engine, max_line_length, signal).await)
            });
        }

        if let Some(listener) = listeners.rpc {
            let engine = Arc::clone(&self.engine);
            let max_message_size = self.config.rpc.max_message_size;
            let signal = self.shutdown_signal();
            servers.spawn(async move {
                ("rpc", grpc::serve(listener, engine, max_message_size, signal).await)
            });
        }

        info!("Dispatch service started successfully");

        let mut failure = None;
        tokio::select! {
            _ = self.shutdown_signal() => {
                info!("Received shutdown signal");
            }
            Some(joined) = servers.join_next() => {
                failure = server_failure(joined);
            }
        }

        // Stop the remaining servers and wait for them to drain.
        self.shutdown();
        while let Some(joined) = servers.join_next().await {
            if let Some(e) = server_failure(joined) {
                failure.get_or_insert(e);
            }
        }

        info!("Dispatch service stopped");
        failure.map_or(Ok(()), Err)
    }

    fn shutdown_signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.shutdown_tx.subscribe();
        async move {
            let _ = rx.wait_for(|stop| *stop).await;
        }
    }
}

async fn bind(addr: SocketAddr) -> Result<TcpListener, GatewayError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| GatewayError::Bind { addr, source })
}

fn server_failure(
    joined: Result<(&'static str, Result<(), GatewayError>), tokio::task::JoinError>,
) -> Option<GatewayError> {
    match joined {
        Ok((_, Ok(()))) => None,
        Ok((name, Err(e))) => {
            error!(server = name, error = %e, "server error");
            Some(e)
        }
        Err(e) => {
            error!(error = %e, "server task failed");
            Some(GatewayError::Serve(e.to_string()))
        }
    }
}
