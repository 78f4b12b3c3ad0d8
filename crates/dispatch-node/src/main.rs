//! # Dispatch Node
//!
//! Runs the dispatcher with the sample `product` department.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging (`RUST_LOG`, default `info`; JSON lines when
//!    `DISPATCH_LOG_JSON=true`)
//! 2. Load configuration from `DISPATCH_*` environment variables
//! 3. Register departments
//! 4. Serve HTTP, line stream and gRPC until Ctrl-C or until a server fails

mod product;

use anyhow::{anyhow, Context, Result};
use dispatch_core::Registry;
use dispatch_gateway::{DispatchService, GatewayConfig, GatewayError, ShutdownHandle};
use std::future::Future;
use std::io;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn init_logging() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json_logs = std::env::var("DISPATCH_LOG_JSON")
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false);

    if json_logs {
        // JSON output for containers/production
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .try_init()?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    info!("Starting dispatch node v{}", dispatch_gateway::VERSION);

    let config = GatewayConfig::from_env();

    let mut registry = Registry::new();
    product::register(&mut registry, product::ProductStore::default())
        .context("registering product department")?;

    let mut service = DispatchService::new(config, registry).context("building dispatch service")?;
    let addrs = service.bind().await.context("binding listeners")?;
    info!(
        http = %addrs.http,
        stream = ?addrs.stream,
        rpc = ?addrs.rpc,
        "Listeners bound"
    );

    let shutdown = service.shutdown_handle();
    let server = tokio::spawn(async move { service.start().await });

    run_until_stopped(server, shutdown, tokio::signal::ctrl_c()).await?;
    info!("Dispatch node stopped");
    Ok(())
}

/// Wait for `signal` or for the service to exit on its own, whichever comes
/// first. A service that stops without being asked is an error.
async fn run_until_stopped<S>(
    mut server: JoinHandle<Result<(), GatewayError>>,
    shutdown: ShutdownHandle,
    signal: S,
) -> Result<()>
where
    S: Future<Output = io::Result<()>>,
{
    tokio::select! {
        signalled = signal => {
            signalled.context("listening for shutdown signal")?;
            info!("Shutdown requested");
            shutdown.shutdown();
            match server.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    error!("Service stopped with error: {}", e);
                    Err(e.into())
                }
                Err(e) => Err(anyhow!("service task failed: {e}")),
            }
        }
        exited = &mut server => {
            let result = match exited {
                Ok(Ok(())) => Err(anyhow!("service exited unexpectedly")),
                Ok(Err(e)) => Err(anyhow::Error::new(e).context("service failed")),
                Err(e) => Err(anyhow!("service task failed: {e}")),
            };
            if let Err(e) = &result {
                error!("{:#}", e);
            }
            result
        }
    }
}
