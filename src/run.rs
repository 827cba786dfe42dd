// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level bootstrap — shared by `main` and integration tests.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::broker::Broker;
use crate::config::Config;
use crate::container::{ContainerSpec, DockerSupervisor};
use crate::{build_router, shutdown};

/// Initialize tracing from config. Uses `try_init` so it's safe to call
/// more than once (e.g. from tests).
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    let filter = if std::env::var("RUST_LOG").is_err() {
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    };

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// Run the broker to completion: bind, serve, and block until shutdown.
pub async fn run(config: Config) -> anyhow::Result<()> {
    init_tracing(&config);
    config.validate()?;

    let spec = ContainerSpec {
        image: config.container_image.clone(),
        shell_command: config.shell_command.clone(),
        memory_bytes: config.container_memory_bytes,
        nano_cpus: config.container_nano_cpus,
    };
    let supervisor = Arc::new(DockerSupervisor::connect(spec)?);

    let shutdown_grace = config.shutdown_grace();
    let broker = Broker::new(Arc::new(config.clone()), supervisor);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "termbroker listening");

    let router = build_router(Arc::clone(&broker));
    let shutdown_token = broker.shutdown.clone();
    let serve_task = tokio::spawn(async move {
        let result =
            axum::serve(listener, router).with_graceful_shutdown(shutdown_token.cancelled_owned()).await;
        if let Err(err) = result {
            error!(%err, "http server error");
        }
    });

    spawn_signal_handler(broker.shutdown.clone());

    broker.shutdown.cancelled().await;
    shutdown::drain(&broker, shutdown_grace).await;
    let _ = serve_task.await;

    Ok(())
}

/// First SIGTERM/SIGINT triggers a graceful shutdown; a second forces exit
/// in case a stuck container is holding the drain open.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async { if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await } } => {
                info!("received SIGTERM");
            }
            _ = async { if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await } } => {
                info!("received SIGINT");
            }
        }
        shutdown.cancel();

        tokio::select! {
            _ = async { if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await } } => {
                info!("received SIGTERM again, forcing exit");
            }
            _ = async { if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await } } => {
                info!("received SIGINT again, forcing exit");
            }
        }
        std::process::exit(130);
    });
}
