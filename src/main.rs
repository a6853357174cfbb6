use std::sync::Arc;

use anyhow::Result;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod config;
mod controller;
mod error;
mod exclude;
mod k8s;
mod logging;
mod sampler;

use controller::Reconciler;
use k8s::Bootstrap;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging()?;

    let bootstrap = Bootstrap::load().map_err(|e| {
        error!(error = %e, "fatal: failed to bootstrap from the service-account mount, exiting");
        e
    })?;
    info!(pod = %bootstrap.pod_name, namespace = %bootstrap.namespace, "kondense started");

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_for_shutdown(shutdown.clone()));

    let reconciler = Reconciler::new(
        bootstrap.client,
        Arc::new(bootstrap.token),
        bootstrap.namespace,
        bootstrap.pod_name,
    );

    reconciler.run(shutdown).await?;

    info!("kondense stopped");
    Ok(())
}

/// Cancel `token` on SIGINT or SIGTERM, whichever arrives first.
async fn watch_for_shutdown(token: CancellationToken) {
    let mut terminate =
        signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }

    token.cancel();
}
