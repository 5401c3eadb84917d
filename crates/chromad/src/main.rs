//! chromad — image classification and equalization daemon.

use std::sync::Arc;

use anyhow::{Context, Result};

use chroma_core::config::ChromaConfig;
use chroma_services::{serve, SessionContext};

mod listener;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = ChromaConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = ChromaConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        ChromaConfig::default()
    });

    config
        .storage
        .ensure_dirs()
        .context("failed to prepare storage areas")?;
    tracing::info!(
        incoming = %config.storage.incoming_dir.display(),
        equalized = %config.storage.equalized_dir.display(),
        audit_log = %config.storage.audit_log.display(),
        "storage ready"
    );

    let listener = listener::bind(&config.network)?;
    tracing::info!(
        addr = %listener.local_addr()?,
        backlog = config.network.backlog,
        timeout_secs = config.network.frame_timeout_secs,
        "chromad starting"
    );

    let ctx = Arc::new(SessionContext::new(
        config.storage.clone(),
        config.network.frame_limits(),
    ));

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let serve_task = tokio::spawn(serve(listener, ctx, shutdown_tx.subscribe()));

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = serve_task         => match r {
            Ok(Ok(())) => tracing::info!("listener exited"),
            Ok(Err(e)) => tracing::error!(error = %e, "listener failed"),
            Err(e)     => tracing::error!(error = %e, "listener task panicked"),
        },
    }

    Ok(())
}
