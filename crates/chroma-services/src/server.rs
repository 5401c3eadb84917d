//! Accept loop. One spawned task per connection; sessions share nothing
//! but the storage areas and the audit log.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::transfer::{SessionContext, TransferSession};

/// Accept connections until `shutdown` fires. Sessions already running are
/// left to finish on their own.
pub async fn serve(
    listener: TcpListener,
    ctx: Arc<SessionContext>,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let local = listener.local_addr()?;
    tracing::info!(addr = %local, "accepting image transfers");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!(addr = %local, "listener stopping");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        // Peer-side failures; the listener stays up.
                        tracing::warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!(peer = %peer, error = %e, "TCP_NODELAY");
                }
                tracing::debug!(peer = %peer, "connection accepted");

                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let report = TransferSession::new(stream, peer, ctx).run().await;
                    tracing::debug!(
                        peer = %peer,
                        state = ?report.state,
                        status = ?report.status.as_ref().map(|s| s.token()),
                        "connection closed"
                    );
                });
            }
        }
    }
}
