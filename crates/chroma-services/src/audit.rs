//! Append-only audit log. One line per session that reached the payload
//! phase, finished or aborted.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use chroma_core::SessionStatus;

/// Shared handle; clones append to the same file.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
    // Serializes appends so concurrent sessions never interleave lines.
    write_lock: Arc<Mutex<()>>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format_line(
        at: DateTime<Local>,
        peer: SocketAddr,
        file_name: &str,
        status: &SessionStatus,
    ) -> String {
        format!(
            "[{}] client={} file={} status={}\n",
            at.format("%a %b %e %H:%M:%S %Y"),
            peer.ip(),
            file_name,
            status.token()
        )
    }

    /// Append one entry. Failures are logged, never propagated: the audit
    /// trail must not take a session down.
    pub async fn record(&self, peer: SocketAddr, file_name: &str, status: &SessionStatus) {
        let line = Self::format_line(Local::now(), peer, file_name, status);
        let _guard = self.write_lock.lock().await;

        let result = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            file.write_all(line.as_bytes()).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                status = status.token(),
                "failed to append audit entry"
            );
        }
    }
}
