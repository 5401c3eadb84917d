//! Transfer session: one accepted connection, from header to response.
//!
//! ```text
//! AwaitingHeader ──► ReceivingPayload ──► Processing ──► RespondingDone
//!        │                  │
//!        └──────► Aborted ◄─┘
//! ```
//!
//! Header failures close the connection without a response. Payload
//! failures delete the partial upload, answer with the transfer error line
//! and are audited. Once processing starts the session always completes:
//! both transforms are attempted and their results combined.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use chroma_core::config::StorageConfig;
use chroma_core::wire::{self, FrameLimits};
use chroma_core::SessionStatus;

use crate::audit::AuditLog;
use crate::classifier::{self, Classification, ClassificationError, Label};
use crate::equalizer::{self, EqualizationError};
use crate::naming::{display_name, equalized_file_name, safe_file_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingHeader,
    ReceivingPayload,
    Processing,
    RespondingDone,
    Aborted,
}

/// Everything a session needs besides its stream. Shared by all sessions.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub storage: StorageConfig,
    pub limits: FrameLimits,
    pub audit: AuditLog,
}

impl SessionContext {
    pub fn new(storage: StorageConfig, limits: FrameLimits) -> Self {
        let audit = AuditLog::new(storage.audit_log.clone());
        Self {
            storage,
            limits,
            audit,
        }
    }
}

/// What a finished session looked like from the outside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub state: SessionState,
    /// `None` when the session aborted before a name was accepted.
    pub status: Option<SessionStatus>,
    pub file_name: Option<String>,
}

pub struct TransferSession<S> {
    stream: S,
    peer: SocketAddr,
    ctx: Arc<SessionContext>,
    state: SessionState,
}

impl<S> TransferSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, peer: SocketAddr, ctx: Arc<SessionContext>) -> Self {
        Self {
            stream,
            peer,
            ctx,
            state: SessionState::AwaitingHeader,
        }
    }

    fn transition(&mut self, next: SessionState) {
        tracing::trace!(peer = %self.peer, from = ?self.state, to = ?next, "session state");
        self.state = next;
    }

    /// Drive the session to a terminal state.
    pub async fn run(mut self) -> SessionReport {
        let limits = self.ctx.limits;

        let header = match wire::read_header(&mut self.stream, &limits).await {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(peer = %self.peer, error = %e, "rejected frame header");
                return self.abort_silently();
            }
        };

        let name = match safe_file_name(&header.name) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(
                    peer = %self.peer,
                    name = %display_name(&header.name),
                    error = %e,
                    "rejected file name"
                );
                return self.abort_silently();
            }
        };

        self.transition(SessionState::ReceivingPayload);
        tracing::info!(
            peer = %self.peer,
            file = %name,
            bytes = header.declared_size,
            "receiving image"
        );

        let incoming = self.ctx.storage.incoming_dir.join(&name);
        match wire::receive_to_file(&mut self.stream, &incoming, header.declared_size, &limits).await
        {
            Ok(receipt) => tracing::debug!(
                peer = %self.peer,
                file = %name,
                bytes = receipt.bytes,
                digest = %hex::encode(receipt.digest),
                "payload stored"
            ),
            Err(e) => {
                tracing::warn!(peer = %self.peer, file = %name, error = %e, "transfer failed");
                let status = SessionStatus::TransferError;
                self.ctx.audit.record(self.peer, &name, &status).await;
                self.respond(&status).await;
                self.transition(SessionState::Aborted);
                return SessionReport {
                    state: self.state,
                    status: Some(status),
                    file_name: Some(name),
                };
            }
        }

        self.transition(SessionState::Processing);
        let status = process(&self.ctx.storage, &incoming, &name).await;

        self.ctx.audit.record(self.peer, &name, &status).await;
        self.respond(&status).await;
        self.transition(SessionState::RespondingDone);
        tracing::info!(peer = %self.peer, file = %name, status = %status, "session complete");

        SessionReport {
            state: self.state,
            status: Some(status),
            file_name: Some(name),
        }
    }

    fn abort_silently(mut self) -> SessionReport {
        self.transition(SessionState::Aborted);
        SessionReport {
            state: self.state,
            status: None,
            file_name: None,
        }
    }

    /// Best effort: a failed send is logged and the connection dropped.
    async fn respond(&mut self, status: &SessionStatus) {
        let line = status.response_line();
        if let Err(e) = wire::write_response(&mut self.stream, &line).await {
            tracing::warn!(peer = %self.peer, error = %e, "failed to send response");
            return;
        }
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!(peer = %self.peer, error = %e, "shutdown after response failed");
        }
    }
}

// ── Processing ────────────────────────────────────────────────────────────────

/// An upload loaded into memory once.
///
/// Both transforms decode from these bytes. `relocate` consumes the value,
/// so the move into a label area cannot happen before the transforms have
/// read the uploaded contents.
pub struct ReceivedImage {
    path: PathBuf,
    name: String,
    bytes: Bytes,
}

impl ReceivedImage {
    pub async fn load(path: &Path, name: &str) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(Self {
            path: path.to_path_buf(),
            name: name.to_string(),
            bytes: Bytes::from(bytes),
        })
    }

    /// Write the equalized copy into `dir`. Returns the output path.
    pub async fn equalize_into(&self, dir: &Path) -> Result<PathBuf, EqualizationError> {
        let output = dir.join(equalized_file_name(&self.name));
        let bytes = self.bytes.clone();
        let target = output.clone();
        tokio::task::spawn_blocking(move || equalizer::equalize_bytes(&bytes, &target)).await??;
        Ok(output)
    }

    pub async fn classify(&self) -> Classification {
        let bytes = self.bytes.clone();
        match tokio::task::spawn_blocking(move || classifier::classify_bytes(&bytes)).await {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "classification worker failed");
                Classification::Fallback
            }
        }
    }

    /// Move the upload into the area for `label`.
    pub async fn relocate(
        self,
        label: Label,
        storage: &StorageConfig,
    ) -> Result<PathBuf, ClassificationError> {
        classifier::relocate(&self.path, &self.name, label, storage).await
    }
}

/// Run both transforms on the stored upload and combine their results.
/// Equalization runs first; classification then moves the file.
pub async fn process(storage: &StorageConfig, path: &Path, name: &str) -> SessionStatus {
    let image = match ReceivedImage::load(path, name).await {
        Ok(image) => image,
        Err(e) => {
            tracing::error!(file = %name, error = %e, "cannot read stored upload");
            return SessionStatus::BothError;
        }
    };

    let equalized = match image.equalize_into(&storage.equalized_dir).await {
        Ok(out) => {
            tracing::info!(file = %name, output = %out.display(), "image equalized");
            Some(out.display().to_string())
        }
        Err(e) => {
            tracing::warn!(file = %name, error = %e, "equalization failed");
            None
        }
    };

    let classification = image.classify().await;
    let classified = match image.relocate(classification.label(), storage).await {
        Ok(dest) => {
            tracing::info!(
                file = %name,
                label = %classification.label(),
                fallback = classification.is_fallback(),
                dest = %dest.display(),
                "image classified"
            );
            true
        }
        Err(e) => {
            tracing::warn!(file = %name, error = %e, "classification failed");
            false
        }
    };

    SessionStatus::from_transforms(classified, equalized)
}
