//! Session outcomes: the response line sent to the client and the token
//! written to the audit log for every finished or aborted transfer.

use std::fmt;

/// Terminal status of a session that got past the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Both transforms succeeded. Carries the equalized output path.
    BothOk { equalized: String },
    ClassifyOkHistogramError,
    /// Classification failed, equalization succeeded.
    ClassifyErrorHistogramOk { equalized: String },
    BothError,
    /// The payload never arrived in full; nothing was processed.
    TransferError,
}

impl SessionStatus {
    /// Combine the two independent transform results.
    pub fn from_transforms(classified: bool, equalized: Option<String>) -> Self {
        match (classified, equalized) {
            (true, Some(equalized)) => SessionStatus::BothOk { equalized },
            (true, None) => SessionStatus::ClassifyOkHistogramError,
            (false, Some(equalized)) => SessionStatus::ClassifyErrorHistogramOk { equalized },
            (false, None) => SessionStatus::BothError,
        }
    }

    /// Stable audit-log token.
    pub fn token(&self) -> &'static str {
        match self {
            SessionStatus::BothOk { .. } => "BOTH OK",
            SessionStatus::ClassifyOkHistogramError => "CLASSIFY OK HISTOGRAM ERROR",
            SessionStatus::ClassifyErrorHistogramOk { .. } => "CLASSIFY ERROR HISTOGRAM OK",
            SessionStatus::BothError => "BOTH ERROR",
            SessionStatus::TransferError => "TRANSFER ERROR",
        }
    }

    /// The exact text sent back on the connection.
    pub fn response_line(&self) -> String {
        match self {
            SessionStatus::BothOk { equalized } => format!(
                "OK: Imagen clasificada y ecualizada exitosamente\nEcualizada: {equalized}\n"
            ),
            SessionStatus::ClassifyOkHistogramError => {
                "PARCIAL: Clasificación OK, Error en ecualización\n".to_string()
            }
            SessionStatus::ClassifyErrorHistogramOk { equalized } => {
                format!("PARCIAL: Error clasificación, Ecualización OK: {equalized}\n")
            }
            SessionStatus::BothError => "ERROR: Falló clasificación y ecualización\n".to_string(),
            SessionStatus::TransferError => "ERROR: Transfer incompleto\n".to_string(),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}
