//! Dominant-color classification and the file move it drives.

use std::fmt;
use std::path::{Path, PathBuf};

use chroma_core::config::StorageConfig;

use crate::pixel::{Channels, PixelBuffer};

/// Label used when the upload cannot be decoded.
pub const FALLBACK_LABEL: Label = Label::Green;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Red,
    Green,
    Blue,
}

impl Label {
    pub fn as_str(self) -> &'static str {
        match self {
            Label::Red => "red",
            Label::Green => "green",
            Label::Blue => "blue",
        }
    }

    /// Destination area for files carrying this label.
    pub fn dir(self, storage: &StorageConfig) -> &Path {
        match self {
            Label::Red => &storage.red_dir,
            Label::Green => &storage.green_dir,
            Label::Blue => &storage.blue_dir,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-channel sample totals over a whole image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelSums {
    pub red: u64,
    pub green: u64,
    pub blue: u64,
}

impl ChannelSums {
    /// A gray sample counts toward all three channels.
    pub fn of(buf: &PixelBuffer) -> Self {
        let mut sums = ChannelSums::default();
        match buf.channels() {
            Channels::Rgb => {
                for px in buf.samples().chunks_exact(3) {
                    sums.red += px[0] as u64;
                    sums.green += px[1] as u64;
                    sums.blue += px[2] as u64;
                }
            }
            Channels::Gray => {
                let total: u64 = buf.samples().iter().map(|&s| s as u64).sum();
                sums.red = total;
                sums.green = total;
                sums.blue = total;
            }
        }
        sums
    }

    /// Ties resolve toward red, then green: the comparison order is part of
    /// the observable behavior.
    pub fn dominant(&self) -> Label {
        if self.red >= self.green && self.red >= self.blue {
            Label::Red
        } else if self.green >= self.red && self.green >= self.blue {
            Label::Green
        } else {
            Label::Blue
        }
    }
}

pub fn classify(buf: &PixelBuffer) -> Label {
    ChannelSums::of(buf).dominant()
}

/// Outcome of classifying an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Detected(Label),
    /// The bytes did not decode. Routed as `FALLBACK_LABEL`.
    Fallback,
}

impl Classification {
    pub fn label(self) -> Label {
        match self {
            Classification::Detected(label) => label,
            Classification::Fallback => FALLBACK_LABEL,
        }
    }

    pub fn is_fallback(self) -> bool {
        matches!(self, Classification::Fallback)
    }
}

/// Decode `bytes` as RGB and classify. Never fails.
pub fn classify_bytes(bytes: &[u8]) -> Classification {
    match PixelBuffer::decode_rgb(bytes) {
        Ok(buf) => Classification::Detected(classify(&buf)),
        Err(e) => {
            tracing::warn!(error = %e, fallback = %FALLBACK_LABEL, "classification decode failed");
            Classification::Fallback
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    #[error("failed to move {} to {}: {source}", .from.display(), .to.display())]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Move `source` into the area for `label`, keeping `file_name`.
/// The source is left untouched when the rename fails.
pub async fn relocate(
    source: &Path,
    file_name: &str,
    label: Label,
    storage: &StorageConfig,
) -> Result<PathBuf, ClassificationError> {
    let dest = label.dir(storage).join(file_name);
    tokio::fs::rename(source, &dest)
        .await
        .map_err(|e| ClassificationError::MoveFailed {
            from: source.to_path_buf(),
            to: dest.clone(),
            source: e,
        })?;
    Ok(dest)
}
