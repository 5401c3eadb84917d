//! Histogram equalization over 8-bit intensities.
//!
//! The arithmetic mirrors a fixed numeric contract: luma in double
//! precision truncated to 8 bits, a single-precision cumulative
//! distribution, and a remap table built by truncating `cdf * 255`.
//! Golden outputs depend on all three.

use std::path::Path;

use crate::pixel::{Channels, OutputFormat, PixelBuffer, PixelError};

/// Luma weights for R, G, B.
pub const LUMA_WEIGHTS: [f64; 3] = [0.299, 0.587, 0.114];

/// Intensity counts over 256 bins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    counts: [u64; 256],
    total: u64,
}

impl Histogram {
    pub fn from_samples(samples: &[u8]) -> Self {
        let mut counts = [0u64; 256];
        for &s in samples {
            counts[s as usize] += 1;
        }
        Self {
            counts,
            total: samples.len() as u64,
        }
    }

    pub fn counts(&self) -> &[u64; 256] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Normalized cumulative distribution.
    pub fn cdf(&self) -> [f32; 256] {
        let mut cdf = [0f32; 256];
        if self.total == 0 {
            return cdf;
        }
        let total = self.total as f32;
        cdf[0] = self.counts[0] as f32 / total;
        for i in 1..256 {
            let p = (self.counts[i] as f32 / total) as f64;
            cdf[i] = (cdf[i - 1] as f64 + p) as f32;
        }
        cdf
    }

    /// `remap[i] = floor(cdf[i] * 255)`.
    pub fn remap_table(&self) -> [u8; 256] {
        let cdf = self.cdf();
        let mut table = [0u8; 256];
        for (slot, c) in table.iter_mut().zip(cdf) {
            *slot = (c * 255.0) as u8;
        }
        table
    }
}

/// Single-channel view of `buf`. Gray input is returned as-is.
pub fn to_grayscale(buf: &PixelBuffer) -> PixelBuffer {
    match buf.channels() {
        Channels::Gray => buf.clone(),
        Channels::Rgb => {
            let [wr, wg, wb] = LUMA_WEIGHTS;
            let gray = buf
                .samples()
                .chunks_exact(3)
                .map(|px| (wr * px[0] as f64 + wg * px[1] as f64 + wb * px[2] as f64) as u8)
                .collect();
            PixelBuffer::from_parts(buf.width(), buf.height(), Channels::Gray, gray)
        }
    }
}

/// Equalize `buf` into a grayscale buffer of the same dimensions.
pub fn equalize(buf: &PixelBuffer) -> PixelBuffer {
    let gray = to_grayscale(buf);
    let table = Histogram::from_samples(gray.samples()).remap_table();
    let (width, height) = (gray.width(), gray.height());
    let mut samples = gray.into_samples();
    for s in samples.iter_mut() {
        *s = table[*s as usize];
    }
    PixelBuffer::from_parts(width, height, Channels::Gray, samples)
}

#[derive(Debug, thiserror::Error)]
pub enum EqualizationError {
    #[error("cannot decode source image: {0}")]
    Decode(#[source] PixelError),

    #[error("cannot encode equalized image: {0}")]
    EncodeFailed(#[source] PixelError),

    #[error("equalization worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Decode `bytes`, equalize, and write the result to `output` in the format
/// its extension selects.
pub fn equalize_bytes(bytes: &[u8], output: &Path) -> Result<(), EqualizationError> {
    let buf = PixelBuffer::decode(bytes).map_err(EqualizationError::Decode)?;
    let equalized = equalize(&buf);
    equalized
        .save(output, OutputFormat::from_path(output))
        .map_err(EqualizationError::EncodeFailed)
}
