//! Pixel buffers: the decoded form both transforms operate on.
//!
//! Only two layouts exist: single-channel grayscale and interleaved RGB,
//! both 8 bits per sample. Decoded images in any other layout are
//! normalized into one of the two.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ColorType, DynamicImage, ExtendedColorType, ImageEncoder};

/// JPEG quality used for equalized output.
pub const JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channels {
    Gray,
    Rgb,
}

impl Channels {
    pub fn count(self) -> usize {
        match self {
            Channels::Gray => 1,
            Channels::Rgb => 3,
        }
    }

    fn color_type(self) -> ExtendedColorType {
        match self {
            Channels::Gray => ExtendedColorType::L8,
            Channels::Rgb => ExtendedColorType::Rgb8,
        }
    }
}

/// Row-major, channel-interleaved 8-bit samples.
///
/// `samples.len() == width * height * channels` holds for every value;
/// the checked constructors are the only public way in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    channels: Channels,
    samples: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(
        width: u32,
        height: u32,
        channels: Channels,
        samples: Vec<u8>,
    ) -> Result<Self, PixelError> {
        if width == 0 || height == 0 {
            return Err(PixelError::InvalidDimensions { width, height });
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(channels.count()))
            .ok_or(PixelError::InvalidDimensions { width, height })?;
        if samples.len() != expected {
            return Err(PixelError::LengthMismatch {
                expected,
                actual: samples.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            samples,
        })
    }

    /// For transforms that derive one buffer from another of known shape.
    pub(crate) fn from_parts(width: u32, height: u32, channels: Channels, samples: Vec<u8>) -> Self {
        debug_assert_eq!(
            samples.len(),
            width as usize * height as usize * channels.count()
        );
        Self {
            width,
            height,
            channels,
            samples,
        }
    }

    /// Every pixel set to `value`, which must hold one sample per channel.
    pub fn uniform(
        width: u32,
        height: u32,
        channels: Channels,
        value: &[u8],
    ) -> Result<Self, PixelError> {
        if value.len() != channels.count() {
            return Err(PixelError::LengthMismatch {
                expected: channels.count(),
                actual: value.len(),
            });
        }
        let pixels = width as usize * height as usize;
        Self::new(width, height, channels, value.repeat(pixels))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> Channels {
        self.channels
    }

    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<u8> {
        self.samples
    }

    /// Decode keeping grayscale images single-channel; everything else
    /// becomes RGB (alpha dropped, deeper samples scaled to 8 bits).
    pub fn decode(bytes: &[u8]) -> Result<Self, PixelError> {
        let img = image::load_from_memory(bytes).map_err(PixelError::Decode)?;
        match img.color() {
            ColorType::L8 | ColorType::La8 | ColorType::L16 | ColorType::La16 => {
                Self::from_luma(img)
            }
            _ => Self::from_rgb(img),
        }
    }

    /// Decode forcing three channels. Gray samples expand to R = G = B.
    pub fn decode_rgb(bytes: &[u8]) -> Result<Self, PixelError> {
        let img = image::load_from_memory(bytes).map_err(PixelError::Decode)?;
        Self::from_rgb(img)
    }

    fn from_luma(img: DynamicImage) -> Result<Self, PixelError> {
        let luma = img.into_luma8();
        let (width, height) = luma.dimensions();
        Self::new(width, height, Channels::Gray, luma.into_raw())
    }

    fn from_rgb(img: DynamicImage) -> Result<Self, PixelError> {
        let rgb = img.into_rgb8();
        let (width, height) = rgb.dimensions();
        Self::new(width, height, Channels::Rgb, rgb.into_raw())
    }

    /// Encode to `path` in `format`. A file left behind by a failed encode
    /// is removed.
    pub fn save(&self, path: &Path, format: OutputFormat) -> Result<(), PixelError> {
        let file = File::create(path).map_err(|source| PixelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let writer = BufWriter::new(file);
        let color = self.channels.color_type();

        let result = match format {
            OutputFormat::Png => {
                PngEncoder::new(writer).write_image(&self.samples, self.width, self.height, color)
            }
            OutputFormat::Jpeg => JpegEncoder::new_with_quality(writer, JPEG_QUALITY).write_image(
                &self.samples,
                self.width,
                self.height,
                color,
            ),
        };

        result.map_err(|e| {
            let _ = std::fs::remove_file(path);
            PixelError::Encode(e)
        })
    }
}

/// Encoded format for a written image, chosen by the destination's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
}

impl OutputFormat {
    /// `.png` → PNG, `.jpg`/`.jpeg` → JPEG, case-insensitive. Anything else,
    /// or no extension, falls back to PNG.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("jpg") | Some("jpeg") => OutputFormat::Jpeg,
            _ => OutputFormat::Png,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PixelError {
    #[error("invalid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("sample buffer holds {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("failed to create {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
