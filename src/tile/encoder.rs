//! Tile image encoder.
//!
//! Rendered tiles are RGBA. PNG keeps the alpha channel; JPEG has none, so
//! the image is composited over white before encoding.

use std::fmt;
use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ImageEncoder, RgbImage, RgbaImage};

use crate::error::TileError;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// Tile Format
// =============================================================================

/// Output format, chosen by the request's file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TileFormat {
    #[default]
    Png,
    Jpeg,
}

impl TileFormat {
    /// Parse a file extension (`png`, `jpg`, `jpeg`), case-insensitively.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(TileFormat::Png),
            "jpg" | "jpeg" => Some(TileFormat::Jpeg),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            TileFormat::Png => "image/png",
            TileFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            TileFormat::Png => "png",
            TileFormat::Jpeg => "jpg",
        }
    }
}

impl fmt::Display for TileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

// =============================================================================
// Encoder
// =============================================================================

/// Encodes rendered tiles into PNG or JPEG bytes.
///
/// # Example
///
/// ```
/// use image::RgbaImage;
/// use tile_pool::tile::{TileEncoder, TileFormat};
///
/// let encoder = TileEncoder::new(85);
/// let png = encoder.encode(&RgbaImage::new(4, 4), TileFormat::Png).unwrap();
/// assert_eq!(&png[1..4], b"PNG");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TileEncoder {
    jpeg_quality: u8,
}

impl Default for TileEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl TileEncoder {
    /// Create an encoder. Quality is clamped to 1-100.
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: clamp_quality(jpeg_quality),
        }
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    pub fn encode(&self, image: &RgbaImage, format: TileFormat) -> Result<Bytes, TileError> {
        match format {
            TileFormat::Png => self.encode_png(image),
            TileFormat::Jpeg => self.encode_jpeg(image),
        }
    }

    fn encode_png(&self, image: &RgbaImage) -> Result<Bytes, TileError> {
        let mut output = Cursor::new(Vec::new());
        PngEncoder::new(&mut output)
            .write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ExtendedColorType::Rgba8,
            )
            .map_err(|e| TileError::Encode {
                message: e.to_string(),
            })?;
        Ok(Bytes::from(output.into_inner()))
    }

    fn encode_jpeg(&self, image: &RgbaImage) -> Result<Bytes, TileError> {
        let flattened = flatten_over_white(image);

        let mut output = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut output, self.jpeg_quality);
        encoder
            .encode_image(&flattened)
            .map_err(|e| TileError::Encode {
                message: e.to_string(),
            })?;

        Ok(Bytes::from(output))
    }
}

/// Composite an RGBA image over an opaque white background.
fn flatten_over_white(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let alpha = u16::from(a);
        let over = |c: u8| ((u16::from(c) * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        image::Rgb([over(r), over(g), over(b)])
    })
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Validate JPEG quality parameter.
///
/// Returns `true` if quality is in the valid range (1-100).
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

// =============================================================================
// Tests
// =============================================================================
