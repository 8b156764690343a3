//! JPEG encoding of output tiles.
//!
//! Output pyramids are plane-separated, so each tile carries one channel
//! and is written as an 8-bit grayscale JPEG. Quality is a per-conversion
//! knob; out-of-range values are clamped rather than rejected so callers
//! never have to special-case it.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::error::TileError;

/// Default output JPEG quality.
pub const DEFAULT_JPEG_QUALITY: u8 = 89;

/// Lowest quality the encoder accepts.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Highest quality the encoder accepts.
pub const MAX_JPEG_QUALITY: u8 = 100;

/// Encodes single-channel tile planes to JPEG.
///
/// Stateless today; the struct leaves room for shared encoder settings
/// later without touching call sites.
#[derive(Debug, Clone, Default)]
pub struct JpegTileEncoder {}

impl JpegTileEncoder {
    pub fn new() -> Self {
        Self {}
    }

    /// Encode `width * height` row-major 8-bit samples as a grayscale
    /// JPEG at the given quality (clamped to 1-100).
    ///
    /// Fails when the buffer length disagrees with the dimensions or the
    /// underlying encoder reports an error.
    pub fn encode_gray(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
        quality: u8,
    ) -> Result<Bytes, TileError> {
        let expected = (width as usize) * (height as usize);
        if pixels.len() != expected {
            return Err(TileError::SizeMismatch {
                expected,
                actual: pixels.len(),
            });
        }

        let mut output = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut output, clamp_quality(quality));
        encoder
            .encode(pixels, width, height, ExtendedColorType::L8)
            .map_err(|e| TileError::EncodeError {
                message: e.to_string(),
            })?;

        Ok(Bytes::from(output))
    }
}

/// Pull a quality value into the encoder's accepted range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}
