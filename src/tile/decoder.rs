//! Tile decoder for compressed slide tiles.
//!
//! This module turns the compressed payload of a single tile into RGB pixels.
//! The compression scheme comes from the level's TIFF Compression tag:
//!
//! - **JPEG (7)**: decoded with the `image` crate. JPEGTables merging has
//!   already happened at read time, so the stream is complete.
//! - **JPEG 2000 (33003, 33005)**: decoded with `jpeg2k`. Both the YCbCr and
//!   RGB variants decode to interleaved components.
//! - **Uncompressed (1)**: the payload is the raw pixel buffer, padded to the
//!   full tile size.
//!
//! Grayscale tiles are expanded to RGB and alpha channels are dropped, so
//! downstream code always works with 3-channel pixels.
//!
//! # Sparse Tiles
//!
//! SVS files omit tile data for regions the scanner skipped (zero byte count
//! in TileByteCounts). An empty payload decodes to a solid white tile, which
//! matches the slide background on brightfield scanners.

use image::{ImageReader, Rgb, RgbImage};
use std::io::Cursor;

use crate::error::TileError;
use crate::format::tiff::Compression;

// =============================================================================
// Decoding
// =============================================================================

/// Decode a tile payload into RGB pixels.
///
/// # Arguments
///
/// * `data` - Complete compressed payload (empty for sparse tiles)
/// * `compression` - Raw TIFF compression code for the level
/// * `samples_per_pixel` - Channel count, used for uncompressed payloads
/// * `width` - Nominal tile width in pixels
/// * `height` - Nominal tile height in pixels
///
/// # Returns
///
/// The decoded tile. For JPEG and JPEG 2000 the decoded stream determines the
/// dimensions; for uncompressed and sparse tiles the nominal size is used.
pub fn decode_tile(
    data: &[u8],
    compression: u16,
    samples_per_pixel: u16,
    width: u32,
    height: u32,
) -> Result<RgbImage, TileError> {
    if data.is_empty() {
        return Ok(white_tile(width, height));
    }

    match Compression::from_u16(compression) {
        Some(Compression::Jpeg) => decode_jpeg(data),
        Some(c) if c.is_jpeg2000() => decode_jpeg2000(data),
        Some(Compression::None) => decode_raw(data, samples_per_pixel, width, height),
        Some(other) => Err(TileError::UndecodableCompression(other.name().to_string())),
        None => Err(TileError::UndecodableCompression(format!(
            "unknown code {}",
            compression
        ))),
    }
}

/// Create a solid white tile.
///
/// Used for sparse tiles and for padding regions that fall outside the slide.
pub fn white_tile(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([255, 255, 255]))
}

/// Decode a complete JPEG stream to RGB.
fn decode_jpeg(data: &[u8]) -> Result<RgbImage, TileError> {
    let reader = ImageReader::with_format(Cursor::new(data), image::ImageFormat::Jpeg);

    let img = reader.decode().map_err(|e| TileError::DecodeError {
        message: e.to_string(),
    })?;

    Ok(img.to_rgb8())
}

/// Decode a JPEG 2000 codestream (raw J2K or JP2 container) to RGB.
fn decode_jpeg2000(data: &[u8]) -> Result<RgbImage, TileError> {
    let image = jpeg2k::Image::from_bytes(data).map_err(|e| TileError::DecodeError {
        message: e.to_string(),
    })?;

    let pixels = image.get_pixels(None).map_err(|e| TileError::DecodeError {
        message: e.to_string(),
    })?;

    rgb_from_image_data(pixels)
}

/// Convert decoded JPEG 2000 component data to an RGB image.
fn rgb_from_image_data(pixels: jpeg2k::ImageData) -> Result<RgbImage, TileError> {
    let jpeg2k::ImageData {
        width,
        height,
        format,
        data,
    } = pixels;

    let pixel_count = (width as usize) * (height as usize);

    let rgb: Vec<u8> = match format {
        jpeg2k::ImageFormat::L8 => {
            check_len(data.len(), pixel_count)?;
            data.iter().flat_map(|&l| [l, l, l]).collect()
        }
        jpeg2k::ImageFormat::La8 => {
            check_len(data.len(), pixel_count * 2)?;
            data.chunks_exact(2).flat_map(|p| [p[0], p[0], p[0]]).collect()
        }
        jpeg2k::ImageFormat::Rgb8 => {
            check_len(data.len(), pixel_count * 3)?;
            data
        }
        jpeg2k::ImageFormat::Rgba8 => {
            check_len(data.len(), pixel_count * 4)?;
            data.chunks_exact(4).flat_map(|p| [p[0], p[1], p[2]]).collect()
        }
    };

    RgbImage::from_raw(width, height, rgb).ok_or(TileError::SizeMismatch {
        expected: pixel_count * 3,
        actual: 0,
    })
}

/// Reinterpret an uncompressed payload as pixels.
///
/// Uncompressed tiles are stored padded to the full tile size, so the payload
/// length must match exactly.
fn decode_raw(
    data: &[u8],
    samples_per_pixel: u16,
    width: u32,
    height: u32,
) -> Result<RgbImage, TileError> {
    let pixel_count = (width as usize) * (height as usize);

    match samples_per_pixel {
        1 => {
            check_len(data.len(), pixel_count)?;
            let rgb = data.iter().flat_map(|&l| [l, l, l]).collect();
            from_raw_rgb(width, height, rgb, pixel_count)
        }
        3 => {
            check_len(data.len(), pixel_count * 3)?;
            from_raw_rgb(width, height, data.to_vec(), pixel_count)
        }
        4 => {
            check_len(data.len(), pixel_count * 4)?;
            let rgb = data.chunks_exact(4).flat_map(|p| [p[0], p[1], p[2]]).collect();
            from_raw_rgb(width, height, rgb, pixel_count)
        }
        other => Err(TileError::DecodeError {
            message: format!("unsupported samples per pixel: {}", other),
        }),
    }
}

fn from_raw_rgb(
    width: u32,
    height: u32,
    rgb: Vec<u8>,
    pixel_count: usize,
) -> Result<RgbImage, TileError> {
    RgbImage::from_raw(width, height, rgb).ok_or(TileError::SizeMismatch {
        expected: pixel_count * 3,
        actual: 0,
    })
}

fn check_len(actual: usize, expected: usize) -> Result<(), TileError> {
    if actual != expected {
        return Err(TileError::SizeMismatch { expected, actual });
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
