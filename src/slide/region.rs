//! Reading arbitrary pixel regions from pyramid levels.
//!
//! Tiled formats store pixels as a grid of independently compressed tiles,
//! and a requested region rarely lines up with that grid. The reader here
//! decodes every tile the region touches and copies the overlapping rows
//! into the output image. Requests may extend past the level edge; pixels
//! outside the level render white, matching the slide background.

use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::Serialize;

use crate::error::{ConvertError, TiffError, TileError};
use crate::tile::white_tile;

use super::open::Slide;

// =============================================================================
// Region
// =============================================================================

/// A rectangular pixel region within a single pyramid level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Region {
    /// Left edge in pixels
    pub x: u32,

    /// Top edge in pixels
    pub y: u32,

    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,
}

impl Region {
    /// Create a region from its top-left corner and size.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Region {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the region covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Clamp the region to the given image bounds.
    ///
    /// The corner moves inside the image first, then the size shrinks to
    /// whatever room remains. A region fully outside comes back empty.
    pub fn clamped(&self, max_width: u32, max_height: u32) -> Region {
        let x = self.x.min(max_width);
        let y = self.y.min(max_height);
        Region {
            x,
            y,
            width: self.width.min(max_width - x),
            height: self.height.min(max_height - y),
        }
    }

    /// Map the region onto a coarser level by dividing through the
    /// downsample factor, truncating toward zero.
    pub fn scaled(&self, downsample: f64) -> Region {
        Region {
            x: (self.x as f64 / downsample) as u32,
            y: (self.y as f64 / downsample) as u32,
            width: (self.width as f64 / downsample) as u32,
            height: (self.height as f64 / downsample) as u32,
        }
    }
}

// =============================================================================
// Region Reading
// =============================================================================

/// Read a pixel region from one pyramid level.
///
/// `region` is in the coordinate space of `level`. Parts of the region
/// outside the level stay white; a zero-sized region produces an empty
/// image.
pub async fn read_region(
    slide: &Slide,
    level: usize,
    region: Region,
) -> Result<RgbImage, ConvertError> {
    let info = slide
        .level_info(level)
        .ok_or_else(|| TiffError::InvalidTagValue {
            tag: "level",
            message: format!("level {} out of range", level),
        })?;

    if region.is_empty() {
        return Ok(RgbImage::new(region.width, region.height));
    }

    let mut out = white_tile(region.width, region.height);

    // Clip the request to the level bounds
    let x_end = (region.x as u64 + region.width as u64).min(info.width as u64) as u32;
    let y_end = (region.y as u64 + region.height as u64).min(info.height as u64) as u32;
    if region.x >= x_end || region.y >= y_end {
        return Ok(out);
    }

    let tile_x0 = region.x / info.tile_width;
    let tile_x1 = (x_end - 1) / info.tile_width;
    let tile_y0 = region.y / info.tile_height;
    let tile_y1 = (y_end - 1) / info.tile_height;

    let dst_stride = region.width as usize * 3;

    for tile_y in tile_y0..=tile_y1 {
        for tile_x in tile_x0..=tile_x1 {
            let tile = slide.decoded_tile(level, tile_x, tile_y).await?;

            // Intersection of this tile with the clipped request, in level
            // coordinates. Tiles are decoded at full grid size, but guard
            // with the actual image dimensions anyway.
            let left = tile_x * info.tile_width;
            let top = tile_y * info.tile_height;
            let ix0 = region.x.max(left);
            let iy0 = region.y.max(top);
            let ix1 = x_end.min(left.saturating_add(tile.width()));
            let iy1 = y_end.min(top.saturating_add(tile.height()));
            if ix0 >= ix1 || iy0 >= iy1 {
                continue;
            }

            let src = tile.as_raw();
            let src_stride = tile.width() as usize * 3;
            let row_bytes = (ix1 - ix0) as usize * 3;

            let dst: &mut [u8] = &mut out;
            for row in iy0..iy1 {
                let src_off = (row - top) as usize * src_stride + (ix0 - left) as usize * 3;
                let dst_off =
                    (row - region.y) as usize * dst_stride + (ix0 - region.x) as usize * 3;
                dst[dst_off..dst_off + row_bytes]
                    .copy_from_slice(&src[src_off..src_off + row_bytes]);
            }
        }
    }

    Ok(out)
}

/// Read a level 0 region and resize it to the requested output size.
///
/// The source level is the finest one whose downsample does not exceed
/// the factor the output size implies, so detail is resampled down rather
/// than interpolated up from a coarser level. Requests finer than the
/// base resolution fall back to level 0 and upscale. Resizing uses a
/// triangle filter.
pub async fn read_region_scaled(
    slide: &Slide,
    region: Region,
    out_width: u32,
    out_height: u32,
) -> Result<RgbImage, ConvertError> {
    if out_width == 0 || out_height == 0 || region.is_empty() {
        return Ok(RgbImage::new(out_width, out_height));
    }

    let downsample = region.width as f64 / out_width as f64;
    let level = slide.best_level_for_downsample(downsample).unwrap_or(0);
    let level_downsample = slide.level_downsample(level).unwrap_or(1.0);

    let mut mapped = region.scaled(level_downsample);
    mapped.width = mapped.width.max(1);
    mapped.height = mapped.height.max(1);

    let image = read_region(slide, level, mapped).await?;
    if (mapped.width, mapped.height) == (out_width, out_height) {
        return Ok(image);
    }

    // Resizing large bands is CPU-heavy, keep it off the async threads
    let resized = tokio::task::spawn_blocking(move || {
        imageops::resize(&image, out_width, out_height, FilterType::Triangle)
    })
    .await
    .map_err(|e| TileError::DecodeError {
        message: format!("resize task failed: {}", e),
    })?;

    Ok(resized)
}

// =============================================================================
// Tests
// =============================================================================
