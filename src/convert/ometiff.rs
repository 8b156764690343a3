//! WSI to pyramidal OME-TIFF conversion.
//!
//! Rewrites a slide as a plane-separated OME-TIFF: three grayscale pages
//! (one per RGB channel) with JPEG tiles, the reduced pyramid of each page
//! in its SubIFDs, and the OME-XML document in the first IFD.
//!
//! The source is processed one tile row at a time per output level, so
//! memory use is bounded by a single band regardless of slide size.
//! Reduced levels resample from the nearest finer source level rather
//! than from the full-resolution image.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use image::RgbImage;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{ConvertError, TileError};
use crate::ome::{build_ome_xml, OmeImageInfo, OmeTiffOptions, OmeTiffWriter, DEFAULT_TILE_SIZE};
use crate::slide::{read_region_scaled, Region, Slide};
use crate::tile::{JpegTileEncoder, DEFAULT_JPEG_QUALITY};

use super::crop::{resolve_crop, CropMode};

/// Output channel count; slides decode to RGB.
const CHANNELS: usize = 3;

/// Tunable parameters for OME-TIFF conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OmeTiffConvertOptions {
    /// Source region selection
    pub crop: CropMode,

    /// JPEG quality for output tiles (1-100)
    pub quality: u8,

    /// Output tile edge length in pixels
    pub tile_size: u32,
}

impl Default for OmeTiffConvertOptions {
    fn default() -> Self {
        Self {
            crop: CropMode::Full,
            quality: DEFAULT_JPEG_QUALITY,
            tile_size: DEFAULT_TILE_SIZE,
        }
    }
}

/// Convert a slide into a plane-separated pyramidal OME-TIFF.
///
/// `dest` is the output file path, created or truncated. The pyramid is
/// rebuilt from the crop region by halving until a level fits in one
/// tile, independent of the source pyramid layout.
///
/// Returns the output path.
///
/// # Errors
///
/// Fails on an empty explicit crop, on source read or decode errors, and
/// on output write errors.
pub async fn convert_to_ome_tiff(
    slide: &Slide,
    dest: &Path,
    options: &OmeTiffConvertOptions,
) -> Result<PathBuf, ConvertError> {
    let crop = resolve_crop(slide.info(), options.crop)?;

    let mut writer = OmeTiffWriter::create(
        dest,
        crop.width,
        crop.height,
        CHANNELS,
        OmeTiffOptions {
            quality: options.quality,
            tile_size: options.tile_size,
        },
    )?;
    let tile_size = writer.tile_size();
    let quality = writer.quality();

    info!(
        source = %slide.path().display(),
        output = %dest.display(),
        crop_x = crop.x,
        crop_y = crop.y,
        crop_width = crop.width,
        crop_height = crop.height,
        levels = writer.level_count(),
        "starting OME-TIFF conversion"
    );

    let levels: Vec<(u32, u32)> = (0..writer.level_count())
        .filter_map(|level| writer.level_dimensions(level))
        .collect();

    for (level, &(level_width, level_height)) in levels.iter().enumerate() {
        let tiles_x = level_width.div_ceil(tile_size) as usize;
        let scale_y = crop.height as f64 / level_height as f64;

        info!(level, width = level_width, height = level_height, "writing pyramid level");

        let mut row = 0u32;
        while row < level_height {
            let band_height = (level_height - row).min(tile_size);

            // Source rows covering this band, in level 0 coordinates
            let src_y0 = (row as f64 * scale_y).floor() as u32;
            let src_y1 = ((row + band_height) as f64 * scale_y)
                .ceil()
                .min(crop.height as f64) as u32;
            let source = Region::new(
                crop.x,
                crop.y + src_y0,
                crop.width,
                (src_y1 - src_y0).max(1),
            );

            let band = read_region_scaled(slide, source, level_width, band_height).await?;

            debug!(level, row, band_height, "encoding band");

            let tiles = tokio::task::spawn_blocking(move || {
                encode_band(&band, tile_size, tiles_x, quality)
            })
            .await
            .map_err(|e| TileError::EncodeError {
                message: format!("encode task failed: {}", e),
            })??;

            for (index, data) in tiles.iter().enumerate() {
                writer.write_tile(index / tiles_x, level, data)?;
            }

            row += band_height;
        }
    }

    let ome_xml = build_ome_xml(&OmeImageInfo::from_slide(
        slide.info(),
        crop.width,
        crop.height,
    ));
    let software = format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    let resolution = slide.info().mpp_x.zip(slide.info().mpp_y);
    writer.finish(&ome_xml, &software, resolution)?;

    info!(output = %dest.display(), "OME-TIFF conversion complete");

    Ok(dest.to_path_buf())
}

/// Split an RGB band into per-channel tile planes and JPEG-encode them.
///
/// The band is one tile row of an output level. Tiles come back in
/// channel-major order: all tiles of channel 0 left to right, then
/// channel 1, then channel 2. Tile area not covered by the band pads
/// white, matching the slide background.
fn encode_band(
    band: &RgbImage,
    tile_size: u32,
    tiles_x: usize,
    quality: u8,
) -> Result<Vec<Bytes>, TileError> {
    let edge = tile_size as usize;
    let band_width = band.width() as usize;
    let band_height = (band.height() as usize).min(edge);
    let samples = band.as_raw();
    let encoder = JpegTileEncoder::new();

    (0..CHANNELS * tiles_x)
        .into_par_iter()
        .map(|index| {
            let channel = index / tiles_x;
            let x0 = (index % tiles_x) * edge;
            let copy_width = band_width.saturating_sub(x0).min(edge);

            let mut plane = vec![0xFFu8; edge * edge];
            for y in 0..band_height {
                let src_row = (y * band_width + x0) * CHANNELS + channel;
                let dst_row = y * edge;
                for x in 0..copy_width {
                    plane[dst_row + x] = samples[src_row + x * CHANNELS];
                }
            }
            encoder.encode_gray(&plane, tile_size, tile_size, quality)
        })
        .collect()
}
