//! WSI to pyramidal Zarr conversion.
//!
//! Copies every pyramid level of a slide into a Zarr v2 group, one
//! `uint8` YXC array per level, reading the source in horizontal bands so
//! memory use stays proportional to the band size rather than the level.
//!
//! The store layout matches what downstream analysis tooling expects:
//!
//! ```text
//! <output>/pyramid_0.zarr/
//!   .zgroup
//!   .zattrs          max_level, channel_names, mpp, extent, ...
//!   0/               level 0 array, shape (h, w, 3)
//!   1/               level 1 array
//!   ...
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{ConvertError, ZarrError};
use crate::slide::{read_region, Region, Slide};
use crate::zarr::{PyramidAttrs, ZarrGroup};

use super::crop::{resolve_crop, CropMode};

/// Default height in pixels of the horizontal bands read from the source.
pub const DEFAULT_BAND_SIZE: u32 = 1528;

/// Directory name of the store created inside the output path.
const STORE_NAME: &str = "pyramid_0.zarr";

/// Chunk edge length for the level arrays. The channel axis is always a
/// single chunk.
const CHUNK_EDGE: u64 = 4096;

/// Tunable parameters for Zarr conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZarrConvertOptions {
    /// Source region selection
    pub crop: CropMode,

    /// Height of the horizontal bands read per write
    pub band_size: u32,
}

impl Default for ZarrConvertOptions {
    fn default() -> Self {
        Self {
            crop: CropMode::Full,
            band_size: DEFAULT_BAND_SIZE,
        }
    }
}

/// Convert a slide into a pyramidal Zarr store.
///
/// The store is created at `<dest>/pyramid_0.zarr`, overwriting existing
/// metadata files but not removing stale arrays. Each source level maps
/// onto one array named by its level index; levels where the crop region
/// scales down to nothing are dropped from the tail of the pyramid.
///
/// Returns the path of the created store.
///
/// # Errors
///
/// Fails on an empty explicit crop, on source read or decode errors, and
/// on store write errors.
pub async fn convert_to_zarr(
    slide: &Slide,
    dest: &Path,
    options: &ZarrConvertOptions,
) -> Result<PathBuf, ConvertError> {
    let crop = resolve_crop(slide.info(), options.crop)?;
    let band_size = options.band_size.max(1);

    let store_path = dest.join(STORE_NAME);
    let group = ZarrGroup::create(&store_path)?;

    info!(
        source = %slide.path().display(),
        store = %store_path.display(),
        crop_x = crop.x,
        crop_y = crop.y,
        crop_width = crop.width,
        crop_height = crop.height,
        "starting zarr conversion"
    );

    let mut widths = Vec::with_capacity(slide.level_count());
    let mut heights = Vec::with_capacity(slide.level_count());

    for level in 0..slide.level_count() {
        let downsample = slide.level_downsample(level).unwrap_or(1.0);
        let mapped = crop.scaled(downsample);
        if mapped.is_empty() {
            // Downsamples grow monotonically, so once the crop vanishes it
            // stays gone; the remaining levels are dropped together.
            warn!(
                level,
                remaining = slide.level_count() - level,
                "crop region scales to nothing, stopping the pyramid here"
            );
            break;
        }

        info!(
            level,
            width = mapped.width,
            height = mapped.height,
            "copying pyramid level"
        );

        let array = group.create_array(
            &level.to_string(),
            [mapped.height as u64, mapped.width as u64, 3],
            [CHUNK_EDGE, CHUNK_EDGE, 3],
        )?;
        let array = Arc::new(array);

        let mut row = 0u32;
        while row < mapped.height {
            let band_height = (mapped.height - row).min(band_size);
            let source = Region::new(mapped.x, mapped.y + row, mapped.width, band_height);
            let band = read_region(slide, level, source).await?;

            debug!(level, row, band_height, "writing band");

            let writer = array.clone();
            let y0 = row as u64;
            tokio::task::spawn_blocking(move || writer.write_rows(y0, &band))
                .await
                .map_err(|e| ZarrError::StoreIo {
                    path: store_path.display().to_string(),
                    message: format!("band write task failed: {}", e),
                })??;

            row += band_height;
        }

        widths.push(mapped.width);
        heights.push(mapped.height);
    }

    let info = slide.info();
    let attrs = PyramidAttrs {
        max_level: widths.len(),
        channel_names: vec!["R".to_string(), "G".to_string(), "B".to_string()],
        dimension_names: vec!["y".to_string(), "x".to_string(), "c".to_string()],
        mpp_x: info.mpp_x,
        mpp_y: info.mpp_y,
        mag_step: info.magnification_step,
        objective_power: info.objective_power,
        extent: [widths, heights],
    };
    group.set_attrs(&attrs)?;

    info!(
        store = %store_path.display(),
        levels = attrs.max_level,
        "zarr conversion complete"
    );

    Ok(store_path)
}
