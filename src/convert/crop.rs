//! Crop region resolution.
//!
//! Both conversion pipelines accept the same three cropping behaviors:
//! convert everything, crop to the tissue bounding box the scanner
//! recorded, or crop to an explicit caller-supplied region. This module
//! turns that choice into a concrete level 0 region before any pixels
//! are read.

use tracing::warn;

use crate::error::ConvertError;
use crate::slide::{Region, SlideInfo};

/// How a conversion selects its source region, in level 0 pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CropMode {
    /// Convert the full image
    #[default]
    Full,

    /// Crop to the tissue bounding box recorded by the scanner, falling
    /// back to the full image when the slide does not record one
    Auto,

    /// Crop to a caller-supplied region
    Explicit(Region),
}

/// Resolve a crop mode against a slide into the region to convert.
///
/// Explicit regions are clamped to the image bounds; corners beyond the
/// image slide back inside and oversized extents shrink. Automatic
/// cropping degrades to the full image with a warning rather than
/// failing, since the bounding box is optional vendor metadata.
///
/// # Errors
///
/// Returns [`ConvertError::EmptyCrop`] when an explicit region clamps
/// down to zero area, reported with the originally requested values.
pub fn resolve_crop(info: &SlideInfo, mode: CropMode) -> Result<Region, ConvertError> {
    let full = Region::new(0, 0, info.width, info.height);

    match mode {
        CropMode::Full => Ok(full),
        CropMode::Auto => match info.roi {
            Some(roi) => {
                let clamped = roi.clamped(info.width, info.height);
                if clamped.is_empty() {
                    warn!(?roi, "recorded tissue region is empty, converting the full image");
                    Ok(full)
                } else {
                    Ok(clamped)
                }
            }
            None => {
                warn!("slide records no tissue region, converting the full image");
                Ok(full)
            }
        },
        CropMode::Explicit(region) => {
            let clamped = region.clamped(info.width, info.height);
            if clamped.is_empty() {
                return Err(ConvertError::EmptyCrop {
                    x0: region.x,
                    y0: region.y,
                    width: region.width,
                    height: region.height,
                });
            }
            Ok(clamped)
        }
    }
}
