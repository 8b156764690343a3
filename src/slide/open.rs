//! Opening slides from local files.
//!
//! This module ties the I/O layer, format detection, and format readers
//! together into a single [`Slide`] handle:
//! - Block caching for efficient I/O
//! - Format auto-detection on open
//! - Decoded-tile caching for region assembly
//!
//! # Example
//!
//! ```ignore
//! use wsitk_utils::slide::Slide;
//!
//! let slide = Slide::open("slides/sample.svs").await?;
//!
//! println!("{}x{}", slide.info().width, slide.info().height);
//!
//! // Read a decoded tile
//! let tile = slide.decoded_tile(0, 0, 0).await?;
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use image::RgbImage;
use serde::Serialize;
use tracing::debug;

use crate::error::{ConvertError, FormatError, TiffError, TileError};
use crate::format::{detect_format, GenericTiffReader, SlideFormat, SvsReader};
use crate::io::{BlockCache, FileRangeReader};
use crate::tile::{decode_tile, TileCache, TileCacheKey};

use super::reader::{LevelInfo, SlideReader};
use super::region::Region;

// =============================================================================
// Slide Information
// =============================================================================

/// Metadata summary for an opened slide.
///
/// This is the format-independent view of a slide used by the conversion
/// pipeline and the `info` command.
#[derive(Debug, Clone, Serialize)]
pub struct SlideInfo {
    /// Full-resolution width in pixels
    pub width: u32,

    /// Full-resolution height in pixels
    pub height: u32,

    /// Number of pyramid levels
    pub level_count: usize,

    /// Tissue bounding box recorded by the scanner, in level 0 pixels.
    ///
    /// TIFF-family formats do not record one, so this stays `None` and
    /// autocropping falls back to the full image.
    pub roi: Option<Region>,

    /// Microns per pixel along X at level 0
    pub mpp_x: Option<f64>,

    /// Microns per pixel along Y at level 0
    pub mpp_y: Option<f64>,

    /// Objective magnification (e.g., 20, 40)
    pub objective_power: Option<f64>,

    /// Downsample ratio between consecutive pyramid levels (usually 2 or 4)
    pub magnification_step: u32,

    /// Scanner vendor name
    pub vendor: Option<String>,

    /// ImageDescription of the base level, if present
    pub description: Option<String>,

    /// Vendor key-value metadata (e.g., SVS "Date", "ScanScope ID")
    pub properties: BTreeMap<String, String>,
}

/// Compute the downsample ratio between consecutive pyramid levels.
///
/// Single-level files and degenerate downsample chains report a step of 1.
fn magnification_step(downsamples: &[f64]) -> u32 {
    if downsamples.len() < 2 || downsamples[0] <= 0.0 {
        return 1;
    }

    let step = (downsamples[1] / downsamples[0]).round();
    if step >= 1.0 {
        step as u32
    } else {
        1
    }
}

// =============================================================================
// Slide
// =============================================================================

/// Internal enum to hold format-specific readers.
///
/// We use an enum instead of trait objects because `SlideReader::read_tile`
/// is generic over the reader type, making the trait not object-safe.
enum SlideImpl {
    Svs(SvsReader),
    GenericTiff(GenericTiffReader),
}

/// An opened Whole Slide Image.
///
/// This holds the parsed slide structure, the underlying file reader
/// (wrapped in a [`BlockCache`] for efficient I/O), and a cache of
/// decoded tiles.
pub struct Slide {
    /// Source file path
    path: PathBuf,

    /// The detected format of this slide
    format: SlideFormat,

    /// The underlying reader with block caching
    reader: BlockCache<FileRangeReader>,

    /// The slide reader (either SVS or generic TIFF)
    inner: SlideImpl,

    /// Cache of decoded tiles
    cache: TileCache,

    /// Format-independent metadata summary
    info: SlideInfo,
}

impl Slide {
    /// Open a slide with format auto-detection.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not a supported TIFF
    /// variant, or contains no pyramid levels.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, FormatError> {
        let path = path.as_ref().to_path_buf();

        let file = FileRangeReader::open(&path)?;
        let reader = BlockCache::new(file);

        // Detect format
        let format = detect_format(&reader).await?;
        debug!(path = %path.display(), format = format.name(), "detected slide format");

        // Open the appropriate reader
        let inner = match format {
            SlideFormat::AperioSvs => {
                let svs = SvsReader::open(&reader).await?;
                SlideImpl::Svs(svs)
            }
            SlideFormat::GenericTiff => {
                let tiff = GenericTiffReader::open(&reader).await?;
                SlideImpl::GenericTiff(tiff)
            }
        };

        let info = Self::build_info(&inner);
        if info.level_count == 0 {
            return Err(FormatError::UnsupportedFormat {
                reason: "no pyramid levels found".to_string(),
            });
        }

        Ok(Slide {
            path,
            format,
            reader,
            inner,
            cache: TileCache::new(),
            info,
        })
    }

    /// Build the metadata summary for an opened reader.
    fn build_info(inner: &SlideImpl) -> SlideInfo {
        let (width, height, level_count, downsamples) = match inner {
            SlideImpl::Svs(r) => {
                let (w, h) = r.dimensions().unwrap_or((0, 0));
                let ds: Vec<f64> = (0..r.level_count())
                    .filter_map(|i| r.level_downsample(i))
                    .collect();
                (w, h, r.level_count(), ds)
            }
            SlideImpl::GenericTiff(r) => {
                let (w, h) = r.dimensions().unwrap_or((0, 0));
                let ds: Vec<f64> = (0..r.level_count())
                    .filter_map(|i| r.level_downsample(i))
                    .collect();
                (w, h, r.level_count(), ds)
            }
        };

        let (mpp_x, mpp_y, objective_power, vendor, description, properties) = match inner {
            SlideImpl::Svs(r) => {
                let meta = r.metadata();
                let properties: BTreeMap<String, String> = meta
                    .properties
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                (
                    meta.mpp,
                    meta.mpp,
                    meta.magnification,
                    meta.vendor.clone(),
                    meta.image_description.clone(),
                    properties,
                )
            }
            SlideImpl::GenericTiff(r) => {
                let (mpp_x, mpp_y) = match r.mpp() {
                    Some((x, y)) => (Some(x), Some(y)),
                    None => (None, None),
                };
                (
                    mpp_x,
                    mpp_y,
                    None,
                    None,
                    r.description().map(str::to_string),
                    BTreeMap::new(),
                )
            }
        };

        SlideInfo {
            width,
            height,
            level_count,
            roi: None,
            mpp_x,
            mpp_y,
            objective_power,
            magnification_step: magnification_step(&downsamples),
            vendor,
            description,
            properties,
        }
    }

    /// Get the source file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the detected format of this slide.
    pub fn format(&self) -> SlideFormat {
        self.format
    }

    /// Get the metadata summary.
    pub fn info(&self) -> &SlideInfo {
        &self.info
    }

    /// Whether the underlying file is BigTIFF.
    pub fn is_bigtiff(&self) -> bool {
        match &self.inner {
            SlideImpl::Svs(r) => r.header().is_bigtiff,
            SlideImpl::GenericTiff(r) => r.header().is_bigtiff,
        }
    }

    /// Number of non-pyramid IFDs in the file (labels, macros, thumbnails).
    pub fn associated_image_count(&self) -> usize {
        match &self.inner {
            SlideImpl::Svs(r) => r.pyramid().other_ifds.len(),
            SlideImpl::GenericTiff(r) => r.pyramid().other_ifds.len(),
        }
    }

    /// Get the number of pyramid levels.
    pub fn level_count(&self) -> usize {
        match &self.inner {
            SlideImpl::Svs(r) => r.level_count(),
            SlideImpl::GenericTiff(r) => r.level_count(),
        }
    }

    /// Get dimensions of the full-resolution (level 0) image.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match &self.inner {
            SlideImpl::Svs(r) => r.dimensions(),
            SlideImpl::GenericTiff(r) => r.dimensions(),
        }
    }

    /// Get dimensions of a specific level.
    pub fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        match &self.inner {
            SlideImpl::Svs(r) => r.level_dimensions(level),
            SlideImpl::GenericTiff(r) => r.level_dimensions(level),
        }
    }

    /// Get the downsample factor for a level.
    pub fn level_downsample(&self, level: usize) -> Option<f64> {
        match &self.inner {
            SlideImpl::Svs(r) => r.level_downsample(level),
            SlideImpl::GenericTiff(r) => r.level_downsample(level),
        }
    }

    /// Get tile size for a level.
    pub fn tile_size(&self, level: usize) -> Option<(u32, u32)> {
        match &self.inner {
            SlideImpl::Svs(r) => r.tile_size(level),
            SlideImpl::GenericTiff(r) => r.tile_size(level),
        }
    }

    /// Get the number of tiles in X and Y directions for a level.
    pub fn tile_count(&self, level: usize) -> Option<(u32, u32)> {
        match &self.inner {
            SlideImpl::Svs(r) => r.tile_count(level),
            SlideImpl::GenericTiff(r) => r.tile_count(level),
        }
    }

    /// Get complete information about a level.
    pub fn level_info(&self, level: usize) -> Option<LevelInfo> {
        match &self.inner {
            SlideImpl::Svs(r) => r.level_info(level),
            SlideImpl::GenericTiff(r) => r.level_info(level),
        }
    }

    /// Find the best level for a given downsample factor.
    pub fn best_level_for_downsample(&self, downsample: f64) -> Option<usize> {
        match &self.inner {
            SlideImpl::Svs(r) => SlideReader::best_level_for_downsample(r, downsample),
            SlideImpl::GenericTiff(r) => SlideReader::best_level_for_downsample(r, downsample),
        }
    }

    /// Read a tile's compressed payload, ready for decoding.
    ///
    /// # Arguments
    /// * `level` - Pyramid level index (0 = highest resolution)
    /// * `tile_x` - Tile X coordinate (0-indexed from left)
    /// * `tile_y` - Tile Y coordinate (0-indexed from top)
    pub async fn read_tile(
        &self,
        level: usize,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<Bytes, TiffError> {
        match &self.inner {
            SlideImpl::Svs(r) => r.read_tile(&self.reader, level, tile_x, tile_y).await,
            SlideImpl::GenericTiff(r) => r.read_tile(&self.reader, level, tile_x, tile_y).await,
        }
    }

    /// Read and decode a tile, going through the decoded-tile cache.
    ///
    /// Decoding runs on the blocking thread pool; cache hits return the
    /// shared pixels without copying.
    pub async fn decoded_tile(
        &self,
        level: usize,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<Arc<RgbImage>, ConvertError> {
        let key = TileCacheKey::new(level as u32, tile_x, tile_y);

        if let Some(tile) = self.cache.get(&key).await {
            return Ok(tile);
        }

        let info = self
            .level_info(level)
            .ok_or_else(|| TiffError::InvalidTagValue {
                tag: "level",
                message: format!("level {} out of range", level),
            })?;

        let data = self.read_tile(level, tile_x, tile_y).await?;

        let tile = tokio::task::spawn_blocking(move || {
            decode_tile(
                &data,
                info.compression,
                info.samples_per_pixel,
                info.tile_width,
                info.tile_height,
            )
        })
        .await
        .map_err(|e| TileError::DecodeError {
            message: format!("decode task failed: {}", e),
        })??;

        let tile = Arc::new(tile);
        self.cache.put(key, tile.clone()).await;
        Ok(tile)
    }
}

// =============================================================================
// Tests
// =============================================================================
