//! Aperio SVS reader.
//!
//! SVS is TIFF underneath: the pyramid levels sit in the IFD chain next to
//! a thumbnail, a label, and a macro overview, and the vendor metadata is a
//! pipe-separated string packed into the baseline ImageDescription. What
//! makes the format awkward is tile storage: JPEG tiles are abbreviated
//! streams that need the level's shared JPEGTables spliced in before any
//! decoder will touch them, and blank-glass tiles may be sparse
//! (zero-length). JPEG 2000 tiles (compression 33003/33005) are complete
//! codestreams and need no repair.
//!
//! [`SvsReader::open`] parses the pyramid once, pre-loads every level's
//! tile placement arrays and JPEGTables, and parses the vendor metadata,
//! so per-tile reads afterwards cost exactly one ranged read.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

use crate::error::TiffError;
use crate::io::RangeReader;
use crate::slide::SlideReader;

use super::jpeg::prepare_tile_jpeg;
use super::tiff::{PyramidLevel, TiffHeader, TiffPyramid, TiffTag, TileData, ValueReader};

/// Vendor metadata parsed from the baseline ImageDescription.
///
/// Aperio writes a version banner followed by `|`-separated `key = value`
/// pairs. Well-known keys are lifted into typed fields; everything else
/// stays available through [`SvsMetadata::property`].
#[derive(Debug, Clone, Default)]
pub struct SvsMetadata {
    /// Microns per pixel at level 0 (the `MPP` key).
    pub mpp: Option<f64>,

    /// Objective magnification (the `AppMag` key).
    pub magnification: Option<f64>,

    /// Scanner vendor, `"Aperio"` when the banner names it.
    pub vendor: Option<String>,

    /// The raw ImageDescription string.
    pub image_description: Option<String>,

    /// Every `key = value` pair from the description, untyped.
    pub properties: HashMap<String, String>,
}

impl SvsMetadata {
    /// Parse an SVS ImageDescription.
    ///
    /// Typical input:
    ///
    /// ```text
    /// Aperio Image Library v12.0.15
    /// 46920x33600 (256x256) JPEG/RGB Q=70|AppMag = 20|MPP = 0.499|...
    /// ```
    ///
    /// Unparseable values for known keys are kept in `properties` but the
    /// typed field stays `None`.
    pub fn parse(description: &str) -> Self {
        let mut metadata = SvsMetadata {
            image_description: Some(description.to_string()),
            vendor: description.contains("Aperio").then(|| "Aperio".to_string()),
            ..Default::default()
        };

        for part in description.split('|') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            match key {
                "MPP" => metadata.mpp = value.parse().ok(),
                "AppMag" => metadata.magnification = value.parse().ok(),
                _ => {}
            }
            metadata
                .properties
                .insert(key.to_string(), value.to_string());
        }

        metadata
    }

    /// Raw property lookup by key, e.g. `"Date"` or `"ScanScope ID"`.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// One pyramid level with its pre-loaded tile placement data.
#[derive(Debug, Clone)]
pub struct SvsLevelData {
    /// Level geometry and backing IFD.
    pub level: PyramidLevel,

    /// Tile offsets, byte counts, and the level's JPEGTables.
    pub tile_data: TileData,
}

impl SvsLevelData {
    /// File offset and length of a tile, `None` outside the grid.
    pub fn get_tile_location(&self, tile_x: u32, tile_y: u32) -> Option<(u64, u64)> {
        let tile_index = self.level.tile_index(tile_x, tile_y)?;
        self.tile_data.get_tile_location(tile_index)
    }

    /// The JPEGTables segment shared by this level's tiles.
    pub fn jpeg_tables(&self) -> Option<&Bytes> {
        self.tile_data.jpeg_tables.as_ref()
    }
}

/// Reader for Aperio SVS slides.
#[derive(Debug)]
pub struct SvsReader {
    pyramid: TiffPyramid,
    levels: Vec<SvsLevelData>,
    metadata: SvsMetadata,
}

impl SvsReader {
    /// Parse an SVS file: pyramid structure, per-level tile arrays, and
    /// vendor metadata.
    pub async fn open<R: RangeReader>(reader: &R) -> Result<Self, TiffError> {
        let pyramid = TiffPyramid::parse(reader).await?;

        let mut levels = Vec::with_capacity(pyramid.levels.len());
        for level in &pyramid.levels {
            let tile_data = TileData::load(reader, level, &pyramid.header).await?;
            levels.push(SvsLevelData {
                level: level.clone(),
                tile_data,
            });
        }

        let metadata = Self::load_metadata(reader, &pyramid).await?;

        Ok(SvsReader {
            pyramid,
            levels,
            metadata,
        })
    }

    /// Read and parse the baseline ImageDescription. Slides without one
    /// get empty metadata rather than an error.
    async fn load_metadata<R: RangeReader>(
        reader: &R,
        pyramid: &TiffPyramid,
    ) -> Result<SvsMetadata, TiffError> {
        let entry = pyramid
            .base_level()
            .and_then(|level| level.ifd.get_entry_by_tag(TiffTag::ImageDescription));
        let entry = match entry {
            Some(e) => e,
            None => return Ok(SvsMetadata::default()),
        };

        let description = ValueReader::new(reader, &pyramid.header)
            .read_string(entry)
            .await?;
        Ok(SvsMetadata::parse(&description))
    }

    /// The file's TIFF header.
    pub fn header(&self) -> &TiffHeader {
        &self.pyramid.header
    }

    /// The parsed pyramid, including non-level IFDs.
    pub fn pyramid(&self) -> &TiffPyramid {
        &self.pyramid
    }

    /// Parsed vendor metadata.
    pub fn metadata(&self) -> &SvsMetadata {
        &self.metadata
    }

    /// Data for one pyramid level.
    pub fn get_level(&self, level: usize) -> Option<&SvsLevelData> {
        self.levels.get(level)
    }

    fn level_or_err(&self, level: usize) -> Result<&SvsLevelData, TiffError> {
        self.levels.get(level).ok_or(TiffError::InvalidTagValue {
            tag: "level",
            message: format!("level {} out of range (max {})", level, self.levels.len()),
        })
    }

    /// Read a tile's stored bytes without repair. For JPEG levels this is
    /// usually an abbreviated stream; sparse tiles come back empty.
    pub async fn read_raw_tile<R: RangeReader>(
        &self,
        reader: &R,
        level: usize,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<Bytes, TiffError> {
        let level_data = self.level_or_err(level)?;

        let (offset, size) =
            level_data
                .get_tile_location(tile_x, tile_y)
                .ok_or(TiffError::InvalidTagValue {
                    tag: "tile",
                    message: format!(
                        "tile ({}, {}) out of range for level {}",
                        tile_x, tile_y, level
                    ),
                })?;

        if size == 0 {
            return Ok(Bytes::new());
        }
        let data = reader.read_exact_at(offset, size as usize).await?;
        Ok(data)
    }
}

#[async_trait]
impl SlideReader for SvsReader {
    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.pyramid.dimensions()
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        self.levels.get(level).map(|l| (l.level.width, l.level.height))
    }

    fn level_downsample(&self, level: usize) -> Option<f64> {
        self.levels.get(level).map(|l| l.level.downsample)
    }

    fn tile_size(&self, level: usize) -> Option<(u32, u32)> {
        self.levels
            .get(level)
            .map(|l| (l.level.tile_width, l.level.tile_height))
    }

    fn tile_count(&self, level: usize) -> Option<(u32, u32)> {
        self.levels
            .get(level)
            .map(|l| (l.level.tiles_x, l.level.tiles_y))
    }

    fn level_compression(&self, level: usize) -> Option<u16> {
        self.levels.get(level).map(|l| l.level.compression)
    }

    fn level_samples_per_pixel(&self, level: usize) -> Option<u16> {
        self.levels.get(level).map(|l| l.level.samples_per_pixel)
    }

    fn best_level_for_downsample(&self, downsample: f64) -> Option<usize> {
        self.pyramid
            .best_level_for_downsample(downsample)
            .map(|l| l.level_index)
    }

    /// Read a tile and make it decodable: abbreviated JPEG streams get the
    /// level's JPEGTables spliced in, everything else passes through.
    async fn read_tile<R: RangeReader>(
        &self,
        reader: &R,
        level: usize,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<Bytes, TiffError> {
        let raw_data = self.read_raw_tile(reader, level, tile_x, tile_y).await?;
        if raw_data.is_empty() {
            return Ok(raw_data);
        }

        let tables = self.level_or_err(level)?.jpeg_tables();
        Ok(prepare_tile_jpeg(tables.map(|t| t.as_ref()), &raw_data))
    }
}
