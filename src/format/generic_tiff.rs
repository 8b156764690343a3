//! Fallback reader for pyramidal TIFFs without vendor extensions.
//!
//! Anything tiled with JPEG, JPEG 2000, or no compression and a
//! recognizable pyramid is readable here. Strip-organized files, exotic
//! compressions, and single-page files without a pyramid are rejected
//! when opened, with the precise reason in the error.
//!
//! Plain TIFFs carry no vendor metadata string, but XResolution,
//! YResolution, and ResolutionUnit still give the physical pixel pitch;
//! [`GenericTiffReader::open`] converts those to microns per pixel so
//! downstream code sees the same shape of metadata an SVS provides.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::warn;

use crate::error::TiffError;
use crate::io::RangeReader;
use crate::slide::SlideReader;

use super::jpeg::prepare_tile_jpeg;
use super::tiff::{
    validate_pyramid, PyramidLevel, TiffHeader, TiffPyramid, TiffTag, TileData, ValueReader,
    RESOLUTION_UNIT_CM, RESOLUTION_UNIT_INCH,
};

/// One pyramid level with its pre-loaded tile placement data.
#[derive(Debug, Clone)]
pub struct GenericTiffLevelData {
    /// Level geometry and backing IFD.
    pub level: PyramidLevel,

    /// Tile offsets and byte counts; JPEGTables when the file has them.
    pub tile_data: TileData,
}

impl GenericTiffLevelData {
    /// File offset and length of a tile, `None` outside the grid.
    pub fn get_tile_location(&self, tile_x: u32, tile_y: u32) -> Option<(u64, u64)> {
        let tile_index = self.level.tile_index(tile_x, tile_y)?;
        self.tile_data.get_tile_location(tile_index)
    }

    /// Shared JPEGTables, uncommon outside SVS but legal in any TIFF.
    pub fn jpeg_tables(&self) -> Option<&Bytes> {
        self.tile_data.jpeg_tables.as_ref()
    }
}

/// Reader for plain tiled pyramidal TIFFs.
#[derive(Debug)]
pub struct GenericTiffReader {
    pyramid: TiffPyramid,
    levels: Vec<GenericTiffLevelData>,
    warnings: Vec<String>,
    mpp: Option<(f64, f64)>,
    description: Option<String>,
}

impl GenericTiffReader {
    /// Parse and validate the file, then pre-load every level's tile
    /// arrays and the resolution metadata.
    ///
    /// Validation failures (strips, unsupported compression, missing
    /// tile tags, no levels) abort the open; validation warnings are
    /// logged and retained on the reader.
    pub async fn open<R: RangeReader>(reader: &R) -> Result<Self, TiffError> {
        let pyramid = TiffPyramid::parse(reader).await?;

        let validation = validate_pyramid(&pyramid);
        for warning in &validation.warnings {
            warn!(file = reader.identifier(), %warning, "tiff validation");
        }
        let warnings = validation.warnings.clone();
        validation.into_result()?;

        let mut levels = Vec::with_capacity(pyramid.levels.len());
        for level in &pyramid.levels {
            let tile_data = TileData::load(reader, level, &pyramid.header).await?;
            levels.push(GenericTiffLevelData {
                level: level.clone(),
                tile_data,
            });
        }

        let mpp = Self::read_mpp(reader, &pyramid).await?;
        let description = Self::read_description(reader, &pyramid).await?;

        Ok(GenericTiffReader {
            pyramid,
            levels,
            warnings,
            mpp,
            description,
        })
    }

    /// Microns per pixel from the base level's resolution tags.
    ///
    /// TIFF stores pixels per unit; a missing tag, an unrecognized unit,
    /// or a zero in the rational yields `None` rather than an error
    /// since resolution metadata is optional.
    async fn read_mpp<R: RangeReader>(
        reader: &R,
        pyramid: &TiffPyramid,
    ) -> Result<Option<(f64, f64)>, TiffError> {
        let first_level = match pyramid.levels.first() {
            Some(level) => level,
            None => return Ok(None),
        };
        let ifd = &first_level.ifd;
        let byte_order = pyramid.header.byte_order;

        // ResolutionUnit defaults to inch when the tag is absent.
        let unit = ifd
            .get_entry_by_tag(TiffTag::ResolutionUnit)
            .and_then(|e| e.inline_u16(byte_order))
            .unwrap_or(RESOLUTION_UNIT_INCH);

        let micrometers_per_unit = match unit {
            RESOLUTION_UNIT_CM => 10_000.0,
            RESOLUTION_UNIT_INCH => 25_400.0,
            _ => return Ok(None),
        };

        let (x_entry, y_entry) = match (
            ifd.get_entry_by_tag(TiffTag::XResolution),
            ifd.get_entry_by_tag(TiffTag::YResolution),
        ) {
            (Some(x), Some(y)) => (x, y),
            _ => return Ok(None),
        };

        let value_reader = ValueReader::new(reader, &pyramid.header);
        let (x_num, x_den) = value_reader.read_rational(x_entry).await?;
        let (y_num, y_den) = value_reader.read_rational(y_entry).await?;

        let mpp_x = mpp_from_resolution(x_num, x_den, micrometers_per_unit);
        let mpp_y = mpp_from_resolution(y_num, y_den, micrometers_per_unit);

        Ok(match (mpp_x, mpp_y) {
            (Some(x), Some(y)) => Some((x, y)),
            _ => None,
        })
    }

    /// The base level's ImageDescription, if any.
    async fn read_description<R: RangeReader>(
        reader: &R,
        pyramid: &TiffPyramid,
    ) -> Result<Option<String>, TiffError> {
        let entry = pyramid
            .levels
            .first()
            .and_then(|level| level.ifd.get_entry_by_tag(TiffTag::ImageDescription));
        let entry = match entry {
            Some(e) => e,
            None => return Ok(None),
        };

        let description = ValueReader::new(reader, &pyramid.header)
            .read_string(entry)
            .await?;
        Ok(Some(description))
    }

    /// The file's TIFF header.
    pub fn header(&self) -> &TiffHeader {
        &self.pyramid.header
    }

    /// The parsed pyramid, including non-level IFDs.
    pub fn pyramid(&self) -> &TiffPyramid {
        &self.pyramid
    }

    /// Non-fatal validation findings from open.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Microns per pixel (x, y) from the resolution tags.
    pub fn mpp(&self) -> Option<(f64, f64)> {
        self.mpp
    }

    /// The base level's ImageDescription, if the file has one.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Data for one pyramid level.
    pub fn get_level(&self, level: usize) -> Option<&GenericTiffLevelData> {
        self.levels.get(level)
    }

    fn level_or_err(&self, level: usize) -> Result<&GenericTiffLevelData, TiffError> {
        self.levels.get(level).ok_or(TiffError::InvalidTagValue {
            tag: "level",
            message: format!("level {} out of range (max {})", level, self.levels.len()),
        })
    }

    /// Read a tile's stored bytes without any repair. Sparse tiles come
    /// back empty.
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

/// Convert a pixels-per-unit rational to microns per pixel.
fn mpp_from_resolution(num: u32, den: u32, micrometers_per_unit: f64) -> Option<f64> {
    if num == 0 || den == 0 {
        return None;
    }
    let pixels_per_unit = num as f64 / den as f64;
    Some(micrometers_per_unit / pixels_per_unit)
}

#[async_trait]
impl SlideReader for GenericTiffReader {
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

    /// Read a tile and make it decodable. Plain TIFFs rarely use
    /// abbreviated JPEG streams, but when JPEGTables are present the
    /// splice applies here exactly as for SVS.
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
