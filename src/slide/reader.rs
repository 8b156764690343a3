//! The format-agnostic reader seam.
//!
//! [`SlideReader`] is what the region assembly and conversion pipelines
//! program against; [`crate::format::SvsReader`] and
//! [`crate::format::GenericTiffReader`] implement it. Everything
//! format-specific (JPEGTables splicing, vendor metadata) stays behind the
//! trait; everything above it sees levels, tiles, and downsamples.
//!
//! The trait is generic over the [`RangeReader`] carrying the bytes, so
//! the same slide reader works against a plain file, a block-cached
//! wrapper, or an in-memory test double.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

use crate::error::TiffError;
use crate::io::RangeReader;

/// Snapshot of one pyramid level's geometry.
///
/// Serializes as part of the `info --json` output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelInfo {
    /// Level width in pixels.
    pub width: u32,

    /// Level height in pixels.
    pub height: u32,

    /// Tile width in pixels; edge tiles may be narrower.
    pub tile_width: u32,

    /// Tile height in pixels; edge tiles may be shorter.
    pub tile_height: u32,

    /// Tile grid columns.
    pub tiles_x: u32,

    /// Tile grid rows.
    pub tiles_y: u32,

    /// Downsample factor relative to level 0 (1.0 at the base).
    pub downsample: f64,

    /// Raw TIFF compression code for the level's tiles.
    pub compression: u16,

    /// 3 for RGB, 1 for grayscale.
    pub samples_per_pixel: u16,
}

/// Read access to one slide's pyramid, independent of container format.
///
/// Metadata accessors are synchronous (implementations cache everything at
/// open time); only [`read_tile`](SlideReader::read_tile) touches the
/// file. Out-of-range level indices answer `None` rather than panicking.
#[async_trait]
pub trait SlideReader: Send + Sync {
    /// Number of pyramid levels; level 0 is full resolution.
    fn level_count(&self) -> usize;

    /// `(width, height)` of level 0, or `None` for an empty pyramid.
    fn dimensions(&self) -> Option<(u32, u32)>;

    /// `(width, height)` of a level.
    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)>;

    /// Downsample factor of a level relative to level 0.
    fn level_downsample(&self, level: usize) -> Option<f64>;

    /// `(tile_width, tile_height)` of a level's full tiles.
    fn tile_size(&self, level: usize) -> Option<(u32, u32)>;

    /// `(tiles_x, tiles_y)` of a level's tile grid.
    fn tile_count(&self, level: usize) -> Option<(u32, u32)>;

    /// Raw TIFF compression code of a level; decode with
    /// [`crate::format::tiff::Compression::from_u16`].
    fn level_compression(&self, level: usize) -> Option<u16>;

    /// Channels per pixel of a level.
    fn level_samples_per_pixel(&self, level: usize) -> Option<u16>;

    /// All of a level's geometry in one struct.
    fn level_info(&self, level: usize) -> Option<LevelInfo> {
        let (width, height) = self.level_dimensions(level)?;
        let (tile_width, tile_height) = self.tile_size(level)?;
        let (tiles_x, tiles_y) = self.tile_count(level)?;

        Some(LevelInfo {
            width,
            height,
            tile_width,
            tile_height,
            tiles_x,
            tiles_y,
            downsample: self.level_downsample(level)?,
            compression: self.level_compression(level)?,
            samples_per_pixel: self.level_samples_per_pixel(level)?,
        })
    }

    /// Index of the coarsest level whose downsample does not exceed
    /// `downsample`, so callers shrink fine data instead of upscaling
    /// coarse data.
    fn best_level_for_downsample(&self, downsample: f64) -> Option<usize>;

    /// Read tile `(tile_x, tile_y)` of `level` as a complete compressed
    /// stream, ready for [`crate::tile::decode_tile`].
    ///
    /// Implementations do whatever repair the format needs (SVS splices
    /// in JPEGTables; JPEG 2000 and complete JPEG streams pass through).
    /// Sparse tiles, regions the scanner never wrote, come back empty.
    /// Out-of-range levels or coordinates are errors, as are I/O
    /// failures.
    async fn read_tile<R: RangeReader>(
        &self,
        reader: &R,
        level: usize,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<Bytes, TiffError>;
}
