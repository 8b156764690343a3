//! Pyramid assembly from the IFD chain.
//!
//! A slide TIFF is a flat chain of IFDs, and only some of them carry pixel
//! data at pyramid resolutions. Aperio files interleave a thumbnail, a
//! label, and a macro overview between the levels; generic exports
//! sometimes chain unrelated pages. This module walks the chain, decides
//! which IFDs are resolution levels, and orders them into a
//! [`TiffPyramid`].
//!
//! Classification is heuristic and deliberately conservative:
//!
//! - a level must be tiled and carry TileOffsets/TileByteCounts,
//! - small square-ish images are treated as labels/thumbnails and skipped,
//! - each accepted level's downsample relative to the base must sit near a
//!   power of two, which is how scanners actually build pyramids.
//!
//! An IFD that fails classification is kept in [`TiffPyramid::other_ifds`]
//! so callers can still count and report it.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE};
use super::tags::TiffTag;
use super::values::ValueReader;

/// Hard stop for IFD chain walks; real slides have well under this many.
const MAX_IFDS: usize = 100;

/// Anything smaller than this in either dimension is a thumbnail.
const MIN_PYRAMID_DIMENSION: u32 = 256;

/// Square-ish images at or under this size are assumed to be slide labels.
const MAX_LABEL_DIMENSION: u32 = 1000;

/// One resolution level of the pyramid.
///
/// Level 0 is the full-resolution image; each subsequent level roughly
/// halves (or quarters) both dimensions.
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    /// Position in the sorted pyramid (0 = full resolution).
    pub level_index: usize,

    /// Position of the backing IFD in the file's chain.
    pub ifd_index: usize,

    /// Level width in pixels.
    pub width: u32,

    /// Level height in pixels.
    pub height: u32,

    /// Tile width in pixels.
    pub tile_width: u32,

    /// Tile height in pixels.
    pub tile_height: u32,

    /// Tile grid columns.
    pub tiles_x: u32,

    /// Tile grid rows.
    pub tiles_y: u32,

    /// Total tiles in the grid.
    pub tile_count: u32,

    /// Downsample factor relative to level 0.
    pub downsample: f64,

    /// Raw Compression tag value (7 = JPEG, 33003/33005 = JPEG 2000).
    pub compression: u16,

    /// Channels per pixel; 3 when the tag is absent.
    pub samples_per_pixel: u16,

    /// The backing IFD, kept for tag lookups beyond the cached fields.
    pub ifd: Ifd,

    /// TileOffsets entry, if the IFD has one.
    pub tile_offsets_entry: Option<IfdEntry>,

    /// TileByteCounts entry, if the IFD has one.
    pub tile_byte_counts_entry: Option<IfdEntry>,

    /// JPEGTables entry shared by this level's abbreviated JPEG streams.
    pub jpeg_tables_entry: Option<IfdEntry>,
}

impl PyramidLevel {
    /// Build a level from an IFD, or `None` when the IFD is not tiled or
    /// lacks image dimensions. `level_index` and `downsample` are filled
    /// in later, once the whole chain has been sorted.
    fn from_ifd(ifd: Ifd, ifd_index: usize, byte_order: ByteOrder) -> Option<Self> {
        let tile_width = ifd.tile_width(byte_order)?;
        let tile_height = ifd.tile_height(byte_order)?;
        if tile_width == 0 || tile_height == 0 {
            return None;
        }

        let width = ifd.image_width(byte_order)?;
        let height = ifd.image_height(byte_order)?;

        let tiles_x = width.div_ceil(tile_width);
        let tiles_y = height.div_ceil(tile_height);

        Some(PyramidLevel {
            level_index: 0,
            ifd_index,
            width,
            height,
            tile_width,
            tile_height,
            tiles_x,
            tiles_y,
            tile_count: tiles_x * tiles_y,
            downsample: 1.0,
            // Absent Compression means JPEG in practice for slide files.
            compression: ifd.compression(byte_order).unwrap_or(7),
            samples_per_pixel: ifd.samples_per_pixel(byte_order).unwrap_or(3),
            tile_offsets_entry: ifd.get_entry_by_tag(TiffTag::TileOffsets).cloned(),
            tile_byte_counts_entry: ifd.get_entry_by_tag(TiffTag::TileByteCounts).cloned(),
            jpeg_tables_entry: ifd.get_entry_by_tag(TiffTag::JpegTables).cloned(),
            ifd,
        })
    }

    /// Whether both tile data arrays are present.
    pub fn has_tile_data(&self) -> bool {
        self.tile_offsets_entry.is_some() && self.tile_byte_counts_entry.is_some()
    }

    /// Linear tile index for grid coordinates, row-major. `None` when out
    /// of the grid.
    pub fn tile_index(&self, tile_x: u32, tile_y: u32) -> Option<u32> {
        if tile_x >= self.tiles_x || tile_y >= self.tiles_y {
            return None;
        }
        Some(tile_y * self.tiles_x + tile_x)
    }

    /// Pixel extent of a tile; tiles in the last column/row are clipped to
    /// the image edge.
    pub fn tile_dimensions(&self, tile_x: u32, tile_y: u32) -> Option<(u32, u32)> {
        if tile_x >= self.tiles_x || tile_y >= self.tiles_y {
            return None;
        }
        Some((
            edge_extent(tile_x, self.tiles_x, self.width, self.tile_width),
            edge_extent(tile_y, self.tiles_y, self.height, self.tile_height),
        ))
    }
}

/// Extent of tile `index` along one axis: full tile size except in the
/// last slot, where the image edge may clip it.
fn edge_extent(index: u32, grid: u32, image: u32, tile: u32) -> u32 {
    if index + 1 == grid {
        let rem = image % tile;
        if rem == 0 {
            tile
        } else {
            rem
        }
    } else {
        tile
    }
}

/// A parsed slide pyramid: ordered levels plus the IFDs that were
/// classified as non-pyramid pages.
#[derive(Debug, Clone)]
pub struct TiffPyramid {
    /// The file's TIFF header.
    pub header: TiffHeader,

    /// Resolution levels, finest first.
    pub levels: Vec<PyramidLevel>,

    /// Label, macro, thumbnail, and other non-level IFDs with their chain
    /// positions.
    pub other_ifds: Vec<(usize, Ifd)>,
}

impl TiffPyramid {
    /// Parse the full IFD chain of a slide file and assemble its pyramid.
    pub async fn parse<R: RangeReader>(reader: &R) -> Result<Self, TiffError> {
        let header_bytes = reader.read_exact_at(0, BIGTIFF_HEADER_SIZE).await?;
        let header = TiffHeader::parse(&header_bytes, reader.size())?;

        let ifds = Self::walk_ifd_chain(reader, &header).await?;
        Self::assemble(header, ifds)
    }

    /// Follow the next-IFD links from the header, parsing each directory.
    /// Stops at offset 0 or at [`MAX_IFDS`], whichever comes first.
    async fn walk_ifd_chain<R: RangeReader>(
        reader: &R,
        header: &TiffHeader,
    ) -> Result<Vec<Ifd>, TiffError> {
        let mut ifds = Vec::new();
        let mut offset = header.first_ifd_offset;

        while offset != 0 && ifds.len() < MAX_IFDS {
            // Two reads per IFD: the entry count sizes the second read.
            let count_bytes = reader.read_exact_at(offset, header.ifd_count_size()).await?;
            let entry_count = Ifd::read_entry_count(&count_bytes, header)?;

            let ifd_bytes = reader
                .read_exact_at(offset, Ifd::calculate_size(entry_count, header))
                .await?;
            let ifd = Ifd::parse(&ifd_bytes, header)?;

            offset = ifd.next_ifd_offset;
            ifds.push(ifd);
        }

        Ok(ifds)
    }

    /// Split IFDs into pyramid levels and auxiliary pages, then sort and
    /// index the levels.
    fn assemble(header: TiffHeader, ifds: Vec<Ifd>) -> Result<Self, TiffError> {
        let byte_order = header.byte_order;

        let mut candidates: Vec<PyramidLevel> = Vec::new();
        let mut other_ifds: Vec<(usize, Ifd)> = Vec::new();

        for (ifd_index, ifd) in ifds.into_iter().enumerate() {
            match PyramidLevel::from_ifd(ifd.clone(), ifd_index, byte_order) {
                Some(level) if Self::looks_like_level(&level) => candidates.push(level),
                _ => other_ifds.push((ifd_index, ifd)),
            }
        }

        // Largest area first; that image defines level 0.
        candidates.sort_by_key(|l| std::cmp::Reverse((l.width as u64) * (l.height as u64)));

        Ok(TiffPyramid {
            header,
            levels: Self::index_levels(candidates),
            other_ifds,
        })
    }

    /// Heuristic filter separating resolution levels from labels, macros,
    /// and thumbnails.
    fn looks_like_level(level: &PyramidLevel) -> bool {
        if level.width < MIN_PYRAMID_DIMENSION || level.height < MIN_PYRAMID_DIMENSION {
            return false;
        }
        if !level.has_tile_data() {
            return false;
        }

        // Slide labels are small and close to square. Macro overviews are
        // also small but elongated, and they fail the downsample check
        // later instead.
        if level.width <= MAX_LABEL_DIMENSION && level.height <= MAX_LABEL_DIMENSION {
            let aspect = level.width as f64 / level.height as f64;
            if aspect > 0.5 && aspect < 2.0 {
                return false;
            }
        }

        true
    }

    /// Assign level indices and downsample factors, dropping candidates
    /// whose ratio to the base is not close to a power of two.
    fn index_levels(candidates: Vec<PyramidLevel>) -> Vec<PyramidLevel> {
        let (base_width, base_height) = match candidates.first() {
            Some(base) => (base.width as f64, base.height as f64),
            None => return Vec::new(),
        };

        let mut levels: Vec<PyramidLevel> = Vec::new();
        for (idx, mut level) in candidates.into_iter().enumerate() {
            let dx = base_width / level.width as f64;
            let dy = base_height / level.height as f64;
            let downsample = (dx + dy) / 2.0;

            if Self::is_valid_downsample(downsample, idx) {
                level.level_index = levels.len();
                level.downsample = downsample;
                levels.push(level);
            }
        }
        levels
    }

    /// Whether `downsample` is plausible for a pyramid member: ~1.0 for
    /// the base, within 20% of a power of two >= 2 otherwise.
    fn is_valid_downsample(downsample: f64, level_idx: usize) -> bool {
        if level_idx == 0 {
            return (downsample - 1.0).abs() < 0.1;
        }

        let rounded = downsample.log2().round();
        if rounded < 1.0 {
            return false;
        }

        let ratio = downsample / 2.0_f64.powf(rounded);
        ratio > 0.8 && ratio < 1.2
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn get_level(&self, level: usize) -> Option<&PyramidLevel> {
        self.levels.get(level)
    }

    /// The full-resolution level.
    pub fn base_level(&self) -> Option<&PyramidLevel> {
        self.levels.first()
    }

    /// Dimensions of the full-resolution level.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.base_level().map(|l| (l.width, l.height))
    }

    /// The coarsest level whose downsample does not exceed the requested
    /// factor, so callers read finer data and shrink it rather than
    /// upscale. Factors below 1 fall back to the base level.
    pub fn best_level_for_downsample(&self, downsample: f64) -> Option<&PyramidLevel> {
        self.levels
            .iter()
            .filter(|l| l.downsample <= downsample * 1.01)
            .max_by(|a, b| a.downsample.total_cmp(&b.downsample))
            .or_else(|| self.levels.first())
    }
}

/// Tile placement arrays for one level, loaded on demand.
#[derive(Debug, Clone)]
pub struct TileData {
    /// File offset of each tile's compressed payload.
    pub offsets: Vec<u64>,

    /// Payload length of each tile; 0 marks a sparse (unwritten) tile.
    pub byte_counts: Vec<u64>,

    /// Shared JPEGTables segment for abbreviated streams, if the level has
    /// one.
    pub jpeg_tables: Option<Bytes>,
}

impl TileData {
    /// Load offsets, byte counts, and JPEGTables for a level.
    pub async fn load<R: RangeReader>(
        reader: &R,
        level: &PyramidLevel,
        header: &TiffHeader,
    ) -> Result<Self, TiffError> {
        let values = ValueReader::new(reader, header);

        let offsets_entry = level
            .tile_offsets_entry
            .as_ref()
            .ok_or(TiffError::MissingTag("TileOffsets"))?;
        let counts_entry = level
            .tile_byte_counts_entry
            .as_ref()
            .ok_or(TiffError::MissingTag("TileByteCounts"))?;

        let offsets = values.read_u64_array(offsets_entry).await?;
        let byte_counts = values.read_u64_array(counts_entry).await?;

        let jpeg_tables = match level.jpeg_tables_entry {
            Some(ref entry) => Some(values.read_raw_bytes(entry).await?),
            None => None,
        };

        Ok(TileData {
            offsets,
            byte_counts,
            jpeg_tables,
        })
    }

    /// File offset and length of a tile, or `None` out of range.
    pub fn get_tile_location(&self, tile_index: u32) -> Option<(u64, u64)> {
        let idx = tile_index as usize;
        Some((
            *self.offsets.get(idx)?,
            *self.byte_counts.get(idx)?,
        ))
    }

    /// Whether a tile was never written (zero-length payload). Aperio
    /// leaves blank-glass tiles sparse.
    pub fn is_sparse_tile(&self, tile_index: u32) -> bool {
        matches!(self.get_tile_location(tile_index), Some((_, 0)))
    }
}
