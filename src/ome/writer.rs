//! Pyramidal BigTIFF writer for OME-TIFF output.
//!
//! This module writes plane-separated OME-TIFF files: one main IFD per
//! channel at full resolution, with the reduced pyramid levels of each
//! channel stored in that IFD's SubIFDs chain. Tile payloads are
//! pre-encoded JPEG streams supplied by the caller.
//!
//! # Design Decisions
//!
//! - **BigTIFF only**: slide planes routinely exceed the 4GB classic TIFF
//!   limit, so the writer always emits the 64-bit variant, little-endian.
//!
//! - **Streaming layout**: tile data is appended as it arrives and the IFDs
//!   are written at the end of the file. Only the first-IFD pointer in the
//!   header is patched after the fact, so the writer never buffers pixel
//!   data in memory.
//!
//! - **SubIFD pyramids**: reduced levels use the SubIFDs tag (written as
//!   LONG8 offsets) rather than extra pages in the main chain, which keeps
//!   the page count equal to the channel count.
//!
//! # File Layout
//!
//! ```text
//! +--------------------+
//! | BigTIFF header     |  first-IFD pointer patched by finish()
//! +--------------------+
//! | tile data ...      |  appended by write_tile(), 8-byte aligned
//! +--------------------+
//! | sub IFDs + values  |  reduced levels, per channel
//! +--------------------+
//! | main IFDs + values |  one per channel, chained in channel order
//! +--------------------+
//! ```

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::OmeError;
use crate::format::tiff::{Compression, FieldType, TiffTag, RESOLUTION_UNIT_CM};
use crate::tile::DEFAULT_JPEG_QUALITY;

/// Default tile edge length for pyramid output.
pub const DEFAULT_TILE_SIZE: u32 = 512;

/// Photometric interpretation for single-channel planes.
const PHOTOMETRIC_MIN_IS_BLACK: u16 = 1;

/// NewSubfileType value for reduced-resolution pyramid levels.
const SUBFILE_REDUCED_IMAGE: u32 = 1;

// =============================================================================
// Options
// =============================================================================

/// Tunable parameters for OME-TIFF output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OmeTiffOptions {
    /// JPEG quality for encoded tiles (1-100)
    pub quality: u8,

    /// Tile edge length in pixels
    pub tile_size: u32,
}

impl Default for OmeTiffOptions {
    fn default() -> Self {
        Self {
            quality: DEFAULT_JPEG_QUALITY,
            tile_size: DEFAULT_TILE_SIZE,
        }
    }
}

// =============================================================================
// Pyramid geometry
// =============================================================================

/// Dimensions and tile grid of one pyramid level.
#[derive(Debug, Clone, Copy)]
struct PlaneLevel {
    width: u32,
    height: u32,
    tiles_x: u32,
    tiles_y: u32,
}

impl PlaneLevel {
    fn new(width: u32, height: u32, tile_size: u32) -> Self {
        Self {
            width,
            height,
            tiles_x: width.div_ceil(tile_size),
            tiles_y: height.div_ceil(tile_size),
        }
    }

    fn tile_count(&self) -> usize {
        self.tiles_x as usize * self.tiles_y as usize
    }
}

/// Compute the pyramid level chain for a full-resolution plane.
///
/// Levels halve with round-up until both dimensions fit in a single tile,
/// so the last level is always at most one tile in each direction.
fn pyramid_levels(width: u32, height: u32, tile_size: u32) -> Vec<PlaneLevel> {
    let mut levels = vec![PlaneLevel::new(width, height, tile_size)];
    loop {
        let last = levels[levels.len() - 1];
        if last.width <= tile_size && last.height <= tile_size {
            break;
        }
        levels.push(PlaneLevel::new(
            (last.width + 1) / 2,
            (last.height + 1) / 2,
            tile_size,
        ));
    }
    levels
}

// =============================================================================
// Tag values
// =============================================================================

/// Value of a single IFD entry, limited to the types this writer emits.
#[derive(Debug, Clone)]
enum TagValue {
    Short(u16),
    Long(u32),
    Rational(u32, u32),
    Ascii(String),
    Long8Array(Vec<u64>),
}

impl TagValue {
    /// TIFF field type and value count for this value.
    fn type_and_count(&self) -> (FieldType, u64) {
        match self {
            TagValue::Short(_) => (FieldType::Short, 1),
            TagValue::Long(_) => (FieldType::Long, 1),
            TagValue::Rational(_, _) => (FieldType::Rational, 1),
            TagValue::Ascii(s) => (FieldType::Ascii, s.len() as u64 + 1),
            TagValue::Long8Array(v) => (FieldType::Long8, v.len() as u64),
        }
    }

    /// Serialized value bytes when they do not fit in the 8-byte inline
    /// field, including the trailing NUL for ASCII values.
    fn external_bytes(&self) -> Option<Vec<u8>> {
        match self {
            TagValue::Ascii(s) if s.len() + 1 > 8 => {
                let mut bytes = s.as_bytes().to_vec();
                bytes.push(0);
                Some(bytes)
            }
            TagValue::Long8Array(v) if v.len() > 1 => {
                let mut bytes = Vec::with_capacity(v.len() * 8);
                for value in v {
                    bytes.extend_from_slice(&value.to_le_bytes());
                }
                Some(bytes)
            }
            _ => None,
        }
    }

    /// The 8-byte value/offset field: inline data zero-padded, or the
    /// external offset recorded during the value pass.
    fn value_field(&self, external_offset: Option<u64>) -> [u8; 8] {
        let mut field = [0u8; 8];
        if let Some(offset) = external_offset {
            field.copy_from_slice(&offset.to_le_bytes());
            return field;
        }
        match self {
            TagValue::Short(v) => field[..2].copy_from_slice(&v.to_le_bytes()),
            TagValue::Long(v) => field[..4].copy_from_slice(&v.to_le_bytes()),
            TagValue::Rational(num, den) => {
                field[..4].copy_from_slice(&num.to_le_bytes());
                field[4..].copy_from_slice(&den.to_le_bytes());
            }
            TagValue::Ascii(s) => field[..s.len()].copy_from_slice(s.as_bytes()),
            TagValue::Long8Array(v) => {
                if let Some(value) = v.first() {
                    field.copy_from_slice(&value.to_le_bytes());
                }
            }
        }
        field
    }
}

/// One IFD entry waiting to be serialized.
#[derive(Debug, Clone)]
struct TagEntry {
    tag: TiffTag,
    value: TagValue,
}

impl TagEntry {
    fn new(tag: TiffTag, value: TagValue) -> Self {
        Self { tag, value }
    }
}

// =============================================================================
// Writer
// =============================================================================

/// Streaming pyramidal BigTIFF writer.
///
/// The caller supplies JPEG-encoded grayscale tiles in any order via
/// [`write_tile`], then seals the file with [`finish`], which writes the
/// IFD chain and patches the header. Every level of every channel must
/// receive its full tile grid before `finish` succeeds.
///
/// # Example
///
/// ```ignore
/// use wsitk_utils::ome::{OmeTiffOptions, OmeTiffWriter};
///
/// let mut writer = OmeTiffWriter::create("out.ome.tiff", 4096, 4096, 3, OmeTiffOptions::default())?;
/// for level in 0..writer.level_count() {
///     // encode and write every tile of every channel ...
/// }
/// writer.finish(&ome_xml, "wsitk-utils 0.1.0", Some((0.25, 0.25)))?;
/// ```
///
/// [`write_tile`]: OmeTiffWriter::write_tile
/// [`finish`]: OmeTiffWriter::finish
pub struct OmeTiffWriter {
    file: BufWriter<File>,
    path: PathBuf,
    options: OmeTiffOptions,

    /// Next write position, tracked manually so alignment padding and
    /// offset recording never need a seek
    position: u64,

    /// Pyramid geometry, shared by all channels
    levels: Vec<PlaneLevel>,
    channels: usize,

    /// (offset, byte count) per written tile, indexed `[channel][level]`
    tiles: Vec<Vec<Vec<(u64, u64)>>>,
}

impl OmeTiffWriter {
    /// Create the output file and write the BigTIFF header.
    ///
    /// `width` and `height` are the full-resolution plane dimensions;
    /// `channels` is the number of grayscale planes (pages) the file will
    /// hold. The pyramid level chain is derived from the tile size.
    ///
    /// # Errors
    ///
    /// Returns [`OmeError::Geometry`] for zero-sized dimensions, channels,
    /// or tiles, and [`OmeError::Io`] if the file cannot be created.
    pub fn create<P: AsRef<Path>>(
        path: P,
        width: u32,
        height: u32,
        channels: usize,
        options: OmeTiffOptions,
    ) -> Result<Self, OmeError> {
        let path = path.as_ref().to_path_buf();

        if width == 0 || height == 0 {
            return Err(OmeError::Geometry {
                message: format!("image dimensions {}x{} must be non-zero", width, height),
            });
        }
        if channels == 0 {
            return Err(OmeError::Geometry {
                message: "channel count must be non-zero".to_string(),
            });
        }
        if options.tile_size == 0 {
            return Err(OmeError::Geometry {
                message: "tile size must be non-zero".to_string(),
            });
        }

        let levels = pyramid_levels(width, height, options.tile_size);
        let tiles = vec![vec![Vec::new(); levels.len()]; channels];

        let file = File::create(&path).map_err(|e| write_error(&path, &e))?;
        let mut writer = Self {
            file: BufWriter::new(file),
            path,
            options,
            position: 0,
            levels,
            channels,
            tiles,
        };

        // BigTIFF header: "II", version 43, 8-byte offsets, then a
        // placeholder first-IFD pointer patched by finish()
        let mut header = [0u8; 16];
        header[0] = b'I';
        header[1] = b'I';
        header[2..4].copy_from_slice(&43u16.to_le_bytes());
        header[4..6].copy_from_slice(&8u16.to_le_bytes());
        writer.write_bytes(&header)?;

        debug!(
            path = %writer.path.display(),
            width,
            height,
            channels,
            levels = writer.levels.len(),
            "created OME-TIFF output"
        );

        Ok(writer)
    }

    /// Output file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of pyramid levels per channel, including full resolution.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Number of grayscale planes.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Tile edge length in pixels.
    pub fn tile_size(&self) -> u32 {
        self.options.tile_size
    }

    /// JPEG quality configured for this output.
    pub fn quality(&self) -> u8 {
        self.options.quality
    }

    /// Dimensions of a pyramid level in pixels.
    pub fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        self.levels.get(level).map(|l| (l.width, l.height))
    }

    /// Tile grid of a pyramid level as (columns, rows).
    pub fn tile_grid(&self, level: usize) -> Option<(u32, u32)> {
        self.levels.get(level).map(|l| (l.tiles_x, l.tiles_y))
    }

    /// Append one encoded tile for a channel and level.
    ///
    /// Tiles must arrive in row-major order within each (channel, level)
    /// pair, since offsets are recorded in arrival order. Different
    /// channels and levels may be interleaved freely.
    ///
    /// # Errors
    ///
    /// Returns [`OmeError::Geometry`] for an unknown channel or level, or
    /// when a tile grid already received its full complement of tiles.
    pub fn write_tile(&mut self, channel: usize, level: usize, data: &[u8]) -> Result<(), OmeError> {
        if channel >= self.channels || level >= self.levels.len() {
            return Err(OmeError::Geometry {
                message: format!(
                    "tile for channel {} level {} is outside the {}x{} plane layout",
                    channel,
                    level,
                    self.channels,
                    self.levels.len()
                ),
            });
        }
        let expected = self.levels[level].tile_count();
        if self.tiles[channel][level].len() >= expected {
            return Err(OmeError::Geometry {
                message: format!(
                    "channel {} level {} already has all {} tiles",
                    channel, level, expected
                ),
            });
        }

        self.align()?;
        let offset = self.position;
        self.write_bytes(data)?;
        self.tiles[channel][level].push((offset, data.len() as u64));
        Ok(())
    }

    /// Write the IFD chain, patch the header, and flush the file.
    ///
    /// `description` is the OME-XML document stored in the first IFD.
    /// `resolution` is the full-resolution pixel size in micrometers per
    /// pixel (x, y); reduced levels get proportionally scaled values.
    ///
    /// # Errors
    ///
    /// Returns [`OmeError::Geometry`] if any (channel, level) pair is
    /// missing tiles.
    pub fn finish(
        mut self,
        description: &str,
        software: &str,
        resolution: Option<(f64, f64)>,
    ) -> Result<(), OmeError> {
        for channel in 0..self.channels {
            for (level, plane) in self.levels.iter().enumerate() {
                let written = self.tiles[channel][level].len();
                if written != plane.tile_count() {
                    return Err(OmeError::Geometry {
                        message: format!(
                            "channel {} level {} has {} of {} tiles",
                            channel,
                            level,
                            written,
                            plane.tile_count()
                        ),
                    });
                }
            }
        }

        // Reduced levels first, so each main IFD can reference its SubIFDs
        let mut sub_offsets: Vec<Vec<u64>> = Vec::with_capacity(self.channels);
        for channel in 0..self.channels {
            let mut offsets = Vec::with_capacity(self.levels.len().saturating_sub(1));
            for level in 1..self.levels.len() {
                let entries = self.level_entries(channel, level, &[], None, None, resolution);
                offsets.push(self.write_ifd(entries, 0)?);
            }
            sub_offsets.push(offsets);
        }

        // Main IFDs in reverse channel order, so each one can chain to the
        // already-written next channel
        let mut next_ifd = 0u64;
        for channel in (0..self.channels).rev() {
            let (desc, soft) = if channel == 0 {
                (Some(description), Some(software))
            } else {
                (None, None)
            };
            let entries =
                self.level_entries(channel, 0, &sub_offsets[channel], desc, soft, resolution);
            next_ifd = self.write_ifd(entries, next_ifd)?;
        }

        // Patch the first-IFD pointer left as zero by create()
        self.file
            .seek(SeekFrom::Start(8))
            .map_err(|e| write_error(&self.path, &e))?;
        self.file
            .write_all(&next_ifd.to_le_bytes())
            .map_err(|e| write_error(&self.path, &e))?;
        self.file.flush().map_err(|e| write_error(&self.path, &e))?;

        debug!(path = %self.path.display(), first_ifd = next_ifd, "finished OME-TIFF output");
        Ok(())
    }

    /// Build the entry list for one (channel, level) IFD.
    ///
    /// `sub_ifds` is non-empty only for main IFDs with reduced levels;
    /// `description` and `software` only for the very first IFD.
    fn level_entries(
        &self,
        channel: usize,
        level: usize,
        sub_ifds: &[u64],
        description: Option<&str>,
        software: Option<&str>,
        resolution: Option<(f64, f64)>,
    ) -> Vec<TagEntry> {
        let plane = &self.levels[level];
        let subfile_type = if level == 0 { 0 } else { SUBFILE_REDUCED_IMAGE };

        let mut offsets = Vec::with_capacity(self.tiles[channel][level].len());
        let mut byte_counts = Vec::with_capacity(self.tiles[channel][level].len());
        for &(offset, count) in &self.tiles[channel][level] {
            offsets.push(offset);
            byte_counts.push(count);
        }

        let mut entries = vec![
            TagEntry::new(TiffTag::NewSubfileType, TagValue::Long(subfile_type)),
            TagEntry::new(TiffTag::ImageWidth, TagValue::Long(plane.width)),
            TagEntry::new(TiffTag::ImageLength, TagValue::Long(plane.height)),
            TagEntry::new(TiffTag::BitsPerSample, TagValue::Short(8)),
            TagEntry::new(
                TiffTag::Compression,
                TagValue::Short(Compression::Jpeg.as_u16()),
            ),
            TagEntry::new(
                TiffTag::PhotometricInterpretation,
                TagValue::Short(PHOTOMETRIC_MIN_IS_BLACK),
            ),
            TagEntry::new(TiffTag::SamplesPerPixel, TagValue::Short(1)),
            TagEntry::new(TiffTag::TileWidth, TagValue::Long(self.options.tile_size)),
            TagEntry::new(TiffTag::TileLength, TagValue::Long(self.options.tile_size)),
            TagEntry::new(TiffTag::TileOffsets, TagValue::Long8Array(offsets)),
            TagEntry::new(TiffTag::TileByteCounts, TagValue::Long8Array(byte_counts)),
        ];

        if let Some(text) = description {
            entries.push(TagEntry::new(
                TiffTag::ImageDescription,
                TagValue::Ascii(text.to_string()),
            ));
        }
        if let Some(text) = software {
            entries.push(TagEntry::new(
                TiffTag::Software,
                TagValue::Ascii(text.to_string()),
            ));
        }
        if let Some((mpp_x, mpp_y)) = resolution {
            // Micrometers per pixel scale with the level downsample, so
            // pixels per centimeter shrink by the same factor
            let downsample = self.levels[0].width as f64 / plane.width as f64;
            entries.push(TagEntry::new(
                TiffTag::XResolution,
                resolution_rational(10_000.0 / (mpp_x * downsample)),
            ));
            entries.push(TagEntry::new(
                TiffTag::YResolution,
                resolution_rational(10_000.0 / (mpp_y * downsample)),
            ));
            entries.push(TagEntry::new(
                TiffTag::ResolutionUnit,
                TagValue::Short(RESOLUTION_UNIT_CM),
            ));
        }
        if !sub_ifds.is_empty() {
            entries.push(TagEntry::new(
                TiffTag::SubIFDs,
                TagValue::Long8Array(sub_ifds.to_vec()),
            ));
        }

        entries
    }

    /// Serialize one IFD: external values first, then the sorted entry
    /// table with its trailing next-IFD pointer. Returns the IFD offset.
    fn write_ifd(&mut self, mut entries: Vec<TagEntry>, next_ifd: u64) -> Result<u64, OmeError> {
        entries.sort_by_key(|e| e.tag.as_u16());

        let mut external_offsets: Vec<Option<u64>> = Vec::with_capacity(entries.len());
        for entry in &entries {
            match entry.value.external_bytes() {
                Some(bytes) => {
                    self.align()?;
                    external_offsets.push(Some(self.position));
                    self.write_bytes(&bytes)?;
                }
                None => external_offsets.push(None),
            }
        }

        self.align()?;
        let ifd_offset = self.position;

        self.write_bytes(&(entries.len() as u64).to_le_bytes())?;
        for (entry, external) in entries.iter().zip(&external_offsets) {
            let (field_type, count) = entry.value.type_and_count();
            let mut record = [0u8; 20];
            record[0..2].copy_from_slice(&entry.tag.as_u16().to_le_bytes());
            record[2..4].copy_from_slice(&(field_type as u16).to_le_bytes());
            record[4..12].copy_from_slice(&count.to_le_bytes());
            record[12..20].copy_from_slice(&entry.value.value_field(*external));
            self.write_bytes(&record)?;
        }
        self.write_bytes(&next_ifd.to_le_bytes())?;

        Ok(ifd_offset)
    }

    /// Pad with zero bytes to the next 8-byte boundary.
    fn align(&mut self) -> Result<(), OmeError> {
        let rem = (self.position % 8) as usize;
        if rem != 0 {
            let pad = [0u8; 8];
            self.write_bytes(&pad[..8 - rem])?;
        }
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), OmeError> {
        self.file
            .write_all(bytes)
            .map_err(|e| write_error(&self.path, &e))?;
        self.position += bytes.len() as u64;
        Ok(())
    }
}

/// Resolution in pixels per centimeter as a TIFF rational, keeping two
/// decimal places.
fn resolution_rational(pixels_per_cm: f64) -> TagValue {
    TagValue::Rational((pixels_per_cm * 100.0).round() as u32, 100)
}

fn write_error(path: &Path, err: &std::io::Error) -> OmeError {
    OmeError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

// =============================================================================
// Tests
// =============================================================================
