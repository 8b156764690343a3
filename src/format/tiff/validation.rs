//! Structural checks on parsed pyramids.
//!
//! Slide files arrive from many scanners and export tools, and not all of
//! them are convertible. This module inspects a parsed [`TiffPyramid`] and
//! rejects files the converter cannot handle before any pixels are read:
//!
//! - strip-organized images (the readers only do tiled access),
//! - compression schemes with no decoder here (LZW, Deflate, old-style
//!   JPEG),
//! - levels missing TileOffsets/TileByteCounts,
//! - zero-sized tiles.
//!
//! Oddities that are survivable (huge tiles, JPEG levels without a
//! JPEGTables tag) come back as warnings so the CLI can log them and
//! continue.

use crate::error::TiffError;

use super::pyramid::{PyramidLevel, TiffPyramid};
use super::tags::Compression;

/// Outcome of validating a pyramid or one of its levels.
///
/// Errors make the file unconvertible; warnings are logged and ignored.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// False once any error has been recorded.
    pub is_valid: bool,

    /// Fatal problems, in discovery order.
    pub errors: Vec<ValidationError>,

    /// Non-fatal oddities worth surfacing in logs.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// A clean result with no findings.
    pub fn ok() -> Self {
        ValidationResult {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// A result that failed with a single error.
    pub fn error(error: ValidationError) -> Self {
        ValidationResult {
            is_valid: false,
            errors: vec![error],
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.is_valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Fold warnings and errors from a per-level result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        for error in other.errors {
            self.add_error(error);
        }
        self.warnings.extend(other.warnings);
    }

    /// Collapse into a `Result`, surfacing the first error as a
    /// [`TiffError`]. Warnings are discarded; callers that want them log
    /// before calling this.
    pub fn into_result(self) -> Result<(), TiffError> {
        match self.errors.into_iter().next() {
            None => Ok(()),
            Some(error) => Err(error.into()),
        }
    }
}

/// A single reason a file cannot be converted.
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// Image data is laid out in strips rather than tiles.
    StripOrganization { ifd_index: usize },

    /// Compression scheme this crate has no decoder for.
    UnsupportedCompression {
        ifd_index: usize,
        compression: u16,
        compression_name: String,
    },

    /// Tile geometry tags present but offsets/byte-counts missing.
    MissingTileTags {
        ifd_index: usize,
        missing_tags: Vec<&'static str>,
    },

    /// The file parsed but produced no usable pyramid levels.
    NoPyramidLevels,

    /// Tile dimensions that cannot describe real tiles.
    InvalidTileDimensions {
        ifd_index: usize,
        tile_width: u32,
        tile_height: u32,
        message: String,
    },
}

impl From<ValidationError> for TiffError {
    fn from(error: ValidationError) -> Self {
        match error {
            ValidationError::StripOrganization { .. } => TiffError::StripOrganization,
            ValidationError::UnsupportedCompression {
                compression_name, ..
            } => TiffError::UnsupportedCompression(compression_name),
            ValidationError::MissingTileTags { missing_tags, .. } => {
                TiffError::MissingTag(missing_tags.first().copied().unwrap_or("TileOffsets"))
            }
            ValidationError::NoPyramidLevels => {
                TiffError::MissingTag("No valid pyramid levels found")
            }
            ValidationError::InvalidTileDimensions { message, .. } => TiffError::InvalidTagValue {
                tag: "TileWidth/TileLength",
                message,
            },
        }
    }
}

/// Validate one pyramid level.
///
/// Checks decoder availability for the level's compression, presence of
/// tile data entries, and sane tile dimensions. A JPEG level without a
/// JPEGTables tag only warns, since some writers put full tables in every
/// tile stream.
pub fn validate_level(level: &PyramidLevel) -> ValidationResult {
    let mut result = ValidationResult::ok();

    match Compression::from_u16(level.compression) {
        Some(compression) if compression.is_supported() => {}
        Some(compression) => result.add_error(ValidationError::UnsupportedCompression {
            ifd_index: level.ifd_index,
            compression: level.compression,
            compression_name: compression.name().to_string(),
        }),
        None => result.add_error(ValidationError::UnsupportedCompression {
            ifd_index: level.ifd_index,
            compression: level.compression,
            compression_name: format!("Unknown ({})", level.compression),
        }),
    }

    if !level.has_tile_data() {
        let mut missing = Vec::new();
        if level.tile_offsets_entry.is_none() {
            missing.push("TileOffsets");
        }
        if level.tile_byte_counts_entry.is_none() {
            missing.push("TileByteCounts");
        }
        result.add_error(ValidationError::MissingTileTags {
            ifd_index: level.ifd_index,
            missing_tags: missing,
        });
    }

    if level.tile_width == 0 || level.tile_height == 0 {
        result.add_error(ValidationError::InvalidTileDimensions {
            ifd_index: level.ifd_index,
            tile_width: level.tile_width,
            tile_height: level.tile_height,
            message: "Tile dimensions cannot be zero".to_string(),
        });
    } else if level.tile_width > 4096 || level.tile_height > 4096 {
        result.add_warning(format!(
            "Level {}: large tiles ({}x{}) will inflate the decoded-tile cache",
            level.level_index, level.tile_width, level.tile_height
        ));
    }

    if Compression::from_u16(level.compression) == Some(Compression::Jpeg)
        && level.jpeg_tables_entry.is_none()
    {
        result.add_warning(format!(
            "Level {}: no JPEGTables tag (tiles may carry inline tables)",
            level.level_index
        ));
    }

    result
}

/// Validate a whole parsed pyramid: at least one level, and every level
/// individually convertible.
pub fn validate_pyramid(pyramid: &TiffPyramid) -> ValidationResult {
    if pyramid.levels.is_empty() {
        return ValidationResult::error(ValidationError::NoPyramidLevels);
    }

    let mut result = ValidationResult::ok();
    for level in &pyramid.levels {
        result.merge(validate_level(level));
    }
    result
}
