//! Command-line interface for wsitk-utils.
//!
//! This module defines the CLI surface via clap:
//! - `to-zarr` converts a slide to a pyramidal Zarr store
//! - `to-ome-tiff` converts a slide to a plane-separated OME-TIFF
//! - `info` prints slide structure and metadata
//!
//! # Example
//!
//! ```ignore
//! use wsitk_utils::config::{Cli, Command};
//! use clap::Parser;
//!
//! let cli = Cli::parse();
//! match cli.command {
//!     Command::ToZarr(args) => { /* convert */ }
//!     Command::ToOmeTiff(args) => { /* convert */ }
//!     Command::Info(args) => { /* inspect */ }
//! }
//! ```
//!
//! # Environment Variables
//!
//! Tuning options can also be set via environment variables with the
//! `WSITK_` prefix:
//!
//! - `WSITK_BAND_SIZE` - Band height for Zarr conversion (default: 1528)
//! - `WSITK_QUALITY` - JPEG quality for OME-TIFF tiles (default: 89)
//! - `WSITK_TILE_SIZE` - Tile edge length for OME-TIFF output (default: 512)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::convert::{CropMode, DEFAULT_BAND_SIZE};
use crate::ome::DEFAULT_TILE_SIZE;
use crate::slide::Region;
use crate::tile::DEFAULT_JPEG_QUALITY;

// =============================================================================
// CLI Arguments
// =============================================================================

/// wsitk-utils - Whole Slide Image conversion tools.
///
/// Converts WSI files (Aperio SVS, pyramidal TIFF) into analysis-friendly
/// pyramidal formats, with optional cropping to the tissue region.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsitk-utils")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Convert a whole slide image to a pyramidal Zarr store.
    ToZarr(ToZarrArgs),

    /// Convert a whole slide image to a plane-separated OME-TIFF.
    ToOmeTiff(ToOmeTiffArgs),

    /// Print slide structure and metadata.
    Info(InfoArgs),
}

/// Arguments for the `to-zarr` subcommand.
#[derive(Args, Debug, Clone)]
pub struct ToZarrArgs {
    /// Whole slide image to process.
    #[arg(long)]
    pub input: PathBuf,

    /// Destination directory; the store is created as
    /// `<output>/pyramid_0.zarr`.
    #[arg(long)]
    pub output: PathBuf,

    /// Crop to the tissue bounding box recorded by the scanner, when the
    /// slide provides one.
    #[arg(long, default_value_t = false, conflicts_with = "crop")]
    pub autocrop: bool,

    /// Region to crop, in level 0 pixels.
    #[arg(long, num_args = 4, value_names = ["X0", "Y0", "WIDTH", "HEIGHT"])]
    pub crop: Option<Vec<u32>>,

    /// Height of the horizontal bands read from the source.
    #[arg(long, default_value_t = DEFAULT_BAND_SIZE, env = "WSITK_BAND_SIZE")]
    pub band_size: u32,
}

/// Arguments for the `to-ome-tiff` subcommand.
#[derive(Args, Debug, Clone)]
pub struct ToOmeTiffArgs {
    /// Whole slide image to process.
    #[arg(long)]
    pub input: PathBuf,

    /// Destination OME-TIFF file path.
    #[arg(long)]
    pub output: PathBuf,

    /// Crop to the tissue bounding box recorded by the scanner, when the
    /// slide provides one.
    #[arg(long, default_value_t = false, conflicts_with = "crop")]
    pub autocrop: bool,

    /// Region to crop, in level 0 pixels.
    #[arg(long, num_args = 4, value_names = ["X0", "Y0", "WIDTH", "HEIGHT"])]
    pub crop: Option<Vec<u32>>,

    /// JPEG quality for output tiles (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "WSITK_QUALITY")]
    pub quality: u8,

    /// Output tile edge length in pixels (multiple of 16).
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "WSITK_TILE_SIZE")]
    pub tile_size: u32,
}

/// Arguments for the `info` subcommand.
#[derive(Args, Debug, Clone)]
pub struct InfoArgs {
    /// Whole slide image to inspect.
    #[arg(long)]
    pub input: PathBuf,

    /// Emit machine-readable JSON instead of text.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

// =============================================================================
// Validation and Conversion
// =============================================================================

impl Cli {
    /// Validate the arguments and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        match &self.command {
            Command::ToZarr(args) => args.validate(),
            Command::ToOmeTiff(args) => args.validate(),
            Command::Info(_) => Ok(()),
        }
    }
}

impl ToZarrArgs {
    /// Validate the arguments and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.band_size == 0 {
            return Err("band_size must be greater than 0".to_string());
        }
        validate_crop(self.crop.as_deref())
    }

    /// The crop mode these arguments select.
    pub fn crop_mode(&self) -> CropMode {
        crop_mode(self.autocrop, self.crop.as_deref())
    }
}

impl ToOmeTiffArgs {
    /// Validate the arguments and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.quality == 0 || self.quality > 100 {
            return Err("quality must be between 1 and 100".to_string());
        }

        // JPEG compresses in 16x16 macroblocks, and the TIFF spec requires
        // tile dimensions divisible by 16
        if self.tile_size == 0 || self.tile_size % 16 != 0 {
            return Err("tile_size must be a positive multiple of 16".to_string());
        }

        validate_crop(self.crop.as_deref())
    }

    /// The crop mode these arguments select.
    pub fn crop_mode(&self) -> CropMode {
        crop_mode(self.autocrop, self.crop.as_deref())
    }
}

/// Reject a repeated `--crop` flag (clap appends the second occurrence).
fn validate_crop(crop: Option<&[u32]>) -> Result<(), String> {
    match crop {
        Some(values) if values.len() != 4 => {
            Err("--crop takes exactly four values: X0 Y0 WIDTH HEIGHT".to_string())
        }
        _ => Ok(()),
    }
}

/// Map the shared `--autocrop` / `--crop` flags onto a [`CropMode`].
fn crop_mode(autocrop: bool, crop: Option<&[u32]>) -> CropMode {
    if autocrop {
        return CropMode::Auto;
    }
    match crop {
        Some([x0, y0, width, height]) => {
            CropMode::Explicit(Region::new(*x0, *y0, *width, *height))
        }
        _ => CropMode::Full,
    }
}

// =============================================================================
// Tests
// =============================================================================
