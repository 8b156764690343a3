//! Zarr v2 metadata documents.
//!
//! A Zarr v2 store is a directory tree: the group root holds `.zgroup` and
//! `.zattrs`, each array directory holds a `.zarray` document, and chunk
//! files live next to it named `<y>.<x>.<c>`. The structs here serialize
//! to the JSON documents consumers such as zarr-python expect.

use serde::Serialize;

/// Zarr storage specification version this writer produces.
pub const ZARR_FORMAT: u32 = 2;

/// Data type string for unsigned 8-bit samples.
///
/// The leading `|` marks byte order as irrelevant for single-byte types.
pub const DTYPE_U8: &str = "|u1";

/// Contents of a `.zgroup` document.
#[derive(Debug, Clone, Serialize)]
pub struct GroupMetadata {
    pub zarr_format: u32,
}

impl Default for GroupMetadata {
    fn default() -> Self {
        GroupMetadata {
            zarr_format: ZARR_FORMAT,
        }
    }
}

/// Contents of a `.zarray` document for an uncompressed `uint8` array.
///
/// `compressor` and `filters` stay `None` and serialize as JSON `null`,
/// which declares the chunks as raw C-order bytes.
#[derive(Debug, Clone, Serialize)]
pub struct ArrayMetadata {
    pub chunks: Vec<u64>,
    pub compressor: Option<()>,
    pub dtype: String,
    pub fill_value: u8,
    pub filters: Option<()>,
    pub order: String,
    pub shape: Vec<u64>,
    pub zarr_format: u32,
}

impl ArrayMetadata {
    /// Metadata for a `height x width x channels` image array.
    pub fn image(shape: [u64; 3], chunks: [u64; 3]) -> Self {
        ArrayMetadata {
            chunks: chunks.to_vec(),
            compressor: None,
            dtype: DTYPE_U8.to_string(),
            fill_value: 0,
            filters: None,
            order: "C".to_string(),
            shape: shape.to_vec(),
            zarr_format: ZARR_FORMAT,
        }
    }
}

/// Group attributes describing a converted slide pyramid.
///
/// `extent` holds one row of widths and one row of heights, indexed by
/// level. Resolution fields serialize as `null` when the source slide
/// does not record them.
#[derive(Debug, Clone, Serialize)]
pub struct PyramidAttrs {
    pub max_level: usize,
    pub channel_names: Vec<String>,
    pub dimension_names: Vec<String>,
    pub mpp_x: Option<f64>,
    pub mpp_y: Option<f64>,
    pub mag_step: u32,
    pub objective_power: Option<f64>,
    pub extent: [Vec<u32>; 2],
}

// =============================================================================
// Tests
// =============================================================================
