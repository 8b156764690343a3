//! Filesystem-backed Zarr v2 store writer.
//!
//! The writer produces the same layout zarr-python creates for an
//! uncompressed store: a group directory with `.zgroup` and `.zattrs`,
//! one subdirectory per array holding a `.zarray` document, and raw
//! C-order chunk files named `<y>.<x>.<c>`.
//!
//! Chunk files always hold the full chunk shape. Edge chunks are padded
//! with the fill value; readers ignore bytes past the array shape.

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{s, Array3, ArrayView3};
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::error::ZarrError;

use super::metadata::{ArrayMetadata, GroupMetadata};

// =============================================================================
// Group
// =============================================================================

/// Handle to a Zarr group directory.
pub struct ZarrGroup {
    path: PathBuf,
}

impl ZarrGroup {
    /// Create the group directory (and parents) and write its `.zgroup`.
    ///
    /// An existing directory is reused; metadata files are overwritten.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, ZarrError> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path).map_err(|e| store_io(&path, &e))?;

        let group = ZarrGroup { path };
        group.write_json(".zgroup", &GroupMetadata::default())?;
        Ok(group)
    }

    /// Path of the group directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the group's `.zattrs` document.
    pub fn set_attrs<T: Serialize>(&self, attrs: &T) -> Result<(), ZarrError> {
        self.write_json(".zattrs", attrs)
    }

    /// Create a `uint8` image array under this group.
    pub fn create_array(
        &self,
        name: &str,
        shape: [u64; 3],
        chunks: [u64; 3],
    ) -> Result<ZarrArrayWriter, ZarrError> {
        ZarrArrayWriter::create(&self.path, name, shape, chunks)
    }

    fn write_json<T: Serialize>(&self, file: &str, value: &T) -> Result<(), ZarrError> {
        let doc =
            serde_json::to_vec_pretty(value).map_err(|e| ZarrError::Metadata(e.to_string()))?;
        let path = self.path.join(file);
        fs::write(&path, doc).map_err(|e| store_io(&path, &e))
    }
}

// =============================================================================
// Array Writer
// =============================================================================

/// Writer for a single chunked `uint8` image array with YXC axes.
///
/// Pixel bands are written top to bottom with [`write_rows`]; each call
/// reads, updates, and rewrites every chunk the band intersects, so bands
/// should be written once and in order.
///
/// [`write_rows`]: Self::write_rows
pub struct ZarrArrayWriter {
    path: PathBuf,
    shape: [u64; 3],
    chunks: [u64; 3],
}

impl ZarrArrayWriter {
    fn create(
        group: &Path,
        name: &str,
        shape: [u64; 3],
        chunks: [u64; 3],
    ) -> Result<Self, ZarrError> {
        // One chunk spans the whole channel axis, keeping chunk ids `<y>.<x>.0`
        let chunks = [chunks[0], chunks[1], shape[2]];

        let path = group.join(name);
        fs::create_dir_all(&path).map_err(|e| store_io(&path, &e))?;

        let doc = serde_json::to_vec_pretty(&ArrayMetadata::image(shape, chunks))
            .map_err(|e| ZarrError::Metadata(e.to_string()))?;
        let zarray = path.join(".zarray");
        fs::write(&zarray, doc).map_err(|e| store_io(&zarray, &e))?;

        debug!(array = name, ?shape, ?chunks, "created zarr array");
        Ok(ZarrArrayWriter {
            path,
            shape,
            chunks,
        })
    }

    /// Array shape as `[height, width, channels]`.
    pub fn shape(&self) -> [u64; 3] {
        self.shape
    }

    /// Chunk shape as `[height, width, channels]`.
    pub fn chunks(&self) -> [u64; 3] {
        self.chunks
    }

    /// Path of the array directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a horizontal band of pixels starting at array row `y0`.
    ///
    /// The band must span the full array width. Chunks touched by the band
    /// are updated in parallel.
    pub fn write_rows(&self, y0: u64, band: &image::RgbImage) -> Result<(), ZarrError> {
        let band_h = band.height() as u64;
        let band_w = band.width() as u64;
        if band_h == 0 {
            return Ok(());
        }
        if band_w != self.shape[1] {
            return Err(ZarrError::ShapeMismatch {
                message: format!(
                    "band width {} does not match array width {}",
                    band_w, self.shape[1]
                ),
            });
        }
        if y0 + band_h > self.shape[0] {
            return Err(ZarrError::OutOfBounds {
                message: format!(
                    "rows {}..{} exceed array height {}",
                    y0,
                    y0 + band_h,
                    self.shape[0]
                ),
            });
        }

        let band_view = ArrayView3::from_shape(
            (band_h as usize, band_w as usize, self.shape[2] as usize),
            band.as_raw(),
        )
        .map_err(|e| ZarrError::ShapeMismatch {
            message: format!("band buffer does not match its dimensions: {}", e),
        })?;

        let chunk_y0 = y0 / self.chunks[0];
        let chunk_y1 = (y0 + band_h - 1) / self.chunks[0];
        let chunk_cols = self.shape[1].div_ceil(self.chunks[1]);

        let mut targets = Vec::new();
        for chunk_y in chunk_y0..=chunk_y1 {
            for chunk_x in 0..chunk_cols {
                targets.push((chunk_y, chunk_x));
            }
        }

        targets
            .par_iter()
            .try_for_each(|&(chunk_y, chunk_x)| self.update_chunk(chunk_y, chunk_x, y0, &band_view))
    }

    /// Read-modify-write one chunk with the rows the band covers.
    fn update_chunk(
        &self,
        chunk_y: u64,
        chunk_x: u64,
        band_y0: u64,
        band: &ArrayView3<'_, u8>,
    ) -> Result<(), ZarrError> {
        let [chunk_h, chunk_w, _] = self.chunks;
        let path = self.path.join(format!("{}.{}.0", chunk_y, chunk_x));

        // Array rows this chunk and the band both cover
        let band_y1 = band_y0 + band.shape()[0] as u64;
        let row0 = (chunk_y * chunk_h).max(band_y0);
        let row1 = ((chunk_y + 1) * chunk_h).min(band_y1).min(self.shape[0]);

        // Array columns this chunk covers
        let col0 = chunk_x * chunk_w;
        let col1 = ((chunk_x + 1) * chunk_w).min(self.shape[1]);
        if row0 >= row1 || col0 >= col1 {
            return Ok(());
        }

        let mut chunk = self.load_chunk(&path)?;

        let dst_r0 = (row0 - chunk_y * chunk_h) as usize;
        let dst_r1 = (row1 - chunk_y * chunk_h) as usize;
        let dst_c1 = (col1 - col0) as usize;
        let src_r0 = (row0 - band_y0) as usize;
        let src_r1 = (row1 - band_y0) as usize;

        chunk
            .slice_mut(s![dst_r0..dst_r1, ..dst_c1, ..])
            .assign(&band.slice(s![src_r0..src_r1, col0 as usize..col1 as usize, ..]));

        fs::write(&path, chunk.into_raw_vec()).map_err(|e| store_io(&path, &e))
    }

    /// Load an existing chunk file, or a fresh fill-value chunk.
    fn load_chunk(&self, path: &Path) -> Result<Array3<u8>, ZarrError> {
        let dims = (
            self.chunks[0] as usize,
            self.chunks[1] as usize,
            self.chunks[2] as usize,
        );
        let expected = dims.0 * dims.1 * dims.2;

        match fs::read(path) {
            Ok(bytes) if bytes.len() == expected => Array3::from_shape_vec(dims, bytes)
                .map_err(|e| ZarrError::ShapeMismatch {
                    message: e.to_string(),
                }),
            Ok(bytes) => Err(ZarrError::ShapeMismatch {
                message: format!(
                    "chunk file {} has {} bytes, expected {}",
                    path.display(),
                    bytes.len(),
                    expected
                ),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Array3::zeros(dims)),
            Err(e) => Err(store_io(path, &e)),
        }
    }
}

fn store_io(path: &Path, err: &std::io::Error) -> ZarrError {
    ZarrError::StoreIo {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

// =============================================================================
// Tests
// =============================================================================
