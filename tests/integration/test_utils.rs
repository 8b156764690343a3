//! Test utilities for integration tests.
//!
//! This module builds small but structurally complete slide files on disk:
//! tiled TIFF and BigTIFF pyramids with JPEG-compressed tiles, plus SVS-style
//! variants carrying Aperio metadata and abbreviated JPEG streams split
//! against a shared JPEGTables blob. It also provides helpers for re-parsing
//! generated OME-TIFF output at the byte level.

use std::path::PathBuf;

use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, Rgb, RgbImage};
use tempfile::TempDir;

use wsitk_utils::{Ifd, TiffHeader, TiffTag};

/// Tile edge used by every fixture pyramid.
pub const FIXTURE_TILE: u32 = 256;

/// JPEG quality used when encoding fixture tiles.
pub const FIXTURE_QUALITY: u8 = 90;

// =============================================================================
// Tile Pixel Content
// =============================================================================

/// Deterministic solid fill color for a tile, distinct per level and grid
/// position so tests can verify that pixels land where they should.
///
/// Fixtures stay within an 8x2 grid and two levels, which keeps every
/// component in u8 range with comfortable gaps between neighbors.
pub fn tile_color(level: u32, tile_x: u32, tile_y: u32) -> [u8; 3] {
    [
        (30 + 50 * level + 24 * tile_x) as u8,
        (60 + 40 * tile_y + 10 * tile_x) as u8,
        (220 - 40 * level - 20 * tile_x) as u8,
    ]
}

/// Encodes a solid-color RGB JPEG. Solid fills survive JPEG round trips
/// within a couple of code values, so tests can assert on pixel content.
pub fn solid_jpeg(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb(color));
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, FIXTURE_QUALITY)
        .encode_image(&img)
        .unwrap();
    buf
}

/// Asserts each channel of `actual` is within `tolerance` of `expected`.
pub fn assert_rgb_near(actual: [u8; 3], expected: [u8; 3], tolerance: u8, context: &str) {
    for c in 0..3 {
        let diff = actual[c].abs_diff(expected[c]);
        assert!(
            diff <= tolerance,
            "{}: channel {} expected {} within {}, got {} (diff {})",
            context,
            c,
            expected[c],
            tolerance,
            actual[c],
            diff
        );
    }
}

// =============================================================================
// JPEG Stream Splitting (SVS-style JPEGTables)
// =============================================================================

/// Splits a complete JPEG at the SOS marker. Returns the table segments
/// (everything between SOI and SOS) and the scan (SOS through the byte
/// before EOI).
fn split_at_sos(jpeg: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut pos = 2;
    while pos + 3 < jpeg.len() {
        assert_eq!(jpeg[pos], 0xFF, "expected marker at segment boundary");
        if jpeg[pos + 1] == 0xDA {
            return (jpeg[2..pos].to_vec(), jpeg[pos..jpeg.len() - 2].to_vec());
        }
        let len = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        pos += 2 + len;
    }
    panic!("no SOS marker in encoded JPEG");
}

/// Wraps table segments as a standalone JPEGTables blob: SOI + tables + EOI.
fn tables_blob(tables: &[u8]) -> Vec<u8> {
    let mut blob = vec![0xFF, 0xD8];
    blob.extend_from_slice(tables);
    blob.extend_from_slice(&[0xFF, 0xD9]);
    blob
}

/// Wraps a scan as an abbreviated stream: SOI + SOS/entropy data + EOI,
/// with no DQT or DHT segments of its own.
fn abbreviated_stream(scan: &[u8]) -> Vec<u8> {
    let mut stream = vec![0xFF, 0xD8];
    stream.extend_from_slice(scan);
    stream.extend_from_slice(&[0xFF, 0xD9]);
    stream
}

// =============================================================================
// Slide Fixture Builder
// =============================================================================

/// ImageDescription used by SVS fixtures. Mirrors the Aperio layout:
/// freeform header, then pipe-separated key = value pairs.
pub fn aperio_description(width: u32, height: u32) -> String {
    format!(
        "Aperio Image Library v12.0.15\r\n{w}x{h} [0,0 {w}x{h}] (256x256) JPEG/RGB Q=90\
         |AppMag = 20|MPP = 0.5|ScanScope ID = SS1302|Date = 12/29/09\
         |Time = 09:59:15|Filename = CASE-0042",
        w = width,
        h = height
    )
}

struct LevelSpec {
    width: u32,
    height: u32,
}

/// Builds tiled TIFF slide files in memory.
///
/// Layout is append-only: header, tile payloads, shared JPEGTables blob,
/// description text, per-level offset/bytecount arrays, then the IFD chain.
/// Little-endian only, classic or BigTIFF.
pub struct SlideFixtureBuilder {
    tile_size: u32,
    bigtiff: bool,
    description: Option<String>,
    split_tables: bool,
    sparse: Vec<(usize, u32, u32)>,
    levels: Vec<LevelSpec>,
}

impl SlideFixtureBuilder {
    pub fn new() -> Self {
        Self {
            tile_size: FIXTURE_TILE,
            bigtiff: false,
            description: None,
            split_tables: false,
            sparse: Vec::new(),
            levels: Vec::new(),
        }
    }

    /// Writes a BigTIFF header and 8-byte offsets instead of classic TIFF.
    pub fn bigtiff(mut self) -> Self {
        self.bigtiff = true;
        self
    }

    /// Sets the ImageDescription of the first IFD.
    pub fn description(mut self, text: &str) -> Self {
        self.description = Some(text.to_string());
        self
    }

    /// Stores tile JPEGs as abbreviated streams with a shared JPEGTables
    /// entry per IFD, the way Aperio SVS files do.
    pub fn split_jpeg_tables(mut self) -> Self {
        self.split_tables = true;
        self
    }

    /// Records the given tile with a zero byte count, as scanners do for
    /// background regions they never captured.
    pub fn sparse_tile(mut self, level: usize, tile_x: u32, tile_y: u32) -> Self {
        self.sparse.push((level, tile_x, tile_y));
        self
    }

    /// Appends a pyramid level of the given full-resolution dimensions.
    pub fn level(mut self, width: u32, height: u32) -> Self {
        self.levels.push(LevelSpec { width, height });
        self
    }

    pub fn build(self) -> Vec<u8> {
        assert!(!self.levels.is_empty(), "fixture needs at least one level");
        let mut data = Vec::new();

        // Header with a first-IFD offset placeholder, patched at the end.
        if self.bigtiff {
            data.extend_from_slice(b"II");
            push_u16(&mut data, 43);
            push_u16(&mut data, 8);
            push_u16(&mut data, 0);
            push_u64(&mut data, 0);
        } else {
            data.extend_from_slice(b"II");
            push_u16(&mut data, 42);
            push_u32(&mut data, 0);
        }

        // Tile payloads, remembering (offset, byte count) per tile.
        let mut shared_tables: Option<Vec<u8>> = None;
        let mut tile_locs: Vec<Vec<(u64, u64)>> = Vec::new();
        for (li, spec) in self.levels.iter().enumerate() {
            let tiles_x = spec.width.div_ceil(self.tile_size);
            let tiles_y = spec.height.div_ceil(self.tile_size);
            let mut locs = Vec::new();
            for ty in 0..tiles_y {
                for tx in 0..tiles_x {
                    if self.sparse.contains(&(li, tx, ty)) {
                        locs.push((0, 0));
                        continue;
                    }
                    let jpeg =
                        solid_jpeg(self.tile_size, self.tile_size, tile_color(li as u32, tx, ty));
                    let payload = if self.split_tables {
                        let (tables, scan) = split_at_sos(&jpeg);
                        if shared_tables.is_none() {
                            shared_tables = Some(tables_blob(&tables));
                        }
                        abbreviated_stream(&scan)
                    } else {
                        jpeg
                    };
                    locs.push((data.len() as u64, payload.len() as u64));
                    data.extend_from_slice(&payload);
                }
            }
            tile_locs.push(locs);
        }

        // Shared JPEGTables blob, referenced from every level's IFD.
        let tables_loc = shared_tables.map(|blob| {
            align(&mut data, self.bigtiff);
            let off = data.len() as u64;
            let len = blob.len() as u64;
            data.extend_from_slice(&blob);
            (off, len)
        });

        // NUL-terminated description text.
        let desc_loc = self.description.as_ref().map(|text| {
            align(&mut data, self.bigtiff);
            let off = data.len() as u64;
            data.extend_from_slice(text.as_bytes());
            data.push(0);
            (off, text.len() as u64 + 1)
        });

        // Entry tables per level. Offset/bytecount arrays land in the data
        // area here; the IFDs themselves are written after their offsets
        // are known.
        let mut level_entries: Vec<Vec<(u16, u16, u64, u64)>> = Vec::new();
        for (li, spec) in self.levels.iter().enumerate() {
            let offsets: Vec<u64> = tile_locs[li].iter().map(|&(off, _)| off).collect();
            let counts: Vec<u64> = tile_locs[li].iter().map(|&(_, len)| len).collect();
            let offsets_entry = tile_array_entry(&mut data, 324, &offsets, self.bigtiff);
            let counts_entry = tile_array_entry(&mut data, 325, &counts, self.bigtiff);

            let mut entries = vec![
                (256, 4, 1, spec.width as u64),
                (257, 4, 1, spec.height as u64),
                (258, 3, 1, 8),
                (259, 3, 1, 7),
                (262, 3, 1, 6),
            ];
            if li == 0 {
                if let Some((off, len)) = desc_loc {
                    entries.push((270, 2, len, off));
                }
            }
            entries.push((277, 3, 1, 3));
            entries.push((322, 4, 1, self.tile_size as u64));
            entries.push((323, 4, 1, self.tile_size as u64));
            entries.push(offsets_entry);
            entries.push(counts_entry);
            if let Some((off, len)) = tables_loc {
                entries.push((347, 7, len, off));
            }
            level_entries.push(entries);
        }

        // IFD chain offsets are computable up front since entry counts are
        // fixed: classic IFDs are 2 + 12n + 4 bytes, BigTIFF 8 + 20n + 8.
        align(&mut data, self.bigtiff);
        let mut ifd_offsets = Vec::new();
        let mut next = data.len() as u64;
        for entries in &level_entries {
            ifd_offsets.push(next);
            next += if self.bigtiff {
                8 + entries.len() as u64 * 20 + 8
            } else {
                2 + entries.len() as u64 * 12 + 4
            };
        }

        for (li, entries) in level_entries.iter().enumerate() {
            let next_ifd = ifd_offsets.get(li + 1).copied().unwrap_or(0);
            write_ifd(&mut data, entries, next_ifd, self.bigtiff);
        }

        // Patch the header to point at the first IFD.
        if self.bigtiff {
            data[8..16].copy_from_slice(&ifd_offsets[0].to_le_bytes());
        } else {
            data[4..8].copy_from_slice(&(ifd_offsets[0] as u32).to_le_bytes());
        }
        data
    }
}

fn push_u16(data: &mut Vec<u8>, value: u16) {
    data.extend_from_slice(&value.to_le_bytes());
}

fn push_u32(data: &mut Vec<u8>, value: u32) {
    data.extend_from_slice(&value.to_le_bytes());
}

fn push_u64(data: &mut Vec<u8>, value: u64) {
    data.extend_from_slice(&value.to_le_bytes());
}

fn align(data: &mut Vec<u8>, bigtiff: bool) {
    let boundary = if bigtiff { 8 } else { 2 };
    while data.len() % boundary != 0 {
        data.push(0);
    }
}

/// Builds a TileOffsets/TileByteCounts entry. Values that fit the inline
/// field are packed there; larger arrays are appended to the data area and
/// referenced by offset.
fn tile_array_entry(
    data: &mut Vec<u8>,
    tag: u16,
    values: &[u64],
    bigtiff: bool,
) -> (u16, u16, u64, u64) {
    let (field_type, value_size, inline_size) = if bigtiff { (16, 8, 8) } else { (4, 4, 4) };
    if values.len() * value_size <= inline_size {
        return (tag, field_type, values.len() as u64, values[0]);
    }
    align(data, bigtiff);
    let off = data.len() as u64;
    for &value in values {
        if bigtiff {
            push_u64(data, value);
        } else {
            push_u32(data, value as u32);
        }
    }
    (tag, field_type, values.len() as u64, off)
}

fn write_ifd(data: &mut Vec<u8>, entries: &[(u16, u16, u64, u64)], next: u64, bigtiff: bool) {
    if bigtiff {
        push_u64(data, entries.len() as u64);
    } else {
        push_u16(data, entries.len() as u16);
    }
    for &(tag, field_type, count, value) in entries {
        push_u16(data, tag);
        push_u16(data, field_type);
        if bigtiff {
            push_u64(data, count);
            push_u64(data, value);
        } else {
            push_u32(data, count as u32);
            push_u32(data, value as u32);
        }
    }
    if bigtiff {
        push_u64(data, next);
    } else {
        push_u32(data, next as u32);
    }
}

// =============================================================================
// Canned Fixtures
// =============================================================================

/// Single-level 768x256 generic tiled TIFF: a 3x1 grid of 256px tiles.
pub fn small_slide() -> Vec<u8> {
    SlideFixtureBuilder::new().level(768, 256).build()
}

/// Two-level generic pyramid: 2048x512 base (8x2 tiles) with a 1024x256
/// half-resolution level (4x1 tiles).
pub fn pyramid_slide() -> Vec<u8> {
    SlideFixtureBuilder::new()
        .level(2048, 512)
        .level(1024, 256)
        .build()
}

/// The two-level pyramid dressed as an Aperio SVS: pipe-separated metadata
/// in the first ImageDescription and abbreviated JPEG streams with a shared
/// JPEGTables entry.
pub fn svs_slide() -> Vec<u8> {
    SlideFixtureBuilder::new()
        .level(2048, 512)
        .level(1024, 256)
        .description(&aperio_description(2048, 512))
        .split_jpeg_tables()
        .build()
}

/// Writes fixture bytes into a temp dir and returns the file path.
pub fn write_slide(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

// =============================================================================
// Output Re-parsing Helpers
// =============================================================================

/// Parses the TIFF header of generated output.
pub fn parse_header(data: &[u8]) -> TiffHeader {
    TiffHeader::parse(data, data.len() as u64).unwrap()
}

/// Parses the IFD at the given file offset.
pub fn parse_ifd_at(data: &[u8], offset: u64, header: &TiffHeader) -> Ifd {
    let start = offset as usize;
    let count = Ifd::read_entry_count(&data[start..], header).unwrap();
    let size = Ifd::calculate_size(count, header);
    Ifd::parse(&data[start..start + size], header).unwrap()
}

/// Reads all values of an integer-typed entry, following the value offset
/// into the file when the payload does not fit inline.
pub fn entry_values(data: &[u8], ifd: &Ifd, tag: TiffTag, header: &TiffHeader) -> Option<Vec<u64>> {
    let entry = ifd.get_entry_by_tag(tag)?;
    let size = match entry.field_type_raw {
        1 | 2 | 7 => 1,
        3 => 2,
        4 => 4,
        16 => 8,
        other => panic!("unhandled field type {} for tag {:?}", other, tag),
    };
    let total = size * entry.count as usize;
    let bytes: Vec<u8> = if entry.is_inline {
        entry.value_offset_bytes[..total].to_vec()
    } else {
        let off = entry.value_offset(header.byte_order) as usize;
        data[off..off + total].to_vec()
    };
    let values = bytes
        .chunks_exact(size)
        .map(|chunk| match size {
            1 => chunk[0] as u64,
            2 => header.byte_order.read_u16(chunk) as u64,
            4 => header.byte_order.read_u32(chunk) as u64,
            _ => header.byte_order.read_u64(chunk),
        })
        .collect();
    Some(values)
}

/// Reads the first value of an integer-typed entry.
pub fn entry_u64(data: &[u8], ifd: &Ifd, tag: TiffTag, header: &TiffHeader) -> Option<u64> {
    entry_values(data, ifd, tag, header).and_then(|values| values.first().copied())
}

/// Reads a RATIONAL entry as (numerator, denominator).
pub fn entry_rational(
    data: &[u8],
    ifd: &Ifd,
    tag: TiffTag,
    header: &TiffHeader,
) -> Option<(u32, u32)> {
    let entry = ifd.get_entry_by_tag(tag)?;
    assert_eq!(entry.field_type_raw, 5, "expected RATIONAL for tag {:?}", tag);
    let bytes: Vec<u8> = if entry.is_inline {
        entry.value_offset_bytes[..8].to_vec()
    } else {
        let off = entry.value_offset(header.byte_order) as usize;
        data[off..off + 8].to_vec()
    };
    Some((
        header.byte_order.read_u32(&bytes[0..4]),
        header.byte_order.read_u32(&bytes[4..8]),
    ))
}

/// Reads an ASCII entry, trimming the NUL terminator.
pub fn entry_text(data: &[u8], ifd: &Ifd, tag: TiffTag, header: &TiffHeader) -> Option<String> {
    let entry = ifd.get_entry_by_tag(tag)?;
    assert_eq!(entry.field_type_raw, 2, "expected ASCII for tag {:?}", tag);
    let len = entry.count as usize;
    let bytes: Vec<u8> = if entry.is_inline {
        entry.value_offset_bytes[..len].to_vec()
    } else {
        let off = entry.value_offset(header.byte_order) as usize;
        data[off..off + len].to_vec()
    };
    Some(
        String::from_utf8_lossy(&bytes)
            .trim_end_matches('\0')
            .to_string(),
    )
}

/// Decodes a single-channel JPEG tile from generated OME-TIFF output.
pub fn decode_gray_jpeg(data: &[u8]) -> GrayImage {
    image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
        .unwrap()
        .to_luma8()
}
