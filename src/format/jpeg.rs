//! Abbreviated JPEG stream repair.
//!
//! Aperio tiles are usually "abbreviated" JPEG streams: the entropy-coded
//! scan is stored per tile, while the quantization (DQT) and Huffman (DHT)
//! tables every tile shares live once in the TIFF's JPEGTables tag.
//! Standard decoders reject such streams, so before decoding each tile the
//! two halves have to be spliced back together:
//!
//! ```text
//! JPEGTables:  SOI  DQT DHT ...  EOI
//! tile:        SOI  SOS <scan>   EOI
//! merged:      SOI  DQT DHT ...  SOS <scan>  EOI
//! ```
//!
//! Generic TIFF exports typically store complete streams, which pass
//! through untouched.

use bytes::{Bytes, BytesMut};

/// Start Of Image.
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// End Of Image.
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Define Huffman Table.
pub const DHT: [u8; 2] = [0xFF, 0xC4];

/// Define Quantization Table.
pub const DQT: [u8; 2] = [0xFF, 0xDB];

/// Start Of Scan.
pub const SOS: [u8; 2] = [0xFF, 0xDA];

/// Whether `data` is an abbreviated stream: SOI reaches SOS without any
/// DQT or DHT segment in between. Streams where no SOS is found at all
/// report `false`; they are broken rather than abbreviated.
pub fn is_abbreviated_stream(data: &[u8]) -> bool {
    if data.len() < 4 || data[0..2] != SOI {
        return false;
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }

        let marker = [data[pos], data[pos + 1]];
        if marker == DQT || marker == DHT {
            return false;
        }
        if marker == SOS {
            return true;
        }

        // Segments with payloads carry a big-endian length right after the
        // marker; standalone markers (fill, SOI, EOI) do not.
        if pos + 3 < data.len() && marker[1] != 0x00 && marker[1] != 0xD8 && marker[1] != 0xD9 {
            let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
            pos += 2 + length;
        } else {
            pos += 2;
        }
    }

    false
}

/// Whether `data` is a self-contained JPEG: starts with SOI and carries at
/// least one quantization table.
pub fn is_complete_stream(data: &[u8]) -> bool {
    if data.len() < 4 || data[0..2] != SOI {
        return false;
    }
    data[2..].windows(2).any(|w| w == DQT)
}

/// Splice a JPEGTables segment and an abbreviated tile stream into one
/// decodable JPEG.
///
/// The tables keep their leading SOI and lose their trailing EOI; the tile
/// loses its leading SOI and keeps its trailing EOI. Inputs missing those
/// markers are spliced as-is, which still yields the right structure.
pub fn merge_jpeg_tables(tables: &[u8], tile_data: &[u8]) -> Bytes {
    if tables.is_empty() {
        return Bytes::copy_from_slice(tile_data);
    }
    if tile_data.is_empty() {
        return Bytes::new();
    }

    let tables_end = match tables {
        [.., a, b] if [*a, *b] == EOI => tables.len() - 2,
        _ => tables.len(),
    };
    let tile_start = match tile_data {
        [a, b, ..] if [*a, *b] == SOI => 2,
        _ => 0,
    };

    let mut merged = BytesMut::with_capacity(tables_end + tile_data.len() - tile_start);
    merged.extend_from_slice(&tables[..tables_end]);
    merged.extend_from_slice(&tile_data[tile_start..]);
    merged.freeze()
}

/// Make a tile's JPEG payload decodable, merging in `tables` when the
/// stream is abbreviated. Complete streams and streams with no tables
/// available pass through unchanged.
pub fn prepare_tile_jpeg(tables: Option<&[u8]>, tile_data: &[u8]) -> Bytes {
    if is_complete_stream(tile_data) {
        return Bytes::copy_from_slice(tile_data);
    }

    match tables {
        Some(tables) if is_abbreviated_stream(tile_data) => merge_jpeg_tables(tables, tile_data),
        _ => Bytes::copy_from_slice(tile_data),
    }
}
