//! Low-level TIFF structure: headers, IFDs, entries.
//!
//! A TIFF file opens with a small header naming the byte order, the
//! format generation (classic `42` or BigTIFF `43`), and the offset of
//! the first image file directory. Directories are fixed-size entry
//! tables chained through a trailing next-offset field:
//!
//! ```text
//!             classic          BigTIFF
//! count       u16              u64
//! entry       12 bytes each    20 bytes each
//! next IFD    u32              u64
//! ```
//!
//! An entry carries a tag ID, a field type, a value count, and a final
//! field that is either the value itself (when it fits) or the file
//! offset where the value lives. Everything here parses from in-memory
//! byte slices; the callers decide how those bytes get fetched.

use std::collections::HashMap;

use crate::error::TiffError;

use super::tags::{FieldType, TiffTag};

const MAGIC_II: u16 = 0x4949;
const MAGIC_MM: u16 = 0x4D4D;
const GENERATION_CLASSIC: u16 = 42;
const GENERATION_BIG: u16 = 43;

/// Classic TIFF header length.
pub const TIFF_HEADER_SIZE: usize = 8;

/// BigTIFF header length.
pub const BIGTIFF_HEADER_SIZE: usize = 16;

/// Ceiling on directory entry counts. A classic u16 count cannot pass
/// this; a BigTIFF claiming more is corrupt and would otherwise drive a
/// huge allocation.
const MAX_IFD_ENTRIES: u64 = 65_536;

/// Endianness declared by the file's first two bytes. Every multi-byte
/// integer after the magic is read through this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// "II" files.
    LittleEndian,
    /// "MM" files.
    BigEndian,
}

impl ByteOrder {
    /// Decode a u16 from the head of `bytes`. Panics if fewer than two
    /// bytes are given, same as the `from_*_bytes` constructors.
    #[inline]
    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        let b = [bytes[0], bytes[1]];
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes(b),
            ByteOrder::BigEndian => u16::from_be_bytes(b),
        }
    }

    /// Decode a u32 from the head of `bytes`.
    #[inline]
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        let b = [bytes[0], bytes[1], bytes[2], bytes[3]];
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(b),
            ByteOrder::BigEndian => u32::from_be_bytes(b),
        }
    }

    /// Decode a u64 from the head of `bytes`.
    #[inline]
    pub fn read_u64(self, bytes: &[u8]) -> u64 {
        let b = [
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ];
        match self {
            ByteOrder::LittleEndian => u64::from_le_bytes(b),
            ByteOrder::BigEndian => u64::from_be_bytes(b),
        }
    }
}

/// Decoded file header. Carries everything IFD parsing needs: the byte
/// order, the classic/BigTIFF switch that sets all the field widths, and
/// where the directory chain starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    pub byte_order: ByteOrder,
    pub is_bigtiff: bool,
    pub first_ifd_offset: u64,
}

impl TiffHeader {
    /// Decode a header from the first bytes of a file.
    ///
    /// Eight bytes suffice for classic TIFF; BigTIFF needs sixteen.
    /// `file_size` bounds the first IFD offset so a corrupt header fails
    /// here rather than as a short read later.
    pub fn parse(bytes: &[u8], file_size: u64) -> Result<Self, TiffError> {
        if bytes.len() < TIFF_HEADER_SIZE {
            return Err(TiffError::FileTooSmall {
                required: TIFF_HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        }

        // The magic is a byte pattern, not an endian-sensitive value, so
        // any fixed order works for matching it.
        let byte_order = match u16::from_le_bytes([bytes[0], bytes[1]]) {
            MAGIC_II => ByteOrder::LittleEndian,
            MAGIC_MM => ByteOrder::BigEndian,
            other => return Err(TiffError::InvalidMagic(other)),
        };

        match byte_order.read_u16(&bytes[2..4]) {
            GENERATION_CLASSIC => {
                let first_ifd_offset = byte_order.read_u32(&bytes[4..8]) as u64;
                if first_ifd_offset >= file_size {
                    return Err(TiffError::InvalidIfdOffset(first_ifd_offset));
                }
                Ok(TiffHeader {
                    byte_order,
                    is_bigtiff: false,
                    first_ifd_offset,
                })
            }
            GENERATION_BIG => {
                if bytes.len() < BIGTIFF_HEADER_SIZE {
                    return Err(TiffError::FileTooSmall {
                        required: BIGTIFF_HEADER_SIZE as u64,
                        actual: bytes.len() as u64,
                    });
                }

                // Offset width is nominally variable but 8 is the only
                // value the format ever defined.
                let offset_size = byte_order.read_u16(&bytes[4..6]);
                if offset_size != 8 {
                    return Err(TiffError::InvalidBigTiffOffsetSize(offset_size));
                }

                let first_ifd_offset = byte_order.read_u64(&bytes[8..16]);
                if first_ifd_offset >= file_size {
                    return Err(TiffError::InvalidIfdOffset(first_ifd_offset));
                }
                Ok(TiffHeader {
                    byte_order,
                    is_bigtiff: true,
                    first_ifd_offset,
                })
            }
            other => Err(TiffError::InvalidVersion(other)),
        }
    }

    /// Width of one directory entry: 12 bytes classic, 20 BigTIFF.
    #[inline]
    pub const fn ifd_entry_size(&self) -> usize {
        if self.is_bigtiff { 20 } else { 12 }
    }

    /// Width of the leading entry-count field: u16 classic, u64 BigTIFF.
    #[inline]
    pub const fn ifd_count_size(&self) -> usize {
        if self.is_bigtiff { 8 } else { 2 }
    }

    /// Width of the trailing next-IFD pointer.
    #[inline]
    pub const fn ifd_next_offset_size(&self) -> usize {
        if self.is_bigtiff { 8 } else { 4 }
    }

    /// Width of an entry's value/offset field, which is also the inline
    /// value capacity.
    #[inline]
    pub const fn value_offset_size(&self) -> usize {
        if self.is_bigtiff { 8 } else { 4 }
    }
}

/// One directory entry, kept close to its wire form.
///
/// Unrecognized field types leave `field_type` as `None`; the entry is
/// retained so its tag is still visible, it just cannot be decoded.
#[derive(Debug, Clone)]
pub struct IfdEntry {
    pub tag_id: u16,
    pub field_type: Option<FieldType>,
    pub field_type_raw: u16,
    pub count: u64,
    /// The raw value/offset field, 4 or 8 bytes per the file format.
    pub value_offset_bytes: Vec<u8>,
    /// True when the value sits in `value_offset_bytes` itself.
    pub is_inline: bool,
}

impl IfdEntry {
    /// Byte length of the full value array, or `None` when the field
    /// type is unknown.
    pub fn value_byte_size(&self) -> Option<u64> {
        self.field_type
            .map(|field_type| field_type.size_in_bytes() as u64 * self.count)
    }

    /// The value/offset field interpreted as a file offset. Only
    /// meaningful for out-of-line values.
    pub fn value_offset(&self, byte_order: ByteOrder) -> u64 {
        if self.value_offset_bytes.len() >= 8 {
            byte_order.read_u64(&self.value_offset_bytes)
        } else {
            byte_order.read_u32(&self.value_offset_bytes) as u64
        }
    }

    /// Single inline unsigned value widened to u64. `None` when the
    /// value is out of line, the count is not one, or the type is not an
    /// unsigned integer.
    pub fn inline_u64(&self, byte_order: ByteOrder) -> Option<u64> {
        if !self.is_inline || self.count != 1 {
            return None;
        }
        match self.field_type? {
            FieldType::Byte => self.value_offset_bytes.first().map(|b| *b as u64),
            FieldType::Short => Some(byte_order.read_u16(&self.value_offset_bytes) as u64),
            FieldType::Long => Some(byte_order.read_u32(&self.value_offset_bytes) as u64),
            FieldType::Long8 => Some(byte_order.read_u64(&self.value_offset_bytes)),
            _ => None,
        }
    }

    /// As [`inline_u64`](IfdEntry::inline_u64), additionally failing
    /// when the value overflows u32.
    pub fn inline_u32(&self, byte_order: ByteOrder) -> Option<u32> {
        self.inline_u64(byte_order).and_then(|v| u32::try_from(v).ok())
    }

    /// As [`inline_u64`](IfdEntry::inline_u64), narrowed to u16.
    pub fn inline_u16(&self, byte_order: ByteOrder) -> Option<u16> {
        self.inline_u64(byte_order).and_then(|v| u16::try_from(v).ok())
    }
}

/// A parsed directory: the entries in file order, a tag index over them,
/// and the chain pointer (zero at the end of the chain).
#[derive(Debug, Clone)]
pub struct Ifd {
    pub entries: Vec<IfdEntry>,
    pub entries_by_tag: HashMap<u16, usize>,
    pub next_ifd_offset: u64,
}

impl Ifd {
    pub fn empty() -> Self {
        Ifd {
            entries: Vec::new(),
            entries_by_tag: HashMap::new(),
            next_ifd_offset: 0,
        }
    }

    /// Decode just the leading entry count. Parsing an IFD takes two
    /// reads: this tells the caller how long the second one must be.
    pub fn read_entry_count(bytes: &[u8], header: &TiffHeader) -> Result<u64, TiffError> {
        let count_size = header.ifd_count_size();
        if bytes.len() < count_size {
            return Err(TiffError::FileTooSmall {
                required: count_size as u64,
                actual: bytes.len() as u64,
            });
        }

        let count = if header.is_bigtiff {
            header.byte_order.read_u64(bytes)
        } else {
            header.byte_order.read_u16(bytes) as u64
        };

        if count > MAX_IFD_ENTRIES {
            return Err(TiffError::InvalidTagValue {
                tag: "IFD",
                message: format!("entry count {} exceeds limit {}", count, MAX_IFD_ENTRIES),
            });
        }

        Ok(count)
    }

    /// Full byte length of a directory holding `entry_count` entries,
    /// count field and chain pointer included.
    pub fn calculate_size(entry_count: u64, header: &TiffHeader) -> usize {
        header.ifd_count_size()
            + entry_count as usize * header.ifd_entry_size()
            + header.ifd_next_offset_size()
    }

    /// Decode a directory. `bytes` must start at the entry count and run
    /// at least [`Ifd::calculate_size`] long.
    pub fn parse(bytes: &[u8], header: &TiffHeader) -> Result<Self, TiffError> {
        let entry_count = Self::read_entry_count(bytes, header)?;
        let required = Self::calculate_size(entry_count, header);
        if bytes.len() < required {
            return Err(TiffError::FileTooSmall {
                required: required as u64,
                actual: bytes.len() as u64,
            });
        }

        let byte_order = header.byte_order;
        let entry_size = header.ifd_entry_size();
        let value_field_size = header.value_offset_size();

        let mut entries = Vec::with_capacity(entry_count as usize);
        let mut entries_by_tag = HashMap::with_capacity(entry_count as usize);

        let mut pos = header.ifd_count_size();
        for index in 0..entry_count as usize {
            let entry_bytes = &bytes[pos..pos + entry_size];

            let tag_id = byte_order.read_u16(&entry_bytes[0..2]);
            let field_type_raw = byte_order.read_u16(&entry_bytes[2..4]);
            let field_type = FieldType::from_u16(field_type_raw);

            let (count, value_field_start) = if header.is_bigtiff {
                (byte_order.read_u64(&entry_bytes[4..12]), 12)
            } else {
                (byte_order.read_u32(&entry_bytes[4..8]) as u64, 8)
            };

            let value_offset_bytes =
                entry_bytes[value_field_start..value_field_start + value_field_size].to_vec();

            let is_inline = field_type
                .map(|ft| ft.fits_inline(count, header.is_bigtiff))
                .unwrap_or(false);

            entries_by_tag.insert(tag_id, index);
            entries.push(IfdEntry {
                tag_id,
                field_type,
                field_type_raw,
                count,
                value_offset_bytes,
                is_inline,
            });

            pos += entry_size;
        }

        let next_ifd_offset = if header.is_bigtiff {
            byte_order.read_u64(&bytes[pos..pos + 8])
        } else {
            byte_order.read_u32(&bytes[pos..pos + 4]) as u64
        };

        Ok(Ifd {
            entries,
            entries_by_tag,
            next_ifd_offset,
        })
    }

    pub fn get_entry_by_tag(&self, tag: TiffTag) -> Option<&IfdEntry> {
        self.get_entry_by_tag_id(tag.as_u16())
    }

    pub fn get_entry_by_tag_id(&self, tag_id: u16) -> Option<&IfdEntry> {
        self.entries_by_tag
            .get(&tag_id)
            .map(|&index| &self.entries[index])
    }

    /// Tile-organized page.
    pub fn is_tiled(&self) -> bool {
        self.get_entry_by_tag(TiffTag::TileOffsets).is_some()
            || self.get_entry_by_tag(TiffTag::TileWidth).is_some()
    }

    /// Strip-organized page.
    pub fn is_stripped(&self) -> bool {
        self.get_entry_by_tag(TiffTag::StripOffsets).is_some()
            || self.get_entry_by_tag(TiffTag::RowsPerStrip).is_some()
    }

    fn tag_u32(&self, tag: TiffTag, byte_order: ByteOrder) -> Option<u32> {
        self.get_entry_by_tag(tag)?.inline_u32(byte_order)
    }

    pub fn image_width(&self, byte_order: ByteOrder) -> Option<u32> {
        self.tag_u32(TiffTag::ImageWidth, byte_order)
    }

    pub fn image_height(&self, byte_order: ByteOrder) -> Option<u32> {
        self.tag_u32(TiffTag::ImageLength, byte_order)
    }

    pub fn tile_width(&self, byte_order: ByteOrder) -> Option<u32> {
        self.tag_u32(TiffTag::TileWidth, byte_order)
    }

    pub fn tile_height(&self, byte_order: ByteOrder) -> Option<u32> {
        self.tag_u32(TiffTag::TileLength, byte_order)
    }

    pub fn compression(&self, byte_order: ByteOrder) -> Option<u16> {
        self.get_entry_by_tag(TiffTag::Compression)?
            .inline_u16(byte_order)
    }

    pub fn samples_per_pixel(&self, byte_order: ByteOrder) -> Option<u16> {
        self.get_entry_by_tag(TiffTag::SamplesPerPixel)?
            .inline_u16(byte_order)
    }

    /// NewSubfileType, where bit 0 marks a reduced-resolution page.
    pub fn subfile_type(&self, byte_order: ByteOrder) -> Option<u32> {
        self.tag_u32(TiffTag::NewSubfileType, byte_order)
    }
}
