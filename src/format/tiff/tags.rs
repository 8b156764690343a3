//! TIFF vocabulary: field types, tag IDs, compression codes.
//!
//! Shared by the parsers and the OME-TIFF writer. Only the subset of TIFF
//! that slide files actually use is defined; unknown tags and types are
//! skipped during parsing rather than treated as errors, since scanners
//! pack plenty of private tags into their files.

/// Data type of an IFD entry's value.
///
/// TIFF defines more (SBYTE, FLOAT, DOUBLE, ...) that never show up in
/// slide files or in anything this crate writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FieldType {
    /// Unsigned 8-bit integer.
    Byte = 1,

    /// 7-bit ASCII, NUL-terminated.
    Ascii = 2,

    /// Unsigned 16-bit integer.
    Short = 3,

    /// Unsigned 32-bit integer.
    Long = 4,

    /// Two u32s, numerator then denominator.
    Rational = 5,

    /// Opaque bytes (JPEGTables uses this).
    Undefined = 7,

    /// Unsigned 64-bit integer, BigTIFF only.
    Long8 = 16,
}

impl FieldType {
    const ALL: [FieldType; 7] = [
        FieldType::Byte,
        FieldType::Ascii,
        FieldType::Short,
        FieldType::Long,
        FieldType::Rational,
        FieldType::Undefined,
        FieldType::Long8,
    ];

    /// Size of one element of this type in bytes. Drives array sizing and
    /// the inline-vs-offset decision.
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::Undefined => 1,
            FieldType::Short => 2,
            FieldType::Long => 4,
            FieldType::Rational | FieldType::Long8 => 8,
        }
    }

    /// Look up a type by its wire value; `None` for types this crate does
    /// not handle.
    pub fn from_u16(value: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|t| *t as u16 == value)
    }

    /// Bytes available for inline values in a classic TIFF entry.
    pub const INLINE_THRESHOLD_TIFF: usize = 4;

    /// Bytes available for inline values in a BigTIFF entry.
    pub const INLINE_THRESHOLD_BIGTIFF: usize = 8;

    /// Whether `count` values of this type fit in the entry's value field
    /// instead of behind an offset.
    #[inline]
    pub fn fits_inline(self, count: u64, is_bigtiff: bool) -> bool {
        let threshold = if is_bigtiff {
            Self::INLINE_THRESHOLD_BIGTIFF
        } else {
            Self::INLINE_THRESHOLD_TIFF
        };
        self.size_in_bytes() as u64 * count <= threshold as u64
    }
}

/// The tag IDs this crate reads or writes, in numeric order.
///
/// Covers image structure, strip detection (strips are grounds for
/// rejection), tile placement, resolution metadata, the SubIFDs chain the
/// OME-TIFF writer emits, and the SVS JPEGTables mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum TiffTag {
    /// Subfile category; bit 0 marks reduced-resolution pyramid pages.
    NewSubfileType = 254,

    /// Image width in pixels.
    ImageWidth = 256,

    /// Image height in pixels.
    ImageLength = 257,

    /// Bits per channel.
    BitsPerSample = 258,

    /// Compression code; see [`Compression`].
    Compression = 259,

    /// Color model (RGB, YCbCr, grayscale, ...).
    PhotometricInterpretation = 262,

    /// Free-form description. SVS packs its vendor metadata here; the
    /// OME-TIFF writer puts the OME-XML document here.
    ImageDescription = 270,

    /// Strip placement; its presence (without tiles) marks a file this
    /// crate cannot read.
    StripOffsets = 273,

    /// Channels per pixel.
    SamplesPerPixel = 277,

    /// Rows per strip; strip organization marker.
    RowsPerStrip = 278,

    /// Strip lengths; strip organization marker.
    StripByteCounts = 279,

    /// Pixels per resolution unit, X axis.
    XResolution = 282,

    /// Pixels per resolution unit, Y axis.
    YResolution = 283,

    /// Chunky vs planar channel layout.
    PlanarConfiguration = 284,

    /// Meaning of the resolution rationals (2 = inch, 3 = centimeter).
    ResolutionUnit = 296,

    /// Writing software name and version.
    Software = 305,

    /// Tile width in pixels.
    TileWidth = 322,

    /// Tile height in pixels.
    TileLength = 323,

    /// File offset of each tile's payload.
    TileOffsets = 324,

    /// Length of each tile's payload.
    TileByteCounts = 325,

    /// Offsets of reduced-resolution sub-IFDs hanging off a main page.
    SubIFDs = 330,

    /// Shared quantization/Huffman tables for abbreviated JPEG tiles.
    JpegTables = 347,

    /// YCbCr chroma subsampling factors.
    YCbCrSubSampling = 530,
}

impl TiffTag {
    const ALL: [TiffTag; 23] = [
        TiffTag::NewSubfileType,
        TiffTag::ImageWidth,
        TiffTag::ImageLength,
        TiffTag::BitsPerSample,
        TiffTag::Compression,
        TiffTag::PhotometricInterpretation,
        TiffTag::ImageDescription,
        TiffTag::StripOffsets,
        TiffTag::SamplesPerPixel,
        TiffTag::RowsPerStrip,
        TiffTag::StripByteCounts,
        TiffTag::XResolution,
        TiffTag::YResolution,
        TiffTag::PlanarConfiguration,
        TiffTag::ResolutionUnit,
        TiffTag::Software,
        TiffTag::TileWidth,
        TiffTag::TileLength,
        TiffTag::TileOffsets,
        TiffTag::TileByteCounts,
        TiffTag::SubIFDs,
        TiffTag::JpegTables,
        TiffTag::YCbCrSubSampling,
    ];

    /// Look up a tag by its wire value; `None` for tags this crate
    /// ignores.
    pub fn from_u16(value: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|t| *t as u16 == value)
    }

    /// Numeric tag ID.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

/// ResolutionUnit value for centimeters.
pub const RESOLUTION_UNIT_CM: u16 = 3;

/// ResolutionUnit value for inches.
pub const RESOLUTION_UNIT_INCH: u16 = 2;

/// Compression codes seen in slide files.
///
/// Decodable: [`Jpeg`](Compression::Jpeg), the two Aperio JPEG 2000
/// variants, and [`None`](Compression::None). The rest are recognized so
/// validation can reject them by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Compression {
    /// Raw pixel data.
    None = 1,

    /// LZW; no decoder here.
    Lzw = 5,

    /// Original TIFF JPEG scheme; long deprecated, no decoder.
    OldJpeg = 6,

    /// Baseline JPEG.
    Jpeg = 7,

    /// Deflate/zlib; no decoder here.
    Deflate = 8,

    /// Adobe's Deflate code; no decoder here.
    AdobeDeflate = 32946,

    /// Aperio JPEG 2000, YCbCr colorspace.
    Jpeg2000Ycbcr = 33003,

    /// Aperio JPEG 2000, RGB colorspace.
    Jpeg2000Rgb = 33005,
}

impl Compression {
    const ALL: [Compression; 8] = [
        Compression::None,
        Compression::Lzw,
        Compression::OldJpeg,
        Compression::Jpeg,
        Compression::Deflate,
        Compression::AdobeDeflate,
        Compression::Jpeg2000Ycbcr,
        Compression::Jpeg2000Rgb,
    ];

    /// Look up a code's enum value; `None` for codes not recognized at
    /// all.
    pub fn from_u16(value: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|c| *c as u16 == value)
    }

    /// Whether tiles with this compression can be decoded here.
    #[inline]
    pub const fn is_supported(self) -> bool {
        matches!(
            self,
            Compression::None
                | Compression::Jpeg
                | Compression::Jpeg2000Ycbcr
                | Compression::Jpeg2000Rgb
        )
    }

    /// Whether this is one of the JPEG 2000 variants.
    #[inline]
    pub const fn is_jpeg2000(self) -> bool {
        matches!(self, Compression::Jpeg2000Ycbcr | Compression::Jpeg2000Rgb)
    }

    /// Numeric compression code.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Name for error messages and the `info` command.
    pub const fn name(self) -> &'static str {
        match self {
            Compression::None => "None",
            Compression::Lzw => "LZW",
            Compression::OldJpeg => "Old JPEG",
            Compression::Jpeg => "JPEG",
            Compression::Deflate => "Deflate",
            Compression::AdobeDeflate => "Adobe Deflate",
            Compression::Jpeg2000Ycbcr => "JPEG 2000 (YCbCr)",
            Compression::Jpeg2000Rgb => "JPEG 2000 (RGB)",
        }
    }
}
