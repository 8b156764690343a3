//! End-to-end OME-TIFF conversion tests.
//!
//! The generated files are re-parsed at the byte level: header, main IFD
//! chain, SubIFD pyramids, tag payloads, and decoded tile content.
//!
//! Tests verify:
//! - BigTIFF structure with one page per channel and SubIFD pyramids
//! - OME-XML document and Software tag on the first page only
//! - Resolution tags scaled per pyramid level, omitted without MPP
//! - Tiles decode to the expected grayscale channel planes
//! - Explicit crops change geometry and content

use tempfile::TempDir;

use wsitk_utils::{
    convert_to_ome_tiff, CropMode, Ifd, OmeTiffConvertOptions, Region, Slide, TiffHeader, TiffTag,
};

use super::test_utils::{
    decode_gray_jpeg, entry_rational, entry_text, entry_u64, entry_values, parse_header,
    parse_ifd_at, small_slide, svs_slide, tile_color, write_slide,
};

/// Converts the SVS fixture with a 128px tile grid and returns the bytes.
async fn convert_svs_fixture(crop: CropMode) -> Vec<u8> {
    let src_dir = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let path = write_slide(&src_dir, "case.svs", &svs_slide());
    let slide = Slide::open(&path).await.unwrap();

    let options = OmeTiffConvertOptions {
        crop,
        quality: 90,
        tile_size: 128,
    };
    let out = out_dir.path().join("out.ome.tiff");
    let written = convert_to_ome_tiff(&slide, &out, &options).await.unwrap();
    assert_eq!(written, out);

    std::fs::read(&out).unwrap()
}

/// Walks the main IFD chain from the header.
fn main_chain(data: &[u8], header: &TiffHeader) -> Vec<Ifd> {
    let mut ifds = Vec::new();
    let mut offset = header.first_ifd_offset;
    while offset != 0 {
        let ifd = parse_ifd_at(data, offset, header);
        offset = ifd.next_ifd_offset;
        ifds.push(ifd);
    }
    ifds
}

/// Reads the payload of one tile through the offset/bytecount arrays.
fn tile_payload(data: &[u8], ifd: &Ifd, header: &TiffHeader, index: usize) -> Vec<u8> {
    let offsets = entry_values(data, ifd, TiffTag::TileOffsets, header).unwrap();
    let counts = entry_values(data, ifd, TiffTag::TileByteCounts, header).unwrap();
    let off = offsets[index] as usize;
    let len = counts[index] as usize;
    data[off..off + len].to_vec()
}

fn assert_gray_near(actual: u8, expected: u8, tolerance: u8, context: &str) {
    let diff = actual.abs_diff(expected);
    assert!(
        diff <= tolerance,
        "{}: expected {} within {}, got {} (diff {})",
        context,
        expected,
        tolerance,
        actual,
        diff
    );
}

// =============================================================================
// File Structure
// =============================================================================

#[tokio::test]
async fn test_output_is_plane_separated_bigtiff() {
    let data = convert_svs_fixture(CropMode::Full).await;
    let header = parse_header(&data);
    assert!(header.is_bigtiff);

    let pages = main_chain(&data, &header);
    assert_eq!(pages.len(), 3, "one page per channel");

    for (channel, ifd) in pages.iter().enumerate() {
        let context = format!("channel {}", channel);
        assert_eq!(entry_u64(&data, ifd, TiffTag::ImageWidth, &header), Some(2048), "{context}");
        assert_eq!(entry_u64(&data, ifd, TiffTag::ImageLength, &header), Some(512), "{context}");
        assert_eq!(entry_u64(&data, ifd, TiffTag::NewSubfileType, &header), Some(0), "{context}");
        assert_eq!(entry_u64(&data, ifd, TiffTag::BitsPerSample, &header), Some(8), "{context}");
        assert_eq!(entry_u64(&data, ifd, TiffTag::Compression, &header), Some(7), "{context}");
        assert_eq!(
            entry_u64(&data, ifd, TiffTag::PhotometricInterpretation, &header),
            Some(1),
            "{context}"
        );
        assert_eq!(entry_u64(&data, ifd, TiffTag::SamplesPerPixel, &header), Some(1), "{context}");
        assert_eq!(entry_u64(&data, ifd, TiffTag::TileWidth, &header), Some(128), "{context}");
        assert_eq!(entry_u64(&data, ifd, TiffTag::TileLength, &header), Some(128), "{context}");

        // 2048x512 at 128px tiles is a 16x4 grid
        let offsets = entry_values(&data, ifd, TiffTag::TileOffsets, &header).unwrap();
        assert_eq!(offsets.len(), 64, "{context}");

        // Four reduced levels: 1024x256 down to 128x32
        let subs = entry_values(&data, ifd, TiffTag::SubIFDs, &header).unwrap();
        assert_eq!(subs.len(), 4, "{context}");
    }
}

#[tokio::test]
async fn test_subifds_hold_halved_pyramid() {
    let data = convert_svs_fixture(CropMode::Full).await;
    let header = parse_header(&data);
    let pages = main_chain(&data, &header);

    let subs = entry_values(&data, &pages[0], TiffTag::SubIFDs, &header).unwrap();
    let expected_dims = [(1024u64, 256u64), (512, 128), (256, 64), (128, 32)];
    for (index, &(width, height)) in expected_dims.iter().enumerate() {
        let sub = parse_ifd_at(&data, subs[index], &header);
        let context = format!("reduced level {}", index + 1);
        assert_eq!(entry_u64(&data, &sub, TiffTag::ImageWidth, &header), Some(width), "{context}");
        assert_eq!(
            entry_u64(&data, &sub, TiffTag::ImageLength, &header),
            Some(height),
            "{context}"
        );
        assert_eq!(
            entry_u64(&data, &sub, TiffTag::NewSubfileType, &header),
            Some(1),
            "{context}"
        );
        assert_eq!(sub.next_ifd_offset, 0, "{context} terminates its chain");
    }
}

// =============================================================================
// Embedded Metadata
// =============================================================================

#[tokio::test]
async fn test_ome_document_on_first_page_only() {
    let data = convert_svs_fixture(CropMode::Full).await;
    let header = parse_header(&data);
    let pages = main_chain(&data, &header);

    let xml = entry_text(&data, &pages[0], TiffTag::ImageDescription, &header).unwrap();
    assert!(xml.contains("<OME"));
    assert!(xml.contains("SizeX=\"2048\""));
    assert!(xml.contains("SizeY=\"512\""));
    assert!(xml.contains("SizeC=\"3\""));
    assert!(xml.contains("PhysicalSizeX=\"0.5\""));
    assert!(xml.contains("Model=\"SS1302\""));
    assert!(xml.contains("NominalMagnification=\"20\""));
    assert!(xml.contains("Name=\"20x\""));
    assert!(xml.contains("<AcquisitionDate>2009-12-29T09:59:15</AcquisitionDate>"));
    assert!(xml.contains("<Description>\"CASE-0042\"</Description>"));
    assert!(xml.contains("<MetadataOnly/>"));
    assert_eq!(xml.matches("<Channel ").count(), 3);

    let software = entry_text(&data, &pages[0], TiffTag::Software, &header).unwrap();
    assert!(software.contains("wsitk-utils"));

    for (channel, ifd) in pages.iter().enumerate().skip(1) {
        assert!(
            ifd.get_entry_by_tag(TiffTag::ImageDescription).is_none(),
            "channel {channel} should carry no description"
        );
        assert!(
            ifd.get_entry_by_tag(TiffTag::Software).is_none(),
            "channel {channel} should carry no software tag"
        );
    }
}

#[tokio::test]
async fn test_resolution_scales_down_the_pyramid() {
    let data = convert_svs_fixture(CropMode::Full).await;
    let header = parse_header(&data);
    let pages = main_chain(&data, &header);

    // 0.5 um/px is 20000 px/cm at full resolution
    assert_eq!(
        entry_rational(&data, &pages[0], TiffTag::XResolution, &header),
        Some((2_000_000, 100))
    );
    assert_eq!(
        entry_rational(&data, &pages[0], TiffTag::YResolution, &header),
        Some((2_000_000, 100))
    );
    assert_eq!(
        entry_u64(&data, &pages[0], TiffTag::ResolutionUnit, &header),
        Some(3),
        "centimeter unit"
    );

    let subs = entry_values(&data, &pages[0], TiffTag::SubIFDs, &header).unwrap();
    let half = parse_ifd_at(&data, subs[0], &header);
    assert_eq!(
        entry_rational(&data, &half, TiffTag::XResolution, &header),
        Some((1_000_000, 100))
    );
    // The deepest level is downsampled 16x
    let deepest = parse_ifd_at(&data, subs[3], &header);
    assert_eq!(
        entry_rational(&data, &deepest, TiffTag::XResolution, &header),
        Some((125_000, 100))
    );
}

#[tokio::test]
async fn test_no_resolution_without_mpp() {
    let src_dir = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let path = write_slide(&src_dir, "plain.tif", &small_slide());
    let slide = Slide::open(&path).await.unwrap();

    let out = out_dir.path().join("out.ome.tiff");
    convert_to_ome_tiff(&slide, &out, &OmeTiffConvertOptions::default())
        .await
        .unwrap();

    let data = std::fs::read(&out).unwrap();
    let header = parse_header(&data);
    let pages = main_chain(&data, &header);

    assert!(pages[0].get_entry_by_tag(TiffTag::XResolution).is_none());
    assert!(pages[0].get_entry_by_tag(TiffTag::YResolution).is_none());
    assert!(pages[0].get_entry_by_tag(TiffTag::ResolutionUnit).is_none());

    let xml = entry_text(&data, &pages[0], TiffTag::ImageDescription, &header).unwrap();
    assert!(xml.contains("SizeX=\"768\""));
    assert!(!xml.contains("PhysicalSizeX"));
    assert!(!xml.contains("<Instrument"));
}

// =============================================================================
// Pixel Content
// =============================================================================

#[tokio::test]
async fn test_tiles_decode_to_channel_planes() {
    let data = convert_svs_fixture(CropMode::Full).await;
    let header = parse_header(&data);
    let pages = main_chain(&data, &header);

    // Output tile (0,0) lies inside source tile (0,0); output tile (2,1)
    // covers source x 256..384, y 128..256, which is source tile (1,0).
    let plain = tile_color(0, 0, 0);
    let shifted = tile_color(0, 1, 0);

    for (channel, ifd) in pages.iter().enumerate() {
        let context = format!("channel {}", channel);

        let gray = decode_gray_jpeg(&tile_payload(&data, ifd, &header, 0));
        assert_eq!(gray.dimensions(), (128, 128), "{context}");
        assert_gray_near(gray.get_pixel(64, 64)[0], plain[channel], 6, &context);

        let gray = decode_gray_jpeg(&tile_payload(&data, ifd, &header, 18));
        assert_gray_near(gray.get_pixel(64, 64)[0], shifted[channel], 6, &context);
    }
}

#[tokio::test]
async fn test_explicit_crop_changes_geometry_and_content() {
    let data = convert_svs_fixture(CropMode::Explicit(Region::new(256, 128, 512, 256))).await;
    let header = parse_header(&data);
    let pages = main_chain(&data, &header);
    assert_eq!(pages.len(), 3);

    assert_eq!(entry_u64(&data, &pages[0], TiffTag::ImageWidth, &header), Some(512));
    assert_eq!(entry_u64(&data, &pages[0], TiffTag::ImageLength, &header), Some(256));

    // 512x256 at 128px tiles halves twice: 256x128 then 128x64
    let subs = entry_values(&data, &pages[0], TiffTag::SubIFDs, &header).unwrap();
    assert_eq!(subs.len(), 2);
    let last = parse_ifd_at(&data, subs[1], &header);
    assert_eq!(entry_u64(&data, &last, TiffTag::ImageWidth, &header), Some(128));
    assert_eq!(entry_u64(&data, &last, TiffTag::ImageLength, &header), Some(64));

    let xml = entry_text(&data, &pages[0], TiffTag::ImageDescription, &header).unwrap();
    assert!(xml.contains("SizeX=\"512\""));
    assert!(xml.contains("SizeY=\"256\""));

    // The crop origin lands in source tile (1,0), so the first output tile
    // of each channel now carries that tile's color.
    let expected = tile_color(0, 1, 0);
    for (channel, ifd) in pages.iter().enumerate() {
        let gray = decode_gray_jpeg(&tile_payload(&data, ifd, &header, 0));
        assert_gray_near(
            gray.get_pixel(64, 64)[0],
            expected[channel],
            6,
            &format!("channel {}", channel),
        );
    }
}
