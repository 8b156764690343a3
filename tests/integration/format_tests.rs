//! Format detection and parsing integration tests.
//!
//! Tests verify:
//! - Generic tiled TIFF and BigTIFF files open with correct geometry
//! - SVS files are detected and their pipe-separated metadata is parsed
//! - Abbreviated JPEG streams decode against the shared JPEGTables blob
//! - Sparse tiles render white
//! - Label-sized IFDs are kept out of the pyramid

use tempfile::TempDir;

use wsitk_utils::{read_region, Region, Slide, SlideFormat};

use super::test_utils::{
    aperio_description, assert_rgb_near, pyramid_slide, small_slide, svs_slide, tile_color,
    write_slide, SlideFixtureBuilder,
};

// =============================================================================
// Generic TIFF Tests
// =============================================================================

#[tokio::test]
async fn test_generic_tiff_detected() {
    let dir = TempDir::new().unwrap();
    let path = write_slide(&dir, "plain.tif", &small_slide());

    let slide = Slide::open(&path).await.unwrap();

    assert_eq!(slide.format(), SlideFormat::GenericTiff);
    assert!(!slide.is_bigtiff());
    assert_eq!(slide.dimensions(), Some((768, 256)));
    assert_eq!(slide.level_count(), 1);
    assert_eq!(slide.tile_size(0), Some((256, 256)));
    assert_eq!(slide.tile_count(0), Some((3, 1)));

    let info = slide.info();
    assert_eq!(info.magnification_step, 1, "single level implies step 1");
    assert!(info.vendor.is_none());
    assert!(info.mpp_x.is_none());
}

#[tokio::test]
async fn test_generic_tiff_description_preserved() {
    let dir = TempDir::new().unwrap();
    let data = SlideFixtureBuilder::new()
        .level(768, 256)
        .description("brightfield export, batch 17")
        .build();
    let path = write_slide(&dir, "described.tif", &data);

    let slide = Slide::open(&path).await.unwrap();

    assert_eq!(slide.format(), SlideFormat::GenericTiff);
    let description = slide.info().description.as_deref().unwrap();
    assert!(
        description.contains("batch 17"),
        "description should survive: {description:?}"
    );
}

#[tokio::test]
async fn test_bigtiff_detected() {
    let dir = TempDir::new().unwrap();
    let data = SlideFixtureBuilder::new().bigtiff().level(768, 256).build();
    let path = write_slide(&dir, "big.tif", &data);

    let slide = Slide::open(&path).await.unwrap();

    assert!(slide.is_bigtiff());
    assert_eq!(slide.dimensions(), Some((768, 256)));
    assert_eq!(slide.tile_count(0), Some((3, 1)));

    // 8-byte offsets resolve to real tile data.
    let img = read_region(&slide, 0, Region::new(300, 64, 32, 32))
        .await
        .unwrap();
    assert_rgb_near(img.get_pixel(16, 16).0, tile_color(0, 1, 0), 4, "tile (1,0)");
}

// =============================================================================
// SVS Tests
// =============================================================================

#[tokio::test]
async fn test_svs_metadata_parsed() {
    let dir = TempDir::new().unwrap();
    let path = write_slide(&dir, "case.svs", &svs_slide());

    let slide = Slide::open(&path).await.unwrap();

    assert_eq!(slide.format(), SlideFormat::AperioSvs);
    let info = slide.info();
    assert_eq!(info.vendor.as_deref(), Some("Aperio"));
    assert_eq!(info.mpp_x, Some(0.5));
    assert_eq!(info.mpp_y, Some(0.5));
    assert_eq!(info.objective_power, Some(20.0));
    assert_eq!(info.magnification_step, 2);
    assert_eq!(
        info.properties.get("ScanScope ID").map(String::as_str),
        Some("SS1302")
    );
    assert_eq!(
        info.properties.get("Date").map(String::as_str),
        Some("12/29/09")
    );
    assert!(info
        .description
        .as_deref()
        .unwrap()
        .contains("Aperio Image Library"));
}

#[tokio::test]
async fn test_svs_abbreviated_tiles_decode() {
    let dir = TempDir::new().unwrap();
    let path = write_slide(&dir, "case.svs", &svs_slide());

    let slide = Slide::open(&path).await.unwrap();

    // Tiles are stored without DQT/DHT segments; decoding only works if the
    // shared JPEGTables blob was merged back in.
    let img = read_region(&slide, 0, Region::new(32, 32, 64, 64)).await.unwrap();
    assert_rgb_near(img.get_pixel(32, 32).0, tile_color(0, 0, 0), 4, "level 0 tile (0,0)");

    let img = read_region(&slide, 1, Region::new(600, 100, 32, 32)).await.unwrap();
    assert_rgb_near(img.get_pixel(16, 16).0, tile_color(1, 2, 0), 4, "level 1 tile (2,0)");
}

#[tokio::test]
async fn test_sparse_tile_renders_white() {
    let dir = TempDir::new().unwrap();
    let data = SlideFixtureBuilder::new()
        .level(2048, 512)
        .level(1024, 256)
        .description(&aperio_description(2048, 512))
        .split_jpeg_tables()
        .sparse_tile(0, 1, 0)
        .build();
    let path = write_slide(&dir, "sparse.svs", &data);

    let slide = Slide::open(&path).await.unwrap();

    // Zero byte count means background the scanner skipped.
    let img = read_region(&slide, 0, Region::new(300, 100, 32, 32)).await.unwrap();
    assert_eq!(img.get_pixel(16, 16).0, [255, 255, 255], "sparse tile should be white");

    // Neighboring tiles still carry their data.
    let img = read_region(&slide, 0, Region::new(32, 32, 32, 32)).await.unwrap();
    assert_rgb_near(img.get_pixel(16, 16).0, tile_color(0, 0, 0), 4, "tile (0,0)");
}

// =============================================================================
// Pyramid Structure Tests
// =============================================================================

#[tokio::test]
async fn test_pyramid_levels_and_downsamples() {
    let dir = TempDir::new().unwrap();
    let path = write_slide(&dir, "pyramid.tif", &pyramid_slide());

    let slide = Slide::open(&path).await.unwrap();

    assert_eq!(slide.level_count(), 2);
    assert_eq!(slide.level_dimensions(0), Some((2048, 512)));
    assert_eq!(slide.level_dimensions(1), Some((1024, 256)));
    assert_eq!(slide.level_downsample(0), Some(1.0));
    assert_eq!(slide.level_downsample(1), Some(2.0));
    assert_eq!(slide.tile_count(0), Some((8, 2)));
    assert_eq!(slide.tile_count(1), Some((4, 1)));

    assert_eq!(slide.best_level_for_downsample(1.0), Some(0));
    assert_eq!(slide.best_level_for_downsample(1.5), Some(0));
    assert_eq!(slide.best_level_for_downsample(2.0), Some(1));
    assert_eq!(slide.best_level_for_downsample(8.0), Some(1));
}

#[tokio::test]
async fn test_label_sized_ifd_excluded_from_pyramid() {
    let dir = TempDir::new().unwrap();
    // A squarish IFD under 1000px on both axes is an associated image, not
    // a pyramid level, regardless of its position in the chain.
    let data = SlideFixtureBuilder::new()
        .level(768, 256)
        .level(512, 512)
        .build();
    let path = write_slide(&dir, "labeled.tif", &data);

    let slide = Slide::open(&path).await.unwrap();

    assert_eq!(slide.level_count(), 1);
    assert_eq!(slide.dimensions(), Some((768, 256)));
    assert_eq!(slide.associated_image_count(), 1);
}
