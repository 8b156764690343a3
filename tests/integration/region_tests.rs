//! Region reading integration tests.
//!
//! Tests verify:
//! - Reads within a tile and across tile boundaries assemble correctly
//! - Reads past the level edge pad with white
//! - Level selection and resampling in scaled reads

use tempfile::TempDir;

use wsitk_utils::{read_region, read_region_scaled, Region, Slide};

use super::test_utils::{assert_rgb_near, pyramid_slide, tile_color, write_slide};

async fn open_pyramid(dir: &TempDir) -> Slide {
    let path = write_slide(dir, "pyramid.tif", &pyramid_slide());
    Slide::open(&path).await.unwrap()
}

// =============================================================================
// Direct Region Reads
// =============================================================================

#[tokio::test]
async fn test_read_within_single_tile() {
    let dir = TempDir::new().unwrap();
    let slide = open_pyramid(&dir).await;

    let img = read_region(&slide, 0, Region::new(32, 32, 64, 64)).await.unwrap();

    assert_eq!(img.dimensions(), (64, 64));
    let expected = tile_color(0, 0, 0);
    assert_rgb_near(img.get_pixel(0, 0).0, expected, 4, "top-left");
    assert_rgb_near(img.get_pixel(32, 32).0, expected, 4, "center");
    assert_rgb_near(img.get_pixel(63, 63).0, expected, 4, "bottom-right");
}

#[tokio::test]
async fn test_read_across_tile_boundary() {
    let dir = TempDir::new().unwrap();
    let slide = open_pyramid(&dir).await;

    // x 192..320 spans tiles (0,0) and (1,0); the seam lands at output x 64.
    let img = read_region(&slide, 0, Region::new(192, 0, 128, 64)).await.unwrap();

    assert_eq!(img.dimensions(), (128, 64));
    assert_rgb_near(img.get_pixel(16, 16).0, tile_color(0, 0, 0), 4, "left of seam");
    assert_rgb_near(img.get_pixel(112, 16).0, tile_color(0, 1, 0), 4, "right of seam");
}

#[tokio::test]
async fn test_read_across_row_boundary() {
    let dir = TempDir::new().unwrap();
    let slide = open_pyramid(&dir).await;

    // y 192..320 spans tile rows 0 and 1 of column 3.
    let img = read_region(&slide, 0, Region::new(800, 192, 64, 128)).await.unwrap();

    assert_rgb_near(img.get_pixel(32, 16).0, tile_color(0, 3, 0), 4, "upper row");
    assert_rgb_near(img.get_pixel(32, 112).0, tile_color(0, 3, 1), 4, "lower row");
}

#[tokio::test]
async fn test_read_past_edge_pads_white() {
    let dir = TempDir::new().unwrap();
    let slide = open_pyramid(&dir).await;

    // Only the top-left 64x64 quadrant is inside the 2048x512 level.
    let img = read_region(&slide, 0, Region::new(1984, 448, 128, 128)).await.unwrap();

    assert_eq!(img.dimensions(), (128, 128));
    assert_rgb_near(img.get_pixel(16, 16).0, tile_color(0, 7, 1), 4, "inside corner");
    assert_eq!(img.get_pixel(100, 16).0, [255, 255, 255], "past right edge");
    assert_eq!(img.get_pixel(16, 100).0, [255, 255, 255], "past bottom edge");
    assert_eq!(img.get_pixel(100, 100).0, [255, 255, 255], "past both edges");
}

#[tokio::test]
async fn test_read_empty_region() {
    let dir = TempDir::new().unwrap();
    let slide = open_pyramid(&dir).await;

    let img = read_region(&slide, 0, Region::new(0, 0, 0, 50)).await.unwrap();

    assert_eq!(img.dimensions(), (0, 50));
}

#[tokio::test]
async fn test_read_level_one() {
    let dir = TempDir::new().unwrap();
    let slide = open_pyramid(&dir).await;

    let img = read_region(&slide, 1, Region::new(300, 100, 50, 50)).await.unwrap();

    assert_rgb_near(img.get_pixel(25, 25).0, tile_color(1, 1, 0), 4, "level 1 tile (1,0)");
}

// =============================================================================
// Scaled Region Reads
// =============================================================================

#[tokio::test]
async fn test_scaled_read_uses_exact_level() {
    let dir = TempDir::new().unwrap();
    let slide = open_pyramid(&dir).await;

    // Factor 2 maps exactly onto level 1, so no resampling happens.
    let img = read_region_scaled(&slide, Region::new(0, 0, 512, 256), 256, 128)
        .await
        .unwrap();

    assert_eq!(img.dimensions(), (256, 128));
    let expected = tile_color(1, 0, 0);
    assert_rgb_near(img.get_pixel(50, 50).0, expected, 4, "exact level pixel");
    assert_rgb_near(img.get_pixel(200, 100).0, expected, 4, "exact level pixel");
}

#[tokio::test]
async fn test_scaled_read_resamples_from_nearest_level() {
    let dir = TempDir::new().unwrap();
    let slide = open_pyramid(&dir).await;

    // Factor 4 has no exact level; level 1 (factor 2) is read and halved.
    let img = read_region_scaled(&slide, Region::new(0, 0, 1024, 512), 256, 128)
        .await
        .unwrap();

    assert_eq!(img.dimensions(), (256, 128));
    assert_rgb_near(img.get_pixel(60, 60).0, tile_color(1, 0, 0), 6, "left half");
    assert_rgb_near(img.get_pixel(200, 60).0, tile_color(1, 1, 0), 6, "right half");
}

#[tokio::test]
async fn test_scaled_read_upscales_from_base() {
    let dir = TempDir::new().unwrap();
    let slide = open_pyramid(&dir).await;

    // Requests finer than the base level fall back to level 0 and upscale.
    let img = read_region_scaled(&slide, Region::new(0, 0, 100, 100), 200, 200)
        .await
        .unwrap();

    assert_eq!(img.dimensions(), (200, 200));
    assert_rgb_near(img.get_pixel(100, 100).0, tile_color(0, 0, 0), 6, "upscaled pixel");
}
