//! End-to-end Zarr conversion tests.
//!
//! Tests verify:
//! - Store layout: .zgroup, .zattrs, per-level arrays, raw C-order chunks
//! - Pixel placement and zero padding inside chunk files
//! - Crop modes: full, explicit (clamped and rejected), auto fallback
//! - Slide resolution metadata carried into the group attributes
//! - Levels where the crop scales to nothing are dropped

use std::path::Path;

use tempfile::TempDir;

use wsitk_utils::{
    convert_to_zarr, ConvertError, CropMode, Region, Slide, ZarrConvertOptions,
};

use super::test_utils::{
    assert_rgb_near, pyramid_slide, small_slide, svs_slide, tile_color, write_slide,
};

/// Chunk edge the converter writes; chunks are always stored at full size.
const CHUNK_EDGE: u64 = 4096;

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

/// Reads one pixel out of a raw C-order (y, x, c) chunk file.
fn chunk_pixel(chunk: &[u8], x: u64, y: u64) -> [u8; 3] {
    let off = ((y * CHUNK_EDGE + x) * 3) as usize;
    [chunk[off], chunk[off + 1], chunk[off + 2]]
}

// =============================================================================
// Store Layout
// =============================================================================

#[tokio::test]
async fn test_store_layout_and_chunk_content() {
    let src_dir = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let path = write_slide(&src_dir, "plain.tif", &small_slide());
    let slide = Slide::open(&path).await.unwrap();

    // A band height below the level height exercises multi-band assembly
    // inside a single chunk.
    let options = ZarrConvertOptions {
        crop: CropMode::Full,
        band_size: 100,
    };
    let store = convert_to_zarr(&slide, out_dir.path(), &options).await.unwrap();

    assert_eq!(store, out_dir.path().join("pyramid_0.zarr"));
    assert!(store.is_dir());

    let group = read_json(&store.join(".zgroup"));
    assert_eq!(group["zarr_format"], 2);

    let attrs = read_json(&store.join(".zattrs"));
    assert_eq!(attrs["max_level"], 1);
    assert_eq!(attrs["channel_names"], serde_json::json!(["R", "G", "B"]));
    assert_eq!(attrs["dimension_names"], serde_json::json!(["y", "x", "c"]));
    assert_eq!(attrs["mpp_x"], serde_json::Value::Null);
    assert_eq!(attrs["objective_power"], serde_json::Value::Null);
    assert_eq!(attrs["mag_step"], 1);
    assert_eq!(attrs["extent"], serde_json::json!([[768], [256]]));

    let zarray = read_json(&store.join("0").join(".zarray"));
    assert_eq!(zarray["shape"], serde_json::json!([256, 768, 3]));
    assert_eq!(zarray["chunks"], serde_json::json!([4096, 4096, 3]));
    assert_eq!(zarray["dtype"], "|u1");
    assert_eq!(zarray["compressor"], serde_json::Value::Null);
    assert_eq!(zarray["filters"], serde_json::Value::Null);
    assert_eq!(zarray["fill_value"], 0);
    assert_eq!(zarray["order"], "C");
    assert_eq!(zarray["zarr_format"], 2);

    // One chunk covers the whole level and is stored at full chunk shape.
    let chunk = std::fs::read(store.join("0").join("0.0.0")).unwrap();
    assert_eq!(chunk.len() as u64, CHUNK_EDGE * CHUNK_EDGE * 3);

    assert_rgb_near(chunk_pixel(&chunk, 32, 32), tile_color(0, 0, 0), 4, "tile 0");
    assert_rgb_near(chunk_pixel(&chunk, 300, 100), tile_color(0, 1, 0), 4, "tile 1, band 2");
    assert_rgb_near(chunk_pixel(&chunk, 700, 200), tile_color(0, 2, 0), 4, "tile 2, band 3");
    assert_rgb_near(chunk_pixel(&chunk, 32, 250), tile_color(0, 0, 0), 4, "tile 0, band 3");

    // Beyond the array shape the chunk stays at the fill value.
    assert_eq!(chunk_pixel(&chunk, 800, 0), [0, 0, 0], "padding right of image");
    assert_eq!(chunk_pixel(&chunk, 0, 300), [0, 0, 0], "padding below image");
}

// =============================================================================
// Crop Modes
// =============================================================================

#[tokio::test]
async fn test_explicit_crop() {
    let src_dir = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let path = write_slide(&src_dir, "plain.tif", &small_slide());
    let slide = Slide::open(&path).await.unwrap();

    // Entirely inside tile (1,0).
    let options = ZarrConvertOptions {
        crop: CropMode::Explicit(Region::new(256, 64, 256, 128)),
        band_size: 100,
    };
    let store = convert_to_zarr(&slide, out_dir.path(), &options).await.unwrap();

    let attrs = read_json(&store.join(".zattrs"));
    assert_eq!(attrs["extent"], serde_json::json!([[256], [128]]));

    let zarray = read_json(&store.join("0").join(".zarray"));
    assert_eq!(zarray["shape"], serde_json::json!([128, 256, 3]));

    let chunk = std::fs::read(store.join("0").join("0.0.0")).unwrap();
    let expected = tile_color(0, 1, 0);
    assert_rgb_near(chunk_pixel(&chunk, 10, 10), expected, 4, "crop origin");
    assert_rgb_near(chunk_pixel(&chunk, 200, 100), expected, 4, "crop interior");
    assert_eq!(chunk_pixel(&chunk, 300, 0), [0, 0, 0], "padding right of crop");
}

#[tokio::test]
async fn test_explicit_crop_clamps_to_image() {
    let src_dir = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let path = write_slide(&src_dir, "plain.tif", &small_slide());
    let slide = Slide::open(&path).await.unwrap();

    // Overhangs the right and bottom edges; only 128x128 remains.
    let options = ZarrConvertOptions {
        crop: CropMode::Explicit(Region::new(640, 128, 256, 256)),
        ..ZarrConvertOptions::default()
    };
    let store = convert_to_zarr(&slide, out_dir.path(), &options).await.unwrap();

    let attrs = read_json(&store.join(".zattrs"));
    assert_eq!(attrs["extent"], serde_json::json!([[128], [128]]));

    let chunk = std::fs::read(store.join("0").join("0.0.0")).unwrap();
    assert_rgb_near(chunk_pixel(&chunk, 50, 50), tile_color(0, 2, 0), 4, "clamped crop");
}

#[tokio::test]
async fn test_explicit_crop_outside_image_fails() {
    let src_dir = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let path = write_slide(&src_dir, "plain.tif", &small_slide());
    let slide = Slide::open(&path).await.unwrap();

    let options = ZarrConvertOptions {
        crop: CropMode::Explicit(Region::new(2000, 0, 10, 10)),
        ..ZarrConvertOptions::default()
    };
    let result = convert_to_zarr(&slide, out_dir.path(), &options).await;

    match result {
        Err(ConvertError::EmptyCrop { x0, width, .. }) => {
            assert_eq!(x0, 2000);
            assert_eq!(width, 10);
        }
        other => panic!("expected EmptyCrop, got {:?}", other.map(|p| p.display().to_string())),
    }
    assert!(
        !out_dir.path().join("pyramid_0.zarr").exists(),
        "no store should be created for a rejected crop"
    );
}

#[tokio::test]
async fn test_auto_crop_without_roi_converts_full_image() {
    let src_dir = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let path = write_slide(&src_dir, "plain.tif", &small_slide());
    let slide = Slide::open(&path).await.unwrap();

    let options = ZarrConvertOptions {
        crop: CropMode::Auto,
        ..ZarrConvertOptions::default()
    };
    let store = convert_to_zarr(&slide, out_dir.path(), &options).await.unwrap();

    let attrs = read_json(&store.join(".zattrs"));
    assert_eq!(attrs["extent"], serde_json::json!([[768], [256]]));
}

// =============================================================================
// Pyramids and Metadata
// =============================================================================

#[tokio::test]
async fn test_multilevel_store_carries_slide_metadata() {
    let src_dir = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let path = write_slide(&src_dir, "case.svs", &svs_slide());
    let slide = Slide::open(&path).await.unwrap();

    let store = convert_to_zarr(&slide, out_dir.path(), &ZarrConvertOptions::default())
        .await
        .unwrap();

    let attrs = read_json(&store.join(".zattrs"));
    assert_eq!(attrs["max_level"], 2);
    assert_eq!(attrs["mpp_x"], serde_json::json!(0.5));
    assert_eq!(attrs["mpp_y"], serde_json::json!(0.5));
    assert_eq!(attrs["mag_step"], 2);
    assert_eq!(attrs["objective_power"], serde_json::json!(20.0));
    assert_eq!(attrs["extent"], serde_json::json!([[2048, 1024], [512, 256]]));

    let zarray = read_json(&store.join("1").join(".zarray"));
    assert_eq!(zarray["shape"], serde_json::json!([256, 1024, 3]));

    let chunk = std::fs::read(store.join("1").join("0.0.0")).unwrap();
    assert_rgb_near(chunk_pixel(&chunk, 300, 100), tile_color(1, 1, 0), 4, "level 1 tile");
}

#[tokio::test]
async fn test_vanishing_crop_drops_tail_levels() {
    let src_dir = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let path = write_slide(&src_dir, "pyramid.tif", &pyramid_slide());
    let slide = Slide::open(&path).await.unwrap();

    // A 1x1 crop scales to nothing at level 1, so the pyramid ends early.
    let options = ZarrConvertOptions {
        crop: CropMode::Explicit(Region::new(0, 0, 1, 1)),
        ..ZarrConvertOptions::default()
    };
    let store = convert_to_zarr(&slide, out_dir.path(), &options).await.unwrap();

    let attrs = read_json(&store.join(".zattrs"));
    assert_eq!(attrs["max_level"], 1);
    assert_eq!(attrs["extent"], serde_json::json!([[1], [1]]));

    assert!(store.join("0").join(".zarray").exists());
    assert!(!store.join("1").exists(), "vanished level should not be written");

    let chunk = std::fs::read(store.join("0").join("0.0.0")).unwrap();
    assert_rgb_near(chunk_pixel(&chunk, 0, 0), tile_color(0, 0, 0), 4, "single pixel");
}
