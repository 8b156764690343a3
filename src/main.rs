//! wsitk-utils - Whole Slide Image conversion tools.
//!
//! This binary dispatches the CLI subcommands to the conversion pipelines.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsitk_utils::{
    config::{Cli, Command, InfoArgs, ToOmeTiffArgs, ToZarrArgs},
    convert::{convert_to_ome_tiff, convert_to_zarr, OmeTiffConvertOptions, ZarrConvertOptions},
    format::tiff::Compression,
    slide::Slide,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    if let Err(e) = cli.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    match cli.command {
        Command::ToZarr(args) => run_to_zarr(args).await,
        Command::ToOmeTiff(args) => run_to_ome_tiff(args).await,
        Command::Info(args) => run_info(args).await,
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsitk_utils=debug"
    } else {
        "wsitk_utils=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// =============================================================================
// to-zarr Command
// =============================================================================

async fn run_to_zarr(args: ToZarrArgs) -> ExitCode {
    let slide = match Slide::open(&args.input).await {
        Ok(slide) => slide,
        Err(e) => {
            error!("Failed to open {}: {}", args.input.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let options = ZarrConvertOptions {
        crop: args.crop_mode(),
        band_size: args.band_size,
    };

    match convert_to_zarr(&slide, &args.output, &options).await {
        Ok(store) => {
            info!("Wrote {}", store.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Conversion failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// to-ome-tiff Command
// =============================================================================

async fn run_to_ome_tiff(args: ToOmeTiffArgs) -> ExitCode {
    let slide = match Slide::open(&args.input).await {
        Ok(slide) => slide,
        Err(e) => {
            error!("Failed to open {}: {}", args.input.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let options = OmeTiffConvertOptions {
        crop: args.crop_mode(),
        quality: args.quality,
        tile_size: args.tile_size,
    };

    match convert_to_ome_tiff(&slide, &args.output, &options).await {
        Ok(path) => {
            info!("Wrote {}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Conversion failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// info Command
// =============================================================================

async fn run_info(args: InfoArgs) -> ExitCode {
    let slide = match Slide::open(&args.input).await {
        Ok(slide) => slide,
        Err(e) => {
            error!("Failed to open {}: {}", args.input.display(), e);
            return ExitCode::FAILURE;
        }
    };

    if args.json {
        print_info_json(&slide)
    } else {
        print_info_text(&slide);
        ExitCode::SUCCESS
    }
}

/// Print the slide summary as pretty JSON.
fn print_info_json(slide: &Slide) -> ExitCode {
    let levels: Vec<_> = (0..slide.level_count())
        .filter_map(|level| slide.level_info(level))
        .collect();

    let doc = serde_json::json!({
        "path": slide.path(),
        "format": slide.format().name(),
        "bigtiff": slide.is_bigtiff(),
        "associated_images": slide.associated_image_count(),
        "info": slide.info(),
        "levels": levels,
    });

    match serde_json::to_string_pretty(&doc) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to serialize slide info: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Print the slide summary as human-readable text.
fn print_info_text(slide: &Slide) {
    let info = slide.info();

    println!("Slide: {}", slide.path().display());
    println!("═════════════════════════════════");
    println!();
    println!(
        "  Format:        {}{}",
        slide.format().name(),
        if slide.is_bigtiff() { " (BigTIFF)" } else { "" }
    );
    println!("  Dimensions:    {} x {}", info.width, info.height);
    println!("  Levels:        {}", info.level_count);
    println!("  Level step:    {}", info.magnification_step);

    if let (Some(mpp_x), Some(mpp_y)) = (info.mpp_x, info.mpp_y) {
        println!("  Pixel size:    {:.4} x {:.4} µm/px", mpp_x, mpp_y);
    }
    if let Some(power) = info.objective_power {
        println!("  Objective:     {}x", power);
    }
    if let Some(ref vendor) = info.vendor {
        println!("  Vendor:        {}", vendor);
    }

    let associated = slide.associated_image_count();
    if associated > 0 {
        println!("  Associated:    {} image(s)", associated);
    }

    println!();
    println!("Pyramid:");
    println!("─────────────────");
    for level in 0..slide.level_count() {
        if let Some(li) = slide.level_info(level) {
            let compression = Compression::from_u16(li.compression)
                .map(|c| c.name())
                .unwrap_or("unknown");
            println!(
                "  {:>2}: {:>6} x {:<6}  tiles {}x{} ({}x{} grid)  downsample {:>8.2}  {}",
                level,
                li.width,
                li.height,
                li.tile_width,
                li.tile_height,
                li.tiles_x,
                li.tiles_y,
                li.downsample,
                compression
            );
        }
    }

    if !info.properties.is_empty() {
        println!();
        println!("Properties:");
        println!("─────────────────");
        for (key, value) in &info.properties {
            println!("  {}: {}", key, value);
        }
    }
}
