//! ParcelAlign - cadastral overlay alignment and export
//!
//! This application takes a cadastral line drawing and a field photograph,
//! warps the drawing so saved correspondence points line up with the
//! photograph, isolates the drawing's line art with color filters, and
//! exports the composited result at the photograph's full resolution.

mod alignment;
mod config;
mod correspondence;
mod error;
mod export;
mod filter;
mod geometry;
mod homography;
mod metadata;
mod raster;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::alignment::AlignmentController;
use crate::correspondence::Mode;
use crate::export::ExportRequest;
use crate::geometry::ContainRect;
use crate::metadata::{ExifService, MetadataService, NoMetadata};

/// ParcelAlign - align a cadastral overlay to a field photo and export
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Session file describing images, correspondence points, and filters
    #[arg(short, long, default_value = "session.toml")]
    session: PathBuf,

    /// Output directory (overrides the session's export settings)
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// Export the photo alone, without the warped overlay
    #[arg(long)]
    original_only: bool,

    /// Skip EXIF metadata passthrough
    #[arg(long)]
    no_metadata: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("ParcelAlign v{}", env!("CARGO_PKG_VERSION"));

    let config = config::Config::load(&args.session)?;

    let photo_bytes = std::fs::read(&config.images.photo)
        .with_context(|| format!("Failed to read photo {:?}", config.images.photo))?;
    let photo = image::load_from_memory(&photo_bytes)
        .with_context(|| format!("Failed to decode photo {:?}", config.images.photo))?
        .to_rgba8();
    let overlay = image::open(&config.images.overlay)
        .with_context(|| format!("Failed to decode overlay {:?}", config.images.overlay))?
        .to_rgba8();

    info!(
        "Photo: {}x{}px, overlay: {}x{}px",
        photo.width(),
        photo.height(),
        overlay.width(),
        overlay.height()
    );

    // Rebuild the alignment state the saved display-space points refer to.
    let photo_rect = ContainRect::contain(
        config.display.surface_width,
        config.display.surface_height,
        photo.width() as f64,
        photo.height() as f64,
    );
    let mut controller = AlignmentController::new(
        overlay.width() as f64,
        overlay.height() as f64,
        photo_rect,
    );
    controller.set_visible(config.overlay.show_overlay);
    controller.set_opacity(config.overlay.opacity);
    controller.set_scale(config.alignment.scale);

    match config.alignment.mode {
        Mode::Manual => {
            if let Some(dest) = config.alignment.manual_dest {
                controller.restore_manual_dest(dest);
            }
        }
        Mode::Guided => {
            controller
                .restore_guided(
                    config.alignment.source.clone(),
                    config.alignment.dest.clone(),
                )
                .context("Session holds an invalid guided point state")?;
        }
    }

    let stem = config
        .export
        .stem
        .clone()
        .or_else(|| {
            config
                .images
                .photo
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "export".to_string());

    let out_dir = args
        .out_dir
        .or_else(|| config.export.out_dir.clone())
        .or_else(|| args.session.parent().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));

    let exif = ExifService;
    let none = NoMetadata;
    let metadata: &dyn MetadataService = if args.no_metadata { &none } else { &exif };

    let bytes = if args.original_only {
        export::export_original(&photo, Some(&photo_bytes), metadata)
            .context("Export aborted")?
    } else {
        let rules = config.filter_rules()?;
        let request = ExportRequest {
            photo: &photo,
            photo_bytes: Some(&photo_bytes),
            overlay: &overlay,
            set: controller.store().set(),
            display_rect: photo_rect,
            rules: &rules,
            opacity: controller.opacity(),
            dilation_radius: config.overlay.line_thickness,
        };
        export::export_with_overlay(&request, metadata).context("Export aborted")?
    };

    let path = export::write_export(&out_dir, &stem, !args.original_only, &bytes)?;
    info!("Done: {}", path.display());

    Ok(())
}
