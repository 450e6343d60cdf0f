//! Full-resolution export compositor
//!
//! The live preview works in display space; the export re-derives
//! everything at the photo's natural resolution. Destination points are
//! remapped out of display space, the homography is re-solved on the
//! remapped correspondences (projective transforms do not commute with the
//! display scaling), and the color filter runs against the full-resolution
//! overlay so no resampling error compounds into the line art.
//!
//! Any failure aborts the export as a whole; a partial file is never
//! written.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{ImageOutputFormat, RgbImage, RgbaImage};
use tracing::{debug, info};

use crate::correspondence::CorrespondenceSet;
use crate::error::ExportError;
use crate::filter::{apply_rules_parallel, FilterRules};
use crate::geometry::{ContainRect, Point};
use crate::homography::Homography;
use crate::metadata::MetadataService;
use crate::raster::{rasterize, RasterJob};

/// JPEG quality for exported rasters.
pub const EXPORT_JPEG_QUALITY: u8 = 90;

/// Everything the compositor needs, gathered from the controller and the
/// session at save time.
pub struct ExportRequest<'a> {
    /// Field photo at full natural resolution.
    pub photo: &'a RgbaImage,
    /// Original encoded photo bytes, used only for metadata extraction.
    pub photo_bytes: Option<&'a [u8]>,
    /// Cadastral overlay at full natural resolution.
    pub overlay: &'a RgbaImage,
    /// Source points in overlay-natural space, destination points in
    /// display space; canonical corner order in both.
    pub set: &'a CorrespondenceSet,
    /// Where the photo was rendered during alignment.
    pub display_rect: ContainRect,
    pub rules: &'a FilterRules,
    pub opacity: f64,
    /// Line-thickness dilation radius at export resolution; 0 disables.
    pub dilation_radius: u8,
}

/// Remap a destination point from display space into the photo's natural
/// pixel space: subtract the display offset, then scale.
pub fn display_to_export(p: Point, display_rect: &ContainRect, scale: f64) -> Point {
    Point::new(
        (p.x - display_rect.offset_x) * scale,
        (p.y - display_rect.offset_y) * scale,
    )
}

/// Composite the filtered, warped overlay onto the photo and flatten to
/// RGB. This reproduces the live preview at full image resolution.
pub fn compose(request: &ExportRequest<'_>) -> Result<RgbImage, ExportError> {
    let (src, dst_display) = request.set.pairs()?;

    if request.display_rect.width <= 0.0 {
        return Err(ExportError::DegenerateDisplayRect);
    }
    let scale = request.photo.width() as f64 / request.display_rect.width;
    let dst: [Point; 4] =
        dst_display.map(|p| display_to_export(p, &request.display_rect, scale));
    debug!(scale, "remapped destination points to export space");

    // Never reuse the display-resolution transform here.
    let transform = Homography::solve(&src, &dst)?;

    // Classify against the natural-resolution overlay buffer.
    let mut filtered = request.overlay.clone();
    let width = filtered.width();
    apply_rules_parallel(&mut filtered, width, request.rules);

    let job = RasterJob {
        overlay: &filtered,
        transform: &transform,
        opacity: request.opacity,
        dilation_radius: request.dilation_radius,
    };
    let warped = rasterize(&job, request.photo.width(), request.photo.height())?;

    // Source-over composite, then flatten.
    let mut out = RgbImage::new(request.photo.width(), request.photo.height());
    for (x, y, px) in out.enumerate_pixels_mut() {
        let base = request.photo.get_pixel(x, y).0;
        let over = warped.get_pixel(x, y).0;
        let alpha = over[3] as f64 / 255.0;
        for c in 0..3 {
            let blended = over[c] as f64 * alpha + base[c] as f64 * (1.0 - alpha);
            px.0[c] = blended.round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(out)
}

/// Encode the flattened raster as JPEG at the export quality.
fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, ExportError> {
    let mut bytes = Vec::new();
    let mut cursor = Cursor::new(&mut bytes);
    image.write_to(&mut cursor, ImageOutputFormat::Jpeg(quality))?;
    Ok(bytes)
}

/// Thread the source photo's metadata into freshly encoded bytes.
fn carry_metadata(
    service: &dyn MetadataService,
    photo_bytes: Option<&[u8]>,
    encoded: Vec<u8>,
) -> Vec<u8> {
    match photo_bytes.and_then(|bytes| service.extract(bytes)) {
        Some(block) => service.reinsert(block, encoded),
        None => encoded,
    }
}

/// Produce the final "with overlay" JPEG bytes.
pub fn export_with_overlay(
    request: &ExportRequest<'_>,
    metadata: &dyn MetadataService,
) -> Result<Vec<u8>, ExportError> {
    let flattened = compose(request)?;
    let encoded = encode_jpeg(&flattened, EXPORT_JPEG_QUALITY)?;
    Ok(carry_metadata(metadata, request.photo_bytes, encoded))
}

/// Re-encode the photo alone (no overlay), still carrying its metadata.
pub fn export_original(
    photo: &RgbaImage,
    photo_bytes: Option<&[u8]>,
    metadata: &dyn MetadataService,
) -> Result<Vec<u8>, ExportError> {
    let mut rgb = RgbImage::new(photo.width(), photo.height());
    for (x, y, px) in rgb.enumerate_pixels_mut() {
        let p = photo.get_pixel(x, y).0;
        px.0 = [p[0], p[1], p[2]];
    }
    let encoded = encode_jpeg(&rgb, EXPORT_JPEG_QUALITY)?;
    Ok(carry_metadata(metadata, photo_bytes, encoded))
}

/// Fixed filename convention distinguishing the two export flavors.
pub fn export_file_name(stem: &str, with_overlay: bool) -> String {
    if with_overlay {
        format!("{stem}_with_overlay.jpg")
    } else {
        format!("{stem}_original.jpg")
    }
}

/// Write export bytes under `out_dir` using the filename convention.
pub fn write_export(
    out_dir: &Path,
    stem: &str,
    with_overlay: bool,
    bytes: &[u8],
) -> Result<PathBuf, ExportError> {
    std::fs::create_dir_all(out_dir)?;
    let path = out_dir.join(export_file_name(stem, with_overlay));
    std::fs::write(&path, bytes)?;
    info!("wrote export to {}", path.display());
    Ok(path)
}
