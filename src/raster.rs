//! Rasterizer for the warped overlay
//!
//! Pure function from {overlay RGBA buffer, projective transform, opacity,
//! optional dilation radius} to an output-size RGBA buffer. Warping maps
//! each output pixel back into the overlay through the inverse transform
//! and samples with bilinear interpolation; pixels that land outside the
//! overlay stay fully transparent.

use image::{GrayImage, RgbaImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;
use rayon::prelude::*;

use crate::error::SolveError;
use crate::geometry::Point;
use crate::homography::Homography;

/// A flat description of one overlay rendering job.
pub struct RasterJob<'a> {
    pub overlay: &'a RgbaImage,
    /// Overlay-natural -> output-space transform.
    pub transform: &'a Homography,
    /// Global overlay opacity, 0..=1, applied to the alpha channel.
    pub opacity: f64,
    /// Line-thickness dilation radius in output pixels; 0 disables.
    pub dilation_radius: u8,
}

/// Render the warped (and optionally dilated) overlay at the requested
/// output size.
pub fn rasterize(job: &RasterJob<'_>, out_width: u32, out_height: u32) -> Result<RgbaImage, SolveError> {
    let inverse = job.transform.inverse()?;

    let src = job.overlay.as_raw();
    let (src_w, src_h) = (job.overlay.width() as usize, job.overlay.height() as usize);
    let src_stride = src_w * 4;

    let mut out = vec![0u8; out_width as usize * out_height as usize * 4];
    let out_stride = out_width as usize * 4;

    out.par_chunks_mut(out_stride)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..out_width as usize {
                let mapped = inverse.apply(Point::new(x as f64, y as f64));
                let pixel = bilinear_sample_rgba(src, src_stride, src_w, src_h, mapped.x, mapped.y);
                row[x * 4..x * 4 + 4].copy_from_slice(&pixel);
            }
        });

    let mut image = RgbaImage::from_raw(out_width, out_height, out)
        .unwrap_or_else(|| RgbaImage::new(out_width, out_height));

    if job.dilation_radius > 0 {
        image = dilate_rgba(&image, job.dilation_radius);
    }

    if job.opacity < 1.0 {
        let opacity = job.opacity.clamp(0.0, 1.0);
        for px in image.pixels_mut() {
            px.0[3] = (px.0[3] as f64 * opacity).round().clamp(0.0, 255.0) as u8;
        }
    }

    Ok(image)
}

/// Thicken line art by applying a per-channel morphological max filter.
/// Transparent surroundings are zero in every channel, so opaque strokes
/// grow outward by `radius` pixels and carry their color with them.
fn dilate_rgba(image: &RgbaImage, radius: u8) -> RgbaImage {
    let (w, h) = image.dimensions();
    let mut channels: Vec<GrayImage> = (0..4)
        .map(|c| {
            GrayImage::from_fn(w, h, |x, y| {
                let px = image.get_pixel(x, y);
                // Zero color where transparent so stroke colors, not stray
                // background values, expand.
                if c < 3 && px.0[3] == 0 {
                    image::Luma([0])
                } else {
                    image::Luma([px.0[c]])
                }
            })
        })
        .collect();

    for channel in channels.iter_mut() {
        *channel = dilate(channel, Norm::LInf, radius);
    }

    RgbaImage::from_fn(w, h, |x, y| {
        image::Rgba([
            channels[0].get_pixel(x, y).0[0],
            channels[1].get_pixel(x, y).0[0],
            channels[2].get_pixel(x, y).0[0],
            channels[3].get_pixel(x, y).0[0],
        ])
    })
}

/// Bilinear interpolation over an RGBA buffer. Coordinates outside the
/// image return a fully transparent pixel.
#[inline]
fn bilinear_sample_rgba(
    src: &[u8],
    stride: usize,
    width: usize,
    height: usize,
    x: f64,
    y: f64,
) -> [u8; 4] {
    if x < 0.0 || y < 0.0 || x > (width - 1) as f64 || y > (height - 1) as f64 {
        return [0, 0, 0, 0];
    }

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let mut result = [0u8; 4];
    for c in 0..4 {
        let p00 = src[y0 * stride + x0 * 4 + c] as f64;
        let p10 = src[y0 * stride + x1 * 4 + c] as f64;
        let p01 = src[y1 * stride + x0 * 4 + c] as f64;
        let p11 = src[y1 * stride + x1 * 4 + c] as f64;

        let value = p00 * (1.0 - fx) * (1.0 - fy)
            + p10 * fx * (1.0 - fy)
            + p01 * (1.0 - fx) * fy
            + p11 * fx * fy;

        result[c] = value.round().clamp(0.0, 255.0) as u8;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, image::Rgba(color))
    }

    fn identity(size: f64) -> Homography {
        let square = [
            Point::new(0.0, 0.0),
            Point::new(size, 0.0),
            Point::new(size, size),
            Point::new(0.0, size),
        ];
        Homography::solve(&square, &square).unwrap()
    }

    #[test]
    fn test_identity_warp_preserves_pixels() {
        let overlay = solid(8, 8, [200, 10, 30, 255]);
        let h = identity(7.0);
        let job = RasterJob {
            overlay: &overlay,
            transform: &h,
            opacity: 1.0,
            dilation_radius: 0,
        };
        let out = rasterize(&job, 8, 8).unwrap();
        assert_eq!(out.get_pixel(3, 3).0, [200, 10, 30, 255]);
    }

    #[test]
    fn test_translation_moves_content_and_clears_border() {
        let overlay = solid(4, 4, [0, 255, 0, 255]);
        let src = [
            Point::new(0.0, 0.0),
            Point::new(3.0, 0.0),
            Point::new(3.0, 3.0),
            Point::new(0.0, 3.0),
        ];
        let dst = [
            Point::new(10.0, 10.0),
            Point::new(13.0, 10.0),
            Point::new(13.0, 13.0),
            Point::new(10.0, 13.0),
        ];
        let h = Homography::solve(&src, &dst).unwrap();
        let job = RasterJob {
            overlay: &overlay,
            transform: &h,
            opacity: 1.0,
            dilation_radius: 0,
        };
        let out = rasterize(&job, 16, 16).unwrap();
        // Content at the translated location, transparent off it
        assert_eq!(out.get_pixel(11, 11).0[3], 255);
        assert_eq!(out.get_pixel(2, 2).0[3], 0);
    }

    #[test]
    fn test_opacity_scales_alpha() {
        let overlay = solid(4, 4, [255, 0, 0, 255]);
        let h = identity(3.0);
        let job = RasterJob {
            overlay: &overlay,
            transform: &h,
            opacity: 0.5,
            dilation_radius: 0,
        };
        let out = rasterize(&job, 4, 4).unwrap();
        assert_eq!(out.get_pixel(1, 1).0[3], 128);
    }

    #[test]
    fn test_dilation_thickens_line() {
        // A single opaque column in an otherwise transparent overlay
        let mut overlay = solid(9, 9, [0, 0, 0, 0]);
        for y in 0..9 {
            overlay.put_pixel(4, y, image::Rgba([255, 0, 0, 255]));
        }
        let h = identity(8.0);
        let job = RasterJob {
            overlay: &overlay,
            transform: &h,
            opacity: 1.0,
            dilation_radius: 1,
        };
        let out = rasterize(&job, 9, 9).unwrap();
        // The neighbors of the stroke are now opaque and carry its color
        assert_eq!(out.get_pixel(3, 4).0, [255, 0, 0, 255]);
        assert_eq!(out.get_pixel(5, 4).0, [255, 0, 0, 255]);
        assert_eq!(out.get_pixel(1, 4).0[3], 0);
    }
}
