//! Contain-fit layout and coordinate-space bookkeeping
//!
//! Every point in the pipeline lives in one of three spaces: the overlay
//! image's natural pixel space, the display space of whatever rectangle the
//! photo is rendered into, or the photo's natural pixel space at export
//! time. `ContainRect` is the bridge between them; conversions are always
//! explicit.

use serde::{Deserialize, Serialize};

/// A 2D point. The coordinate space it lives in is carried by the function
/// signatures that produce and consume it, never mixed implicitly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// The rectangle an image occupies when rendered "contain"-style inside a
/// container: scaled to fit entirely, aspect preserved, centered on the
/// axis it does not fill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainRect {
    pub offset_x: f64,
    pub offset_y: f64,
    pub width: f64,
    pub height: f64,
    /// Natural size of the image this rect displays, kept for conversions.
    natural_width: f64,
    natural_height: f64,
}

impl ContainRect {
    /// Fit an image of `natural_width x natural_height` inside a container,
    /// preserving aspect ratio and centering on the unfilled axis.
    ///
    /// All inputs must be positive; the same routine serves the main canvas,
    /// the overlay preview thumbnail, and the export canvas.
    pub fn contain(
        container_width: f64,
        container_height: f64,
        natural_width: f64,
        natural_height: f64,
    ) -> Self {
        debug_assert!(container_width > 0.0 && container_height > 0.0);
        debug_assert!(natural_width > 0.0 && natural_height > 0.0);

        let image_aspect = natural_width / natural_height;
        let container_aspect = container_width / container_height;

        let (width, height) = if image_aspect > container_aspect {
            // Image is wider than the container: clamp width.
            (container_width, container_width / image_aspect)
        } else {
            // Image is taller (or equal): clamp height.
            (container_height * image_aspect, container_height)
        };

        Self {
            offset_x: (container_width - width) / 2.0,
            offset_y: (container_height - height) / 2.0,
            width,
            height,
            natural_width,
            natural_height,
        }
    }

    /// Whether a point (in container coordinates) falls inside the
    /// displayed image. Used to reject guided-mode clicks that miss.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.offset_x
            && p.x <= self.offset_x + self.width
            && p.y >= self.offset_y
            && p.y <= self.offset_y + self.height
    }

    /// Convert a point from container/display coordinates into the image's
    /// natural pixel space.
    pub fn display_to_natural(&self, p: Point) -> Point {
        Point::new(
            (p.x - self.offset_x) * (self.natural_width / self.width),
            (p.y - self.offset_y) * (self.natural_height / self.height),
        )
    }

    /// Convert a point from the image's natural pixel space into
    /// container/display coordinates.
    pub fn natural_to_display(&self, p: Point) -> Point {
        Point::new(
            p.x * (self.width / self.natural_width) + self.offset_x,
            p.y * (self.height / self.natural_height) + self.offset_y,
        )
    }

    /// Scale factor from this rect's display space back to natural pixels.
    pub fn natural_scale(&self) -> f64 {
        self.natural_width / self.width
    }
}

/// Signed shoelace area of a quadrilateral, in the units of its points.
/// A near-zero area means the polygon has collapsed and the warp would be
/// degenerate.
pub fn quad_area(points: &[Point; 4]) -> f64 {
    let mut area = 0.0;
    for i in 0..4 {
        let a = points[i];
        let b = points[(i + 1) % 4];
        area += a.x * b.y - b.x * a.y;
    }
    area / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    #[test]
    fn test_tall_image_in_square_container() {
        // 100x200 overlay inside a 400x400 container
        let rect = ContainRect::contain(400.0, 400.0, 100.0, 200.0);
        assert!((rect.offset_x - 100.0).abs() < EPS);
        assert!((rect.offset_y - 0.0).abs() < EPS);
        assert!((rect.width - 200.0).abs() < EPS);
        assert!((rect.height - 400.0).abs() < EPS);
    }

    #[test]
    fn test_wide_image_clamps_width() {
        let rect = ContainRect::contain(400.0, 400.0, 200.0, 100.0);
        assert!((rect.offset_x - 0.0).abs() < EPS);
        assert!((rect.offset_y - 100.0).abs() < EPS);
        assert!((rect.width - 400.0).abs() < EPS);
        assert!((rect.height - 200.0).abs() < EPS);
    }

    #[test]
    fn test_centering_invariant() {
        // When aspects differ, exactly one offset is zero and the rendered
        // aspect equals the natural aspect.
        let rect = ContainRect::contain(640.0, 480.0, 3000.0, 2000.0);
        let one_zero = (rect.offset_x.abs() < EPS) ^ (rect.offset_y.abs() < EPS);
        assert!(one_zero);
        assert!((rect.width / rect.height - 1.5).abs() < EPS);
    }

    #[test]
    fn test_display_natural_round_trip() {
        let rect = ContainRect::contain(800.0, 600.0, 4000.0, 3000.0);
        let display = Point::new(123.0, 456.0);
        let natural = rect.display_to_natural(display);
        let back = rect.natural_to_display(natural);
        assert!((back.x - display.x).abs() < EPS);
        assert!((back.y - display.y).abs() < EPS);
    }

    #[test]
    fn test_contains_respects_offsets() {
        let rect = ContainRect::contain(400.0, 400.0, 100.0, 200.0);
        assert!(rect.contains(Point::new(200.0, 200.0)));
        // Left gutter
        assert!(!rect.contains(Point::new(50.0, 200.0)));
        // Right gutter
        assert!(!rect.contains(Point::new(350.0, 200.0)));
    }

    #[test]
    fn test_quad_area_square() {
        let quad = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        assert!((quad_area(&quad).abs() - 100.0).abs() < EPS);
    }

    #[test]
    fn test_quad_area_collapsed() {
        let quad = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(20.0, 20.0),
            Point::new(30.0, 30.0),
        ];
        assert!(quad_area(&quad).abs() < EPS);
    }
}
