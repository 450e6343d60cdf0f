//! Alignment controller: point mutations in, fresh transform out
//!
//! Every mutation of the correspondence store runs straight through a
//! recompute of the projective transform (one 8x8 solve), so the cached
//! transform is never stale. This is cheap enough to run on every
//! pointer-move event; no batching.

use crate::correspondence::{CorrespondenceStore, Mode};
use crate::error::ValidationError;
use crate::geometry::{quad_area, ContainRect, Point};
use crate::homography::Homography;

/// Destination quadrilaterals with a shoelace area below this (in display
/// units) are treated as collapsed and not warped.
const MIN_QUAD_AREA: f64 = 1.0;

/// Orchestrates the correspondence store and the solver, exposing the
/// active transform to a renderer. `transform()` is `None` whenever the
/// overlay is not alignable; renderers must hide the overlay rather than
/// draw a garbage warp.
#[derive(Debug)]
pub struct AlignmentController {
    store: CorrespondenceStore,
    transform: Option<Homography>,
    show_overlay: bool,
    opacity: f64,
}

impl AlignmentController {
    pub fn new(overlay_width: f64, overlay_height: f64, photo_rect: ContainRect) -> Self {
        let mut controller = Self {
            store: CorrespondenceStore::new(overlay_width, overlay_height, photo_rect),
            transform: None,
            show_overlay: true,
            opacity: 0.65,
        };
        controller.recompute();
        controller
    }

    pub fn store(&self) -> &CorrespondenceStore {
        &self.store
    }

    /// The active overlay-natural -> display transform, or `None` when
    /// undefined (incomplete points, collapsed quad, or singular system).
    pub fn transform(&self) -> Option<&Homography> {
        self.transform.as_ref()
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: f64) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.show_overlay = visible;
    }

    /// Whether a renderer should draw the warped overlay right now.
    pub fn overlay_visible(&self) -> bool {
        self.show_overlay && self.transform.is_some()
    }

    // Mutations: each delegates to the store, then recomputes.

    pub fn set_mode(&mut self, mode: Mode) {
        self.store.set_mode(mode);
        self.recompute();
    }

    pub fn clear(&mut self) {
        self.store.clear();
        self.recompute();
    }

    pub fn set_photo_rect(&mut self, rect: ContainRect) {
        self.store.set_photo_rect(rect);
        self.recompute();
    }

    pub fn set_scale(&mut self, scale: f64) {
        self.store.set_scale(scale);
        self.recompute();
    }

    pub fn click_source(
        &mut self,
        click: Point,
        thumb_rect: &ContainRect,
    ) -> Result<(), ValidationError> {
        self.store.click_source(click, thumb_rect)?;
        self.recompute();
        Ok(())
    }

    pub fn click_dest(&mut self, click: Point) -> Result<(), ValidationError> {
        self.store.click_dest(click)?;
        self.recompute();
        Ok(())
    }

    pub fn drag_source(&mut self, index: usize, position: Point) -> Result<(), ValidationError> {
        self.store.drag_source(index, position)?;
        self.recompute();
        Ok(())
    }

    pub fn drag_dest(&mut self, index: usize, position: Point) -> Result<(), ValidationError> {
        self.store.drag_dest(index, position)?;
        self.recompute();
        Ok(())
    }

    pub fn restore_manual_dest(&mut self, dest: [Point; 4]) {
        self.store.restore_manual_dest(dest);
        self.recompute();
    }

    pub fn restore_guided(
        &mut self,
        source: Vec<Point>,
        dest: Vec<Point>,
    ) -> Result<(), ValidationError> {
        self.store.restore_guided(source, dest)?;
        self.recompute();
        Ok(())
    }

    fn recompute(&mut self) {
        self.transform = None;

        let (src, dst) = match self.store.set().pairs() {
            Ok(pairs) => pairs,
            Err(_) => return,
        };

        if quad_area(&dst).abs() < MIN_QUAD_AREA {
            tracing::debug!("destination quadrilateral collapsed; transform undefined");
            return;
        }

        match Homography::solve(&src, &dst) {
            Ok(h) => self.transform = Some(h),
            Err(err) => {
                tracing::debug!("transform undefined: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correspondence::Mode;

    const EPS: f64 = 1e-6;

    fn controller() -> AlignmentController {
        let rect = ContainRect::contain(800.0, 600.0, 800.0, 600.0);
        AlignmentController::new(100.0, 200.0, rect)
    }

    fn thumb() -> ContainRect {
        ContainRect::contain(220.0, 220.0, 100.0, 200.0)
    }

    #[test]
    fn test_manual_mode_has_transform_immediately() {
        let c = controller();
        assert!(c.transform().is_some());
        assert!(c.overlay_visible());
    }

    #[test]
    fn test_manual_transform_maps_corners_to_dest() {
        let c = controller();
        let h = c.transform().unwrap();
        let src = c.store().set().source.clone();
        let dst = c.store().set().dest.clone();
        for i in 0..4 {
            let q = h.apply(src[i]);
            assert!((q.x - dst[i].x).abs() < EPS);
            assert!((q.y - dst[i].y).abs() < EPS);
        }
    }

    #[test]
    fn test_guided_transform_undefined_until_complete() {
        let mut c = controller();
        c.set_mode(Mode::Guided);
        assert!(c.transform().is_none());
        assert!(!c.overlay_visible());

        let thumb = thumb();
        let sources = [
            Point::new(80.0, 20.0),
            Point::new(140.0, 20.0),
            Point::new(140.0, 200.0),
            Point::new(80.0, 200.0),
        ];
        let dests = [
            Point::new(200.0, 100.0),
            Point::new(600.0, 120.0),
            Point::new(580.0, 500.0),
            Point::new(220.0, 480.0),
        ];
        for i in 0..4 {
            c.click_source(sources[i], &thumb).unwrap();
            assert!(c.transform().is_none());
            c.click_dest(dests[i]).unwrap();
        }
        assert!(c.transform().is_some());
    }

    #[test]
    fn test_drag_triggers_recompute() {
        let mut c = controller();
        let before = *c.transform().unwrap();
        c.drag_dest(0, Point::new(150.0, 90.0)).unwrap();
        let after = *c.transform().unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_collapsed_quad_yields_no_transform() {
        let mut c = controller();
        // Drag all four corners onto (nearly) the same spot
        for i in 0..4 {
            c.drag_dest(i, Point::new(400.0, 300.0)).unwrap();
        }
        assert!(c.transform().is_none());
        assert!(!c.overlay_visible());
    }

    #[test]
    fn test_visibility_flag_gates_rendering() {
        let mut c = controller();
        assert!(c.overlay_visible());
        c.set_visible(false);
        assert!(!c.overlay_visible());
    }

    #[test]
    fn test_opacity_clamped() {
        let mut c = controller();
        c.set_opacity(1.7);
        assert!((c.opacity() - 1.0).abs() < EPS);
        c.set_opacity(-0.2);
        assert!(c.opacity().abs() < EPS);
    }
}
