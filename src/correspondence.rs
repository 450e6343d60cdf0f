//! Correspondence point acquisition: manual free-drag and guided pinning
//!
//! The store owns the two ordered 4-point sequences that feed the
//! projective solver. Canonical index order for both sequences is
//! top-left, top-right, bottom-right, bottom-left; producers and consumers
//! that disagree on this order misalign silently, so every entry point into
//! the store documents which space and order it expects.
//!
//! Source points live in the overlay image's natural pixel space,
//! destination points in the display space of the photo surface.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::geometry::{ContainRect, Point};

/// Acquisition mode. Switching modes preserves no state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Source fixed to the overlay's natural corners; the destination
    /// quadrilateral is dragged into place.
    #[default]
    Manual,
    /// Both sequences filled one click at a time, alternating surfaces.
    Guided,
}

/// Progress of the guided 8-step acquisition protocol. `n` counts
/// completed pairs (0..=3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinningState {
    Idle,
    AwaitingSourceClick(usize),
    AwaitingDestClick(usize),
    Complete,
}

/// The two ordered point sequences. The transform is defined only when
/// both hold exactly 4 points.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrespondenceSet {
    pub source: Vec<Point>,
    pub dest: Vec<Point>,
}

impl CorrespondenceSet {
    pub fn is_complete(&self) -> bool {
        self.source.len() == 4 && self.dest.len() == 4
    }

    /// Both sequences as fixed arrays, or the incomplete-points error.
    pub fn pairs(&self) -> Result<([Point; 4], [Point; 4]), ValidationError> {
        if !self.is_complete() {
            return Err(ValidationError::IncompletePoints {
                source_len: self.source.len(),
                dest_len: self.dest.len(),
            });
        }
        let src = [self.source[0], self.source[1], self.source[2], self.source[3]];
        let dst = [self.dest[0], self.dest[1], self.dest[2], self.dest[3]];
        Ok((src, dst))
    }

    fn clear(&mut self) {
        self.source.clear();
        self.dest.clear();
    }
}

/// Default manual-mode scale of the destination rectangle relative to the
/// photo display area.
pub const DEFAULT_MANUAL_SCALE: f64 = 0.65;
const MANUAL_SCALE_RANGE: std::ops::RangeInclusive<f64> = 0.1..=1.2;

/// Owns the correspondence sequences and the acquisition state machine.
#[derive(Debug, Clone)]
pub struct CorrespondenceStore {
    mode: Mode,
    set: CorrespondenceSet,

    overlay_width: f64,
    overlay_height: f64,
    /// Where the photo is rendered on the main surface; destination points
    /// are expressed in this display space.
    photo_rect: ContainRect,

    /// Manual mode: destination rectangle scale, 0.1..=1.2.
    scale: f64,
    /// Manual mode: set on the first destination drag; freezes automatic
    /// recomputation of the default rectangle until reset.
    manually_adjusted: bool,

    /// Guided mode: completed clicks, 0..=8. Even steps await a source
    /// click, odd steps a destination click.
    step: usize,
}

impl CorrespondenceStore {
    /// Create a store in manual mode with the default centered rectangle.
    pub fn new(overlay_width: f64, overlay_height: f64, photo_rect: ContainRect) -> Self {
        let mut store = Self {
            mode: Mode::Manual,
            set: CorrespondenceSet::default(),
            overlay_width,
            overlay_height,
            photo_rect,
            scale: DEFAULT_MANUAL_SCALE,
            manually_adjusted: false,
            step: 0,
        };
        store.enter_manual();
        store
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set(&self) -> &CorrespondenceSet {
        &self.set
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn is_manually_adjusted(&self) -> bool {
        self.manually_adjusted
    }

    /// Switch acquisition mode. Both sequences are emptied and the step
    /// counter reset; nothing carries across modes.
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        self.set.clear();
        self.step = 0;
        self.manually_adjusted = false;
        if mode == Mode::Manual {
            self.enter_manual();
        }
    }

    /// Reset the current mode: manual returns to the auto-computed
    /// rectangle, guided empties both sequences and goes back to `Idle`.
    pub fn clear(&mut self) {
        match self.mode {
            Mode::Manual => {
                self.manually_adjusted = false;
                self.enter_manual();
            }
            Mode::Guided => {
                self.set.clear();
                self.step = 0;
            }
        }
    }

    /// The photo's display rect changed (window resize). Manual mode
    /// recomputes the default rectangle unless the user has dragged it.
    pub fn set_photo_rect(&mut self, rect: ContainRect) {
        self.photo_rect = rect;
        if self.mode == Mode::Manual && !self.manually_adjusted {
            self.recompute_manual_dest();
        }
    }

    /// Manual mode: change the destination rectangle scale factor. Clamped
    /// to 0.1..=1.2. A no-op for the point set once the user has dragged a
    /// point, until [`clear`](Self::clear).
    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale.clamp(*MANUAL_SCALE_RANGE.start(), *MANUAL_SCALE_RANGE.end());
        if self.mode == Mode::Manual && !self.manually_adjusted {
            self.recompute_manual_dest();
        }
    }

    /// Current guided-protocol state. Manual mode reports `Idle`.
    pub fn pinning_state(&self) -> PinningState {
        if self.mode != Mode::Guided {
            return PinningState::Idle;
        }
        match self.step {
            0 => PinningState::Idle,
            8 => PinningState::Complete,
            s if s % 2 == 0 => PinningState::AwaitingSourceClick(s / 2),
            s => PinningState::AwaitingDestClick(s / 2),
        }
    }

    /// Guided mode: accept a click on the overlay thumbnail. `click` is in
    /// the thumbnail's display space; `thumb_rect` is the thumbnail's
    /// contain rect for the overlay image. The stored point is converted to
    /// overlay-natural space. Click order defines corner order.
    pub fn click_source(
        &mut self,
        click: Point,
        thumb_rect: &ContainRect,
    ) -> Result<(), ValidationError> {
        if self.mode != Mode::Guided || self.step >= 8 || self.step % 2 != 0 {
            return Err(ValidationError::UnexpectedClick {
                surface: "source",
                step: self.step,
            });
        }
        if !thumb_rect.contains(click) {
            return Err(ValidationError::OutsideBounds {
                x: click.x,
                y: click.y,
            });
        }
        self.set.source.push(thumb_rect.display_to_natural(click));
        self.step += 1;
        Ok(())
    }

    /// Guided mode: accept a click on the main photo surface, in display
    /// space.
    pub fn click_dest(&mut self, click: Point) -> Result<(), ValidationError> {
        if self.mode != Mode::Guided || self.step >= 8 || self.step % 2 != 1 {
            return Err(ValidationError::UnexpectedClick {
                surface: "destination",
                step: self.step,
            });
        }
        if !self.photo_rect.contains(click) {
            return Err(ValidationError::OutsideBounds {
                x: click.x,
                y: click.y,
            });
        }
        self.set.dest.push(click);
        self.step += 1;
        Ok(())
    }

    /// Whether source point `index` may currently be repositioned. Placed
    /// source points are frozen while the machine awaits the destination
    /// click of the current pair (odd steps); manual-mode source corners
    /// are never draggable.
    pub fn can_drag_source(&self, index: usize) -> bool {
        self.mode == Mode::Guided && index < self.set.source.len() && self.step % 2 == 0
    }

    /// Whether destination point `index` may currently be repositioned.
    /// Placed destination points are always draggable.
    pub fn can_drag_dest(&self, index: usize) -> bool {
        index < self.set.dest.len()
    }

    /// Reposition a guided-mode source point, in overlay-natural space.
    pub fn drag_source(&mut self, index: usize, position: Point) -> Result<(), ValidationError> {
        if !self.can_drag_source(index) {
            return Err(ValidationError::UnexpectedClick {
                surface: "source",
                step: self.step,
            });
        }
        self.set.source[index] = position;
        Ok(())
    }

    /// Reposition a destination point, in display space. In manual mode
    /// this sets the manually-adjusted flag, freezing the automatic default
    /// rectangle until [`clear`](Self::clear).
    pub fn drag_dest(&mut self, index: usize, position: Point) -> Result<(), ValidationError> {
        if !self.can_drag_dest(index) {
            return Err(ValidationError::UnexpectedClick {
                surface: "destination",
                step: self.step,
            });
        }
        if self.mode == Mode::Manual {
            self.manually_adjusted = true;
        }
        self.set.dest[index] = position;
        Ok(())
    }

    /// Restore a previously saved manual destination quadrilateral
    /// (e.g. from a session file). Marks the set as manually adjusted.
    pub fn restore_manual_dest(&mut self, dest: [Point; 4]) {
        self.set_mode(Mode::Manual);
        self.set.dest = dest.to_vec();
        self.manually_adjusted = true;
    }

    /// Restore saved guided sequences. Lengths must describe a reachable
    /// protocol state: equal, or source one ahead of dest, and at most 4.
    pub fn restore_guided(
        &mut self,
        source: Vec<Point>,
        dest: Vec<Point>,
    ) -> Result<(), ValidationError> {
        let (s, d) = (source.len(), dest.len());
        if s > 4 || d > 4 || (s != d && s != d + 1) {
            return Err(ValidationError::IncompletePoints {
                source_len: s,
                dest_len: d,
            });
        }
        self.set_mode(Mode::Guided);
        self.step = s + d;
        self.set.source = source;
        self.set.dest = dest;
        Ok(())
    }

    fn enter_manual(&mut self) {
        let (w, h) = (self.overlay_width, self.overlay_height);
        self.set.source = vec![
            Point::new(0.0, 0.0),
            Point::new(w - 1.0, 0.0),
            Point::new(w - 1.0, h - 1.0),
            Point::new(0.0, h - 1.0),
        ];
        self.recompute_manual_dest();
    }

    /// Centered, aspect-preserving destination rectangle inside the photo
    /// display rect, scaled by the manual scale factor.
    fn recompute_manual_dest(&mut self) {
        let rect = &self.photo_rect;
        let fit = (rect.width / self.overlay_width).min(rect.height / self.overlay_height);
        let scaled_w = self.overlay_width * fit * self.scale;
        let scaled_h = self.overlay_height * fit * self.scale;

        let left = rect.offset_x + (rect.width - scaled_w) / 2.0;
        let top = rect.offset_y + (rect.height - scaled_h) / 2.0;
        let right = left + scaled_w;
        let bottom = top + scaled_h;

        self.set.dest = vec![
            Point::new(left, top),
            Point::new(right, top),
            Point::new(right, bottom),
            Point::new(left, bottom),
        ];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn photo_rect() -> ContainRect {
        // 800x600 photo filling an 800x600 surface
        ContainRect::contain(800.0, 600.0, 800.0, 600.0)
    }

    fn thumb_rect() -> ContainRect {
        // 100x200 overlay in a 220x220 thumbnail: rect {55, 0, 110, 220}
        ContainRect::contain(220.0, 220.0, 100.0, 200.0)
    }

    fn store() -> CorrespondenceStore {
        CorrespondenceStore::new(100.0, 200.0, photo_rect())
    }

    #[test]
    fn test_manual_source_is_natural_corners() {
        let s = store();
        let src = &s.set().source;
        assert_eq!(src[0], Point::new(0.0, 0.0));
        assert_eq!(src[1], Point::new(99.0, 0.0));
        assert_eq!(src[2], Point::new(99.0, 199.0));
        assert_eq!(src[3], Point::new(0.0, 199.0));
    }

    #[test]
    fn test_manual_dest_is_centered_rect() {
        let s = store();
        let dest = &s.set().dest;
        // fit = min(800/100, 600/200) = 3, scaled by 0.65 -> 195 x 390
        assert!((dest[0].x - (800.0 - 195.0) / 2.0).abs() < EPS);
        assert!((dest[0].y - (600.0 - 390.0) / 2.0).abs() < EPS);
        assert!((dest[2].x - dest[0].x - 195.0).abs() < EPS);
        assert!((dest[2].y - dest[0].y - 390.0).abs() < EPS);
    }

    #[test]
    fn test_scale_change_recomputes_until_drag() {
        let mut s = store();
        s.set_scale(1.0);
        let auto_width = s.set().dest[1].x - s.set().dest[0].x;
        assert!((auto_width - 300.0).abs() < EPS);

        // Dragging freezes the auto rectangle
        s.drag_dest(0, Point::new(10.0, 10.0)).unwrap();
        assert!(s.is_manually_adjusted());
        s.set_scale(0.5);
        assert_eq!(s.set().dest[0], Point::new(10.0, 10.0));

        // Scale itself still updates (and stays clamped)
        s.set_scale(5.0);
        assert!((s.scale() - 1.2).abs() < EPS);

        // Clear unfreezes and recomputes at the current scale
        s.clear();
        assert!(!s.is_manually_adjusted());
        let width = s.set().dest[1].x - s.set().dest[0].x;
        assert!((width - 360.0).abs() < EPS);
    }

    #[test]
    fn test_resize_recomputes_unless_adjusted() {
        let mut s = store();
        s.drag_dest(2, Point::new(700.0, 500.0)).unwrap();
        s.set_photo_rect(ContainRect::contain(400.0, 300.0, 800.0, 600.0));
        assert_eq!(s.set().dest[2], Point::new(700.0, 500.0));
    }

    #[test]
    fn test_guided_protocol_alternates() {
        let mut s = store();
        s.set_mode(Mode::Guided);
        assert_eq!(s.pinning_state(), PinningState::Idle);
        assert!(s.set().source.is_empty() && s.set().dest.is_empty());

        let thumb = thumb_rect();
        for pair in 0..4 {
            s.click_source(Point::new(100.0, 100.0), &thumb).unwrap();
            assert_eq!(s.pinning_state(), PinningState::AwaitingDestClick(pair));
            s.click_dest(Point::new(50.0 + pair as f64, 60.0)).unwrap();
        }
        assert_eq!(s.pinning_state(), PinningState::Complete);
        assert!(s.set().is_complete());

        // Further clicks are rejected once complete
        assert!(s.click_source(Point::new(100.0, 100.0), &thumb).is_err());
    }

    #[test]
    fn test_source_click_converted_to_natural_space() {
        let mut s = store();
        s.set_mode(Mode::Guided);
        // Thumbnail rect is {55, 0, 110, 220}; center click maps to the
        // overlay's natural center.
        s.click_source(Point::new(110.0, 110.0), &thumb_rect()).unwrap();
        let p = s.set().source[0];
        assert!((p.x - 50.0).abs() < EPS);
        assert!((p.y - 100.0).abs() < EPS);
    }

    #[test]
    fn test_out_of_bounds_click_rejected_without_state_change() {
        let mut s = store();
        s.set_mode(Mode::Guided);
        let thumb = thumb_rect();

        // Two accepted pairs, then a 5th click that misses the thumbnail
        for _ in 0..2 {
            s.click_source(Point::new(100.0, 100.0), &thumb).unwrap();
            s.click_dest(Point::new(400.0, 300.0)).unwrap();
        }
        let before = s.set().clone();
        let err = s.click_source(Point::new(10.0, 100.0), &thumb).unwrap_err();
        assert!(matches!(err, ValidationError::OutsideBounds { .. }));
        assert_eq!(s.set(), &before);
        assert_eq!(s.pinning_state(), PinningState::AwaitingSourceClick(2));
    }

    #[test]
    fn test_click_on_wrong_surface_rejected() {
        let mut s = store();
        s.set_mode(Mode::Guided);
        // First click must land on the source thumbnail
        assert!(s.click_dest(Point::new(400.0, 300.0)).is_err());
        assert_eq!(s.pinning_state(), PinningState::Idle);
    }

    #[test]
    fn test_source_drag_frozen_on_odd_steps() {
        let mut s = store();
        s.set_mode(Mode::Guided);
        let thumb = thumb_rect();

        s.click_source(Point::new(100.0, 100.0), &thumb).unwrap();
        // Awaiting the destination click of this pair: source frozen
        assert!(!s.can_drag_source(0));
        assert!(s.drag_source(0, Point::new(1.0, 1.0)).is_err());

        s.click_dest(Point::new(400.0, 300.0)).unwrap();
        // Pair complete (even step): source draggable again
        assert!(s.can_drag_source(0));
        s.drag_source(0, Point::new(1.0, 1.0)).unwrap();
        // Destination points are always draggable
        assert!(s.can_drag_dest(0));
        s.drag_dest(0, Point::new(410.0, 310.0)).unwrap();
    }

    #[test]
    fn test_clear_resets_guided_machine() {
        let mut s = store();
        s.set_mode(Mode::Guided);
        let thumb = thumb_rect();
        s.click_source(Point::new(100.0, 100.0), &thumb).unwrap();
        s.click_dest(Point::new(400.0, 300.0)).unwrap();

        s.clear();
        assert_eq!(s.pinning_state(), PinningState::Idle);
        assert!(s.set().source.is_empty() && s.set().dest.is_empty());
    }

    #[test]
    fn test_mode_switch_preserves_nothing() {
        let mut s = store();
        s.drag_dest(0, Point::new(1.0, 2.0)).unwrap();
        s.set_mode(Mode::Guided);
        assert!(s.set().source.is_empty() && s.set().dest.is_empty());

        s.set_mode(Mode::Manual);
        assert!(!s.is_manually_adjusted());
        assert_eq!(s.set().source.len(), 4);
        assert_eq!(s.set().dest.len(), 4);
    }

    #[test]
    fn test_restore_guided_validates_lengths() {
        let mut s = store();
        let p = Point::new(1.0, 1.0);
        assert!(s.restore_guided(vec![p; 2], vec![p; 1]).is_ok());
        assert_eq!(s.pinning_state(), PinningState::AwaitingDestClick(1));

        assert!(s.restore_guided(vec![p; 1], vec![p; 3]).is_err());
        assert!(s.restore_guided(vec![p; 5], vec![p; 4]).is_err());
    }

    #[test]
    fn test_pairs_requires_four_points() {
        let mut s = store();
        s.set_mode(Mode::Guided);
        let err = s.set().pairs().unwrap_err();
        assert!(matches!(err, ValidationError::IncompletePoints { .. }));
    }
}
