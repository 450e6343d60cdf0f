//! Color classification and recoloring for cadastral line art
//!
//! The overlay drawing is isolated from its scanned background by ordered
//! keep/remove color rules. Removal wins first, then the keep list either
//! snaps a pixel to its exact canonical color or drops it. Snapping to the
//! exact rule color makes the pass idempotent: re-running the same rules on
//! an already-filtered buffer matches every kept pixel at distance zero.
//!
//! The same code path classifies the display-resolution thumbnail and the
//! full natural-resolution buffer at export, so both always agree
//! pixel-for-pixel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use rayon::prelude::*;

use crate::error::ValidationError;

/// A single keep or remove rule: a target color and a 0-100 tolerance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorRule {
    pub color: [u8; 3],
    /// User-facing 0-100 value, scaled internally to a 0-255 Euclidean
    /// distance threshold (`tolerance * 2.55`).
    pub tolerance: u8,
}

impl ColorRule {
    pub fn new(color: [u8; 3], tolerance: u8) -> Self {
        Self {
            color,
            tolerance: tolerance.min(100),
        }
    }

    /// Parse a `#RRGGBB` (or bare `RRGGBB`) hex code.
    pub fn from_hex(value: &str, tolerance: u8) -> Result<Self, ValidationError> {
        let trimmed = value.trim();
        let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ValidationError::InvalidColor {
                value: value.to_string(),
            });
        }
        let parse = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16);
        let color = [
            parse(0..2).map_err(|_| ValidationError::InvalidColor {
                value: value.to_string(),
            })?,
            parse(2..4).map_err(|_| ValidationError::InvalidColor {
                value: value.to_string(),
            })?,
            parse(4..6).map_err(|_| ValidationError::InvalidColor {
                value: value.to_string(),
            })?,
        ];
        Ok(Self::new(color, tolerance))
    }

    /// Squared distance threshold on the 0-255 RGB cube.
    fn threshold_sq(&self) -> f64 {
        let radius = self.tolerance as f64 * 2.55;
        radius * radius
    }

    #[inline]
    fn matches(&self, r: u8, g: u8, b: u8) -> bool {
        let dr = r as f64 - self.color[0] as f64;
        let dg = g as f64 - self.color[1] as f64;
        let db = b as f64 - self.color[2] as f64;
        dr * dr + dg * dg + db * db <= self.threshold_sq()
    }
}

/// Ordered rule lists. Within each list the first matching rule wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterRules {
    pub keep: Vec<ColorRule>,
    pub remove: Vec<ColorRule>,
}

impl FilterRules {
    pub fn is_empty(&self) -> bool {
        self.keep.is_empty() && self.remove.is_empty()
    }
}

/// Classify one RGBA pixel in place.
#[inline]
fn classify_pixel(px: &mut [u8], rules: &FilterRules) {
    // Already-transparent pixels carry no line art and are left alone.
    if px[3] == 0 {
        return;
    }
    let (r, g, b) = (px[0], px[1], px[2]);

    for rule in &rules.remove {
        if rule.matches(r, g, b) {
            px[3] = 0;
            return;
        }
    }

    if rules.keep.is_empty() {
        return;
    }

    for rule in &rules.keep {
        if rule.matches(r, g, b) {
            px[0] = rule.color[0];
            px[1] = rule.color[1];
            px[2] = rule.color[2];
            px[3] = 255;
            return;
        }
    }

    px[3] = 0;
}

/// Apply the rule set to a flat RGBA buffer in place.
pub fn apply_rules(rgba: &mut [u8], rules: &FilterRules) {
    if rules.is_empty() {
        return;
    }
    for px in rgba.chunks_exact_mut(4) {
        classify_pixel(px, rules);
    }
}

/// Row-parallel variant for full natural-resolution buffers. Produces the
/// same result as [`apply_rules`]; classification is purely per-pixel.
pub fn apply_rules_parallel(rgba: &mut [u8], width: u32, rules: &FilterRules) {
    if rules.is_empty() {
        return;
    }
    let row_bytes = width as usize * 4;
    if row_bytes == 0 {
        return;
    }
    rgba.par_chunks_mut(row_bytes).for_each(|row| {
        for px in row.chunks_exact_mut(4) {
            classify_pixel(px, rules);
        }
    });
}

/// A completed filter pass, immutable once published.
#[derive(Debug)]
pub struct FilteredOverlay {
    pub generation: u64,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Last-write-wins publication point for asynchronously produced filter
/// results. Rule changes can start a new pass while a previous one is still
/// running; a pass may only commit if no later pass has begun, so a slow
/// stale pass never overwrites a fresher result regardless of completion
/// order.
#[derive(Debug, Default)]
pub struct FilterPipeline {
    latest_started: AtomicU64,
    published: ArcSwapOption<FilteredOverlay>,
}

impl FilterPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the start of a pass and return its generation tag.
    pub fn begin_pass(&self) -> u64 {
        self.latest_started.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Run a full pass over `pixels` and try to publish it. Returns `true`
    /// if the result was committed, `false` if it was superseded.
    pub fn run_pass(
        &self,
        generation: u64,
        mut pixels: Vec<u8>,
        width: u32,
        height: u32,
        rules: &FilterRules,
    ) -> bool {
        apply_rules_parallel(&mut pixels, width, rules);
        self.commit(FilteredOverlay {
            generation,
            width,
            height,
            pixels,
        })
    }

    /// Publish a completed pass unless a newer one has started since.
    pub fn commit(&self, result: FilteredOverlay) -> bool {
        if result.generation != self.latest_started.load(Ordering::SeqCst) {
            tracing::debug!(
                generation = result.generation,
                latest = self.latest_started.load(Ordering::SeqCst),
                "discarding stale filter pass"
            );
            return false;
        }
        self.published.store(Some(Arc::new(result)));
        true
    }

    /// The most recently committed result, if any.
    pub fn current(&self) -> Option<Arc<FilteredOverlay>> {
        self.published.load_full()
    }

    /// Drop any published result (rule set cleared).
    pub fn reset(&self) {
        self.latest_started.fetch_add(1, Ordering::SeqCst);
        self.published.store(None);
    }
}
