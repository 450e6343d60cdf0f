//! Error taxonomy for the alignment and export pipeline

use thiserror::Error;

/// Locally-recoverable input errors. The triggering operation is a no-op
/// and existing state is left untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A transform was requested with fewer than 4 points in a sequence.
    #[error("correspondence set incomplete: {source_len} source / {dest_len} destination points (4 required)")]
    IncompletePoints { source_len: usize, dest_len: usize },

    /// A guided-mode click landed outside the displayed bounds of the
    /// target image.
    #[error("click at ({x:.1}, {y:.1}) is outside the displayed image bounds")]
    OutsideBounds { x: f64, y: f64 },

    /// A click arrived while the state machine was not expecting one on
    /// that surface.
    #[error("click on the {surface} surface is not expected at step {step}")]
    UnexpectedClick { surface: &'static str, step: usize },

    /// A color rule carried a malformed hex code.
    #[error("color {value:?} must be a #RRGGBB hex code")]
    InvalidColor { value: String },
}

/// The 8x8 linear system for the homography was near-singular, typically
/// from collinear or duplicate correspondence points. Callers must treat
/// this as "transform undefined" and suppress the overlay warp.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("projective solve failed: pivot magnitude {pivot:.3e} below threshold (degenerate correspondences)")]
pub struct SolveError {
    pub pivot: f64,
}

/// Fatal failures of the export pipeline. The export is aborted as a whole
/// and no partial file is produced.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("full-resolution transform could not be solved: {0}")]
    Solve(#[from] SolveError),

    #[error("photo display rect has zero size; cannot derive export scale")]
    DegenerateDisplayRect,

    #[error("image decode/encode failed: {0}")]
    Codec(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
