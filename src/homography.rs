//! Projective transform solver for overlay alignment
//!
//! Maps four correspondence points between the cadastral overlay plane and
//! the field photo plane using the Direct Linear Transform (DLT) algorithm.
//! Degenerate inputs (three or more collinear points, duplicates) are an
//! expected condition and surface as [`SolveError`], never as a spurious
//! matrix.

use crate::error::SolveError;
use crate::geometry::Point;

/// Pivot magnitudes below this are treated as a singular system.
const PIVOT_EPSILON: f64 = 1e-9;

/// A 3x3 projective transform (homography), row-major, with the scale term
/// fixed at `m[8] = 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    m: [f64; 9],
}

impl Homography {
    /// Solve the projective transform mapping `src[i]` onto `dst[i]`.
    ///
    /// Builds the 8x8 linear system from the projective mapping relations
    /// `x' = (ax+by+c)/(gx+hy+1)`, `y' = (dx+ey+f)/(gx+hy+1)` and solves it
    /// with Gaussian elimination under partial pivoting. Identical inputs
    /// always produce identical output.
    pub fn solve(src: &[Point; 4], dst: &[Point; 4]) -> Result<Self, SolveError> {
        let mut a = [[0.0f64; 8]; 8];
        let mut b = [0.0f64; 8];

        for i in 0..4 {
            let Point { x, y } = src[i];
            let Point { x: xp, y: yp } = dst[i];

            let row1 = i * 2;
            let row2 = i * 2 + 1;

            a[row1][0] = x;
            a[row1][1] = y;
            a[row1][2] = 1.0;
            a[row1][6] = -xp * x;
            a[row1][7] = -xp * y;
            b[row1] = xp;

            a[row2][3] = x;
            a[row2][4] = y;
            a[row2][5] = 1.0;
            a[row2][6] = -yp * x;
            a[row2][7] = -yp * y;
            b[row2] = yp;
        }

        let h = solve_linear_system(&mut a, &mut b)?;

        Ok(Self {
            m: [h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0],
        })
    }

    /// Map a point from the source plane to the destination plane.
    #[inline]
    pub fn apply(&self, p: Point) -> Point {
        let m = &self.m;
        let w = m[6] * p.x + m[7] * p.y + m[8];
        if w.abs() < 1e-10 {
            // Point at infinity in the destination plane.
            return p;
        }
        Point::new(
            (m[0] * p.x + m[1] * p.y + m[2]) / w,
            (m[3] * p.x + m[4] * p.y + m[5]) / w,
        )
    }

    /// Invert the transform for reverse mapping (used when warping, where
    /// each output pixel is pulled from the source image).
    pub fn inverse(&self) -> Result<Self, SolveError> {
        let m = &self.m;
        let det = m[0] * (m[4] * m[8] - m[5] * m[7])
            - m[1] * (m[3] * m[8] - m[5] * m[6])
            + m[2] * (m[3] * m[7] - m[4] * m[6]);
        if det.abs() < PIVOT_EPSILON {
            return Err(SolveError { pivot: det });
        }

        let inv_det = 1.0 / det;
        let mut inv = [
            (m[4] * m[8] - m[5] * m[7]) * inv_det,
            (m[2] * m[7] - m[1] * m[8]) * inv_det,
            (m[1] * m[5] - m[2] * m[4]) * inv_det,
            (m[5] * m[6] - m[3] * m[8]) * inv_det,
            (m[0] * m[8] - m[2] * m[6]) * inv_det,
            (m[2] * m[3] - m[0] * m[5]) * inv_det,
            (m[3] * m[7] - m[4] * m[6]) * inv_det,
            (m[1] * m[6] - m[0] * m[7]) * inv_det,
            (m[0] * m[4] - m[1] * m[3]) * inv_det,
        ];

        // Renormalize so the scale term stays fixed at 1.
        if inv[8].abs() > PIVOT_EPSILON {
            let s = 1.0 / inv[8];
            for v in inv.iter_mut() {
                *v *= s;
            }
        }

        Ok(Self { m: inv })
    }
}

/// Solve an 8x8 linear system with Gaussian elimination and partial
/// pivoting: at each step the row with the largest absolute leading
/// coefficient in the remaining submatrix is swapped into pivot position.
fn solve_linear_system(a: &mut [[f64; 8]; 8], b: &mut [f64; 8]) -> Result<[f64; 8], SolveError> {
    let n = 8;

    for col in 0..n {
        let mut max_row = col;
        let mut max_val = a[col][col].abs();
        for row in (col + 1)..n {
            if a[row][col].abs() > max_val {
                max_val = a[row][col].abs();
                max_row = row;
            }
        }

        if max_row != col {
            a.swap(col, max_row);
            b.swap(col, max_row);
        }

        let pivot = a[col][col];
        if pivot.abs() < PIVOT_EPSILON {
            return Err(SolveError { pivot });
        }

        for row in (col + 1)..n {
            let factor = a[row][col] / pivot;
            for j in col..n {
                a[row][j] -= factor * a[col][j];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0f64; 8];
    for i in (0..n).rev() {
        let mut sum = b[i];
        for j in (i + 1)..n {
            sum -= a[i][j] * x[j];
        }
        x[i] = sum / a[i][i];
    }

    Ok(x)
}
