//! Neighbor vectors, polar samples and ratio-to-diopter conversion.
//!
//! Every neighbor vector pairs a "center" cell and a "neighbor" cell, both
//! given as `[row, col]` offsets from the grid's current polar anchor
//! ([`Grid::center_grid_position`]). The polar sample of a vector is the
//! distance and direction between the two dots. Comparing the same vector in
//! the lens grid and the zero grid yields the local magnification along that
//! direction.

use std::f64::consts::TAU;

use crate::device::{CalibrationCoefficients, StagePosition};
use crate::grid::Grid;

/// Pair of cell offsets relative to the polar anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NeighborVector {
    pub center: [i32; 2],
    pub neighbor: [i32; 2],
}

impl NeighborVector {
    /// Vectors from the anchor to every cell on the square rings of the given
    /// Chebyshev radii.
    pub fn rings(radii: &[i32]) -> Vec<Self> {
        let mut out = Vec::new();
        for &k in radii {
            if k <= 0 {
                continue;
            }
            for dr in -k..=k {
                for dc in -k..=k {
                    if dr.abs().max(dc.abs()) == k {
                        out.push(Self {
                            center: [0, 0],
                            neighbor: [dr, dc],
                        });
                    }
                }
            }
        }
        out
    }

    /// Largest Chebyshev extent of either endpoint.
    pub fn extent(&self) -> i32 {
        self.center
            .iter()
            .chain(self.neighbor.iter())
            .map(|v| v.abs())
            .max()
            .unwrap_or(0)
    }
}

/// Largest extent over a set of vectors.
pub fn max_extent(vectors: &[NeighborVector]) -> i32 {
    vectors.iter().map(NeighborVector::extent).max().unwrap_or(0)
}

/// Distance and direction between two dots; `theta` in `[0, 2π)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolarSample {
    pub r: f64,
    pub theta: f64,
}

/// One diopter reading at one angle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngularSample {
    pub theta: f64,
    pub value: f64,
}

/// Polar sample of every vector, relative to the grid's polar anchor.
///
/// Vectors that leave the grid or touch an invalid cell give `None`. The
/// measurement pipeline does not go through the anchor; it calls
/// [`polar_samples_at`] with the cell nearest the optical center.
pub fn polar_samples(grid: &Grid, vectors: &[NeighborVector]) -> Vec<Option<PolarSample>> {
    polar_samples_at(grid, grid.center_grid_position(), vectors)
}

/// [`polar_samples`] around an explicit anchor cell.
pub fn polar_samples_at(
    grid: &Grid,
    anchor: (usize, usize),
    vectors: &[NeighborVector],
) -> Vec<Option<PolarSample>> {
    vectors
        .iter()
        .map(|v| {
            let a = grid.get_offset(anchor, v.center)?.position()?;
            let b = grid.get_offset(anchor, v.neighbor)?.position()?;
            let dx = (b[0] - a[0]) as f64;
            let dy = (b[1] - a[1]) as f64;
            let r = dx.hypot(dy);
            if !r.is_finite() || r <= 0.0 {
                return None;
            }
            Some(PolarSample {
                r,
                theta: dy.atan2(dx).rem_euclid(TAU),
            })
        })
        .collect()
}

/// Convert paired zero/sample polar samples into diopter readings.
///
/// The angle comes from the zero sample. Pairs with a missing side or a
/// non-finite ratio are dropped as `None`.
pub fn diopter_samples(
    zero: &[Option<PolarSample>],
    sample: &[Option<PolarSample>],
    calibration: &CalibrationCoefficients,
    stage: StagePosition,
) -> Vec<Option<AngularSample>> {
    zero.iter()
        .zip(sample)
        .map(|(z, s)| {
            let (z, s) = (z.as_ref()?, s.as_ref()?);
            let ratio = s.r / z.r;
            let value = calibration.diopter(ratio, stage)?;
            Some(AngularSample {
                theta: z.theta,
                value,
            })
        })
        .collect()
}
