//! Optical center estimation from zero/sample grid displacement.
//!
//! Light through the optical center is not deviated, so the dots that moved
//! least between the zero and the sample grid surround the center. Two
//! inverse-displacement weighted passes locate it; a stage without a lens is
//! recognized by nearly every dot staying put.

use crate::device::NoLensThresholds;
use crate::grid::Grid;

/// Estimator parameters.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OpticalCenterConfig {
    /// Half-size (cells) of the window around the grid center.
    pub window_half_cells: usize,
    /// Half-width (cells) of the central vertical strip used by the no-lens test.
    pub strip_half_cells: usize,
    /// Displacement (pixels) under which a dot counts as unmoved.
    pub still_displacement_px: f32,
    /// First pass: only dots displaced less than this vote.
    pub pass1_max_displacement_px: f32,
    /// Second pass: search radius around the first estimate, in grid steps.
    pub pass2_radius_steps: f32,
    /// Second pass: only dots displaced less than this vote.
    pub pass2_max_displacement_px: f32,
    /// Added to the displacement in the `1 / (d + ε)` vote weight.
    pub weight_epsilon_px: f32,
}

impl Default for OpticalCenterConfig {
    fn default() -> Self {
        Self {
            window_half_cells: 6,
            strip_half_cells: 1,
            still_displacement_px: 1.0,
            pass1_max_displacement_px: 10.0,
            pass2_radius_steps: 10.0,
            pass2_max_displacement_px: 8.0,
            weight_epsilon_px: 0.5,
        }
    }
}

/// Outcome of the optical center search.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OpticalCenterEstimate {
    /// Center in zero-grid pixel coordinates and the nearest valid zero cell.
    Found { position: [f32; 2], cell: (usize, usize) },
    /// The stage looks empty.
    NoLens,
    /// No dot qualified (or the grids are not co-indexed).
    NoCandidates,
}

#[derive(Default)]
struct Vote {
    sx: f64,
    sy: f64,
    w: f64,
}

impl Vote {
    fn add(&mut self, p: [f32; 2], d: f32, eps: f32) {
        let w = 1.0 / (d as f64 + eps as f64);
        self.sx += w * p[0] as f64;
        self.sy += w * p[1] as f64;
        self.w += w;
    }

    fn result(&self) -> Option<[f32; 2]> {
        (self.w > 0.0).then(|| [(self.sx / self.w) as f32, (self.sy / self.w) as f32])
    }
}

/// Median horizontal spacing of the zero grid's valid neighbors.
fn grid_step(zero: &Grid) -> Option<f32> {
    let mut steps: Vec<f32> = Vec::new();
    for c in 1..zero.cols() {
        for r in 0..zero.rows() {
            if let (Some(a), Some(b)) = (zero.get(r, c - 1).position(), zero.get(r, c).position()) {
                steps.push(((b[0] - a[0]).powi(2) + (b[1] - a[1]).powi(2)).sqrt());
            }
        }
    }
    if steps.is_empty() {
        return None;
    }
    steps.sort_by(f32::total_cmp);
    Some(steps[steps.len() / 2])
}

/// Locate the optical center of the lens that turned `zero` into `sample`.
pub fn estimate_optical_center(
    zero: &Grid,
    sample: &Grid,
    thresholds: &NoLensThresholds,
    cfg: &OpticalCenterConfig,
) -> OpticalCenterEstimate {
    if !zero.same_shape(sample) {
        tracing::warn!("zero and sample grids differ in shape");
        return OpticalCenterEstimate::NoCandidates;
    }
    let (r0, c0) = zero.center_cell();
    let h = cfg.window_half_cells;
    let rows = r0.saturating_sub(h)..=(r0 + h).min(zero.rows() - 1);
    let cols = c0.saturating_sub(h)..=(c0 + h).min(zero.cols() - 1);

    let displacement = |r: usize, c: usize| -> Option<([f32; 2], f32)> {
        let z = zero.get(r, c).position()?;
        let s = sample.get(r, c).position()?;
        Some((z, ((s[0] - z[0]).powi(2) + (s[1] - z[1]).powi(2)).sqrt()))
    };

    let (mut strip_total, mut strip_still) = (0usize, 0usize);
    let (mut window_total, mut window_still) = (0usize, 0usize);
    let mut pass1 = Vote::default();
    for r in rows.clone() {
        for c in cols.clone() {
            let Some((z, d)) = displacement(r, c) else {
                continue;
            };
            let still = d < cfg.still_displacement_px;
            window_total += 1;
            window_still += still as usize;
            if c.abs_diff(c0) <= cfg.strip_half_cells {
                strip_total += 1;
                strip_still += still as usize;
            }
            if d < cfg.pass1_max_displacement_px {
                pass1.add(z, d, cfg.weight_epsilon_px);
            }
        }
    }

    let fraction = |still: usize, total: usize| {
        if total == 0 {
            0.0
        } else {
            still as f64 / total as f64
        }
    };
    let strip_fraction = fraction(strip_still, strip_total);
    let window_fraction = fraction(window_still, window_total);
    tracing::debug!(strip_fraction, window_fraction, "optical center still-dot fractions");
    if strip_fraction > thresholds.strip_fraction && window_fraction > thresholds.window_fraction {
        return OpticalCenterEstimate::NoLens;
    }

    let Some(first) = pass1.result() else {
        return OpticalCenterEstimate::NoCandidates;
    };

    let radius = grid_step(zero).unwrap_or(0.0) * cfg.pass2_radius_steps;
    let mut pass2 = Vote::default();
    for r in 0..zero.rows() {
        for c in 0..zero.cols() {
            let Some((z, d)) = displacement(r, c) else {
                continue;
            };
            let near = ((z[0] - first[0]).powi(2) + (z[1] - first[1]).powi(2)).sqrt() <= radius;
            if near && d < cfg.pass2_max_displacement_px {
                pass2.add(z, d, cfg.weight_epsilon_px);
            }
        }
    }
    let position = pass2.result().unwrap_or(first);
    tracing::debug!(
        first_x = first[0],
        first_y = first[1],
        x = position[0],
        y = position[1],
        "optical center passes"
    );

    match zero.nearest_valid_cell(position) {
        Some(cell) => OpticalCenterEstimate::Found { position, cell },
        None => OpticalCenterEstimate::NoCandidates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridDot;

    fn estimate(zero: &Grid, sample: &Grid) -> OpticalCenterEstimate {
        estimate_optical_center(
            zero,
            sample,
            &NoLensThresholds::default(),
            &OpticalCenterConfig::default(),
        )
    }

    fn grid_from(rows: usize, cols: usize, f: impl Fn(f32, f32) -> [f32; 2]) -> Grid {
        let mut g = Grid::new(rows, cols, [0.0, 0.0]).unwrap();
        for r in 0..rows {
            for c in 0..cols {
                let x = 100.0 + c as f32 * 24.0;
                let y = 100.0 + r as f32 * 24.0;
                g.set(r, c, GridDot::at(f(x, y)));
            }
        }
        g
    }

    #[test]
    fn finds_center_of_a_magnifying_lens() {
        let center = [100.0 + 8.0 * 24.0 + 5.0, 100.0 + 6.0 * 24.0 - 3.0];
        let zero = grid_from(13, 17, |x, y| [x, y]);
        let sample = grid_from(13, 17, |x, y| {
            [center[0] + (x - center[0]) * 1.08, center[1] + (y - center[1]) * 1.08]
        });
        match estimate(&zero, &sample) {
            OpticalCenterEstimate::Found { position, cell } => {
                assert!((position[0] - center[0]).abs() < 3.0, "{position:?}");
                assert!((position[1] - center[1]).abs() < 3.0, "{position:?}");
                assert_eq!(cell, (6, 8));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unmoved_grid_is_no_lens() {
        let zero = grid_from(13, 17, |x, y| [x, y]);
        let sample = grid_from(13, 17, |x, y| [x + 0.2, y - 0.1]);
        assert_eq!(
            estimate(&zero, &sample),
            OpticalCenterEstimate::NoLens
        );
    }

    #[test]
    fn both_fractions_are_required_for_no_lens() {
        // Only the central strip stays still.
        let zero = grid_from(13, 17, |x, y| [x, y]);
        let cx = 100.0 + 8.0 * 24.0;
        let sample = grid_from(13, 17, |x, y| {
            if (x - cx).abs() <= 24.0 {
                [x, y]
            } else {
                [x + 4.0, y]
            }
        });
        let est = estimate(&zero, &sample);
        assert!(matches!(est, OpticalCenterEstimate::Found { .. }), "{est:?}");
    }

    #[test]
    fn strong_displacement_everywhere_has_no_candidates() {
        let zero = grid_from(13, 17, |x, y| [x, y]);
        let sample = grid_from(13, 17, |x, y| [x + 30.0, y]);
        assert_eq!(
            estimate(&zero, &sample),
            OpticalCenterEstimate::NoCandidates
        );
    }

    #[test]
    fn shape_mismatch_has_no_candidates() {
        let zero = grid_from(13, 17, |x, y| [x, y]);
        let sample = grid_from(11, 17, |x, y| [x, y]);
        assert_eq!(
            estimate(&zero, &sample),
            OpticalCenterEstimate::NoCandidates
        );
    }
}
