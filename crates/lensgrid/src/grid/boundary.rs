//! Column boundary consistency check.
//!
//! Walkers that slip past the lens edge (or onto reflections) leave columns
//! that reach much further than their neighbors. Each column's top and bottom
//! extent is compared to a percentile estimate over all columns and outliers
//! are cut back. Refinement only ever invalidates cells.

use crate::stats::{percentile, sort_into};

use super::{Grid, GridDot};

/// Boundary refinement parameters.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    /// Percentile of column tops taken as the expected top.
    pub top_percentile: f64,
    /// Percentile of column bottoms taken as the expected bottom.
    pub bottom_percentile: f64,
    /// Allowed deviation from the expected boundary in cells.
    pub max_index_deviation: usize,
    /// Allowed deviation from the expected boundary in pixels.
    pub max_position_deviation_px: f32,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            top_percentile: 0.2,
            bottom_percentile: 0.8,
            max_index_deviation: 10,
            max_position_deviation_px: 80.0,
        }
    }
}

/// Extent of one column around the center row.
#[derive(Debug, Clone, Copy)]
struct ColumnExtent {
    /// Outermost row still inside the tracked region, upward.
    top: usize,
    /// Outermost row still inside the tracked region, downward.
    bottom: usize,
    top_y: Option<f32>,
    bottom_y: Option<f32>,
}

/// Reusable boundary refiner.
#[derive(Debug, Default)]
pub struct BoundaryRefiner {
    extents: Vec<ColumnExtent>,
    tops: Vec<f64>,
    bottoms: Vec<f64>,
    top_ys: Vec<f64>,
    bottom_ys: Vec<f64>,
}

impl BoundaryRefiner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate cells of outlier columns. Returns the number of cells
    /// turned invalid.
    pub fn refine(&mut self, grid: &mut Grid, cfg: &BoundaryConfig) -> usize {
        self.extents.clear();
        self.tops.clear();
        self.bottoms.clear();
        self.top_ys.clear();
        self.bottom_ys.clear();

        let (r0, _) = grid.center_cell();
        for c in 0..grid.cols() {
            let column = grid.column(c);
            let (top, top_y) = scan_extent(column, (0..r0).rev());
            let (bottom, bottom_y) = scan_extent(column, r0 + 1..column.len());
            self.extents.push(ColumnExtent {
                top: top.unwrap_or(r0),
                bottom: bottom.unwrap_or(r0),
                top_y,
                bottom_y,
            });
        }

        sort_into(self.extents.iter().map(|e| e.top as f64), &mut self.tops);
        sort_into(self.extents.iter().map(|e| e.bottom as f64), &mut self.bottoms);
        sort_into(self.extents.iter().filter_map(|e| e.top_y.map(f64::from)), &mut self.top_ys);
        sort_into(
            self.extents.iter().filter_map(|e| e.bottom_y.map(f64::from)),
            &mut self.bottom_ys,
        );

        if self.extents.is_empty() {
            return 0;
        }
        let expected_top = percentile(&self.tops, cfg.top_percentile).round() as usize;
        let expected_bottom = percentile(&self.bottoms, cfg.bottom_percentile).round() as usize;
        let expected_top_y = percentile(&self.top_ys, cfg.top_percentile);
        let expected_bottom_y = percentile(&self.bottom_ys, cfg.bottom_percentile);
        tracing::debug!(
            expected_top,
            expected_bottom,
            expected_top_y,
            expected_bottom_y,
            "boundary percentiles"
        );

        let deviates = |index: usize, expected: usize, y: Option<f32>, expected_y: f64| {
            index.abs_diff(expected) > cfg.max_index_deviation
                || y.is_some_and(|y| {
                    expected_y.is_finite()
                        && (y as f64 - expected_y).abs() > cfg.max_position_deviation_px as f64
                })
        };

        let mut invalidated = 0;
        for (c, e) in self.extents.iter().enumerate() {
            if deviates(e.top, expected_top, e.top_y, expected_top_y) {
                let keep_from = e.top.max(expected_top).min(r0);
                for r in 0..keep_from {
                    if grid.get(r, c).is_valid() {
                        grid.invalidate(r, c);
                        invalidated += 1;
                    }
                }
            }
            if deviates(e.bottom, expected_bottom, e.bottom_y, expected_bottom_y) {
                let keep_to = e.bottom.min(expected_bottom).max(r0);
                for r in keep_to + 1..grid.rows() {
                    if grid.get(r, c).is_valid() {
                        grid.invalidate(r, c);
                        invalidated += 1;
                    }
                }
            }
        }
        if invalidated > 0 {
            tracing::debug!(invalidated, "boundary outliers trimmed");
        }
        invalidated
    }
}

/// Walk `rows` outward until two consecutive invalid cells. Returns the
/// outermost valid row before that break and its y.
fn scan_extent(
    column: &[GridDot],
    rows: impl Iterator<Item = usize>,
) -> (Option<usize>, Option<f32>) {
    let mut outermost = None;
    let mut last_y = None;
    let mut prev_invalid = false;
    for r in rows {
        match column[r].position() {
            Some(p) => {
                outermost = Some(r);
                last_y = Some(p[1]);
                prev_invalid = false;
            }
            None if prev_invalid => break,
            None => prev_invalid = true,
        }
    }
    (outermost, last_y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    /// `rows × cols` grid with pitch 10 and valid rows `lo..=hi` in every column.
    fn banded(rows: usize, cols: usize, lo: usize, hi: usize) -> Grid {
        let mut g = Grid::new(rows, cols, [0.0, 0.0]).unwrap();
        for c in 0..cols {
            for r in lo..=hi {
                g.set(r, c, GridDot::at([c as f32 * 10.0, r as f32 * 10.0]));
            }
        }
        g
    }

    #[test]
    fn consistent_columns_are_untouched() {
        let mut g = banded(21, 9, 5, 15);
        let before = g.clone();
        let n = BoundaryRefiner::new().refine(&mut g, &BoundaryConfig::default());
        assert_eq!(n, 0);
        assert_eq!(g, before);
    }

    #[test]
    fn overreaching_column_is_cut_to_expected_boundary() {
        let mut g = banded(21, 9, 5, 15);
        for r in 0..21 {
            g.set(r, 6, GridDot::at([60.0, r as f32 * 10.0]));
        }
        let cfg = BoundaryConfig {
            max_position_deviation_px: 40.0,
            ..BoundaryConfig::default()
        };
        let n = BoundaryRefiner::new().refine(&mut g, &cfg);
        assert_eq!(n, 10);
        assert!(!g.get(4, 6).is_valid());
        assert!(g.get(5, 6).is_valid());
        assert!(g.get(15, 6).is_valid());
        assert!(!g.get(16, 6).is_valid());
    }

    #[test]
    fn stray_dots_past_a_double_gap_do_not_extend_the_column() {
        let mut g = banded(21, 9, 5, 15);
        // Rows 3 and 4 missing, stray dot at row 1 far above.
        g.set(1, 2, GridDot::at([20.0, -200.0]));
        let cfg = BoundaryConfig {
            max_position_deviation_px: 40.0,
            ..BoundaryConfig::default()
        };
        let n = BoundaryRefiner::new().refine(&mut g, &cfg);
        assert_eq!(n, 0);
        assert!(g.get(1, 2).is_valid());
    }

    #[test]
    fn refinement_only_invalidates() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut refiner = BoundaryRefiner::new();
        let cfg = BoundaryConfig {
            max_index_deviation: 2,
            max_position_deviation_px: 15.0,
            ..BoundaryConfig::default()
        };
        for _ in 0..20 {
            let mut g = Grid::new(15, 11, [0.0, 0.0]).unwrap();
            for c in 0..11 {
                for r in 0..15 {
                    if rng.gen_bool(0.8) {
                        g.set(r, c, GridDot::at([c as f32 * 10.0, r as f32 * 10.0]));
                    }
                }
            }
            let before = g.clone();
            refiner.refine(&mut g, &cfg);
            for (r, c, dot) in g.iter() {
                if dot.is_valid() {
                    assert_eq!(dot, before.get(r, c));
                }
            }
        }
    }

    #[test]
    fn scratch_state_does_not_leak_between_calls() {
        let mut refiner = BoundaryRefiner::new();
        let cfg = BoundaryConfig {
            max_position_deviation_px: 40.0,
            ..BoundaryConfig::default()
        };
        let mut wide = banded(21, 9, 0, 20);
        refiner.refine(&mut wide, &cfg);

        let mut a = banded(21, 9, 5, 15);
        for r in 0..21 {
            a.set(r, 6, GridDot::at([60.0, r as f32 * 10.0]));
        }
        let mut b = a.clone();
        let reused = refiner.refine(&mut a, &cfg);
        let fresh = BoundaryRefiner::new().refine(&mut b, &cfg);
        assert_eq!(reused, fresh);
        assert_eq!(a, b);
    }
}
