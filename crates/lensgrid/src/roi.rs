//! Region-of-interest statistics for progressive lenses.
//!
//! A progressive lens has no single optical center, so the fit is repeated at
//! many cells of a region and summarized by percentiles. Samples are gathered
//! through [`RoiAccumulator`]; statistics only count fits that succeeded with a
//! plausible sphere.

use crate::refraction::RawRefraction;
use crate::stats::{percentile, sort_into};

/// Sphere reported by statistics without enough usable samples.
pub const INVALID_SPHERE: f64 = 99.0;

/// Inclusive cell rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GridRoi {
    pub row_min: usize,
    pub row_max: usize,
    pub col_min: usize,
    pub col_max: usize,
}

impl GridRoi {
    /// Cells to sample: every `stride`-th cell of the region that keeps
    /// `border` cells away from the grid edge.
    pub fn sample_cells(
        &self,
        rows: usize,
        cols: usize,
        border: usize,
        stride: usize,
    ) -> Vec<(usize, usize)> {
        let stride = stride.max(1);
        if rows <= 2 * border || cols <= 2 * border {
            return Vec::new();
        }
        let r_lo = self.row_min.max(border);
        let r_hi = self.row_max.min(rows - 1 - border);
        let c_lo = self.col_min.max(border);
        let c_hi = self.col_max.min(cols - 1 - border);
        if r_lo > r_hi || c_lo > c_hi {
            return Vec::new();
        }
        (r_lo..=r_hi)
            .step_by(stride)
            .flat_map(|r| (c_lo..=c_hi).step_by(stride).map(move |c| (r, c)))
            .collect()
    }
}

/// ROI sampling and acceptance parameters.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RoiConfig {
    pub stride: usize,
    /// Minimum fraction of sampled cells that must be usable.
    pub min_good_fraction: f64,
    /// Samples with `|sphere|` at or above this are discarded.
    pub max_usable_sphere: f64,
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            stride: 1,
            min_good_fraction: 0.3,
            max_usable_sphere: 25.0,
        }
    }
}

/// Collects per-cell fits of one region.
#[derive(Debug, Clone)]
pub struct RoiAccumulator {
    cfg: RoiConfig,
    sampled: usize,
    good: Vec<RawRefraction>,
}

impl RoiAccumulator {
    pub fn new(cfg: RoiConfig) -> Self {
        Self {
            cfg,
            sampled: 0,
            good: Vec::new(),
        }
    }

    /// Record one sampled cell; `None` for a failed fit.
    pub fn push(&mut self, sample: Option<RawRefraction>) {
        self.sampled += 1;
        if let Some(r) = sample {
            if r.sphere.is_finite() && r.sphere.abs() < self.cfg.max_usable_sphere {
                self.good.push(r);
            }
        }
    }

    pub fn sampled(&self) -> usize {
        self.sampled
    }

    pub fn usable(&self) -> usize {
        self.good.len()
    }

    pub fn finish(self) -> RoiStatistics {
        let usable = self.good.len();
        let enough = self.sampled > 0
            && usable as f64 >= self.cfg.min_good_fraction * self.sampled as f64;
        if !enough {
            tracing::debug!(sampled = self.sampled, usable, "roi has too few usable fits");
            return RoiStatistics {
                sampled: self.sampled,
                usable,
                is_valid: false,
                spheres: Vec::new(),
                cylinders: Vec::new(),
                axes: Vec::new(),
            };
        }
        let mut stats = RoiStatistics {
            sampled: self.sampled,
            usable,
            is_valid: true,
            spheres: Vec::with_capacity(usable),
            cylinders: Vec::with_capacity(usable),
            axes: Vec::with_capacity(usable),
        };
        sort_into(self.good.iter().map(|r| r.sphere), &mut stats.spheres);
        sort_into(self.good.iter().map(|r| r.cylinder), &mut stats.cylinders);
        sort_into(self.good.iter().map(|r| r.axis), &mut stats.axes);
        stats
    }
}

/// Percentile summary of a region.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RoiStatistics {
    pub sampled: usize,
    pub usable: usize,
    pub is_valid: bool,
    spheres: Vec<f64>,
    cylinders: Vec<f64>,
    axes: Vec<f64>,
}

impl RoiStatistics {
    /// `q` in `[0, 1]`. Invalid statistics report [`INVALID_SPHERE`].
    pub fn sphere_percentile(&self, q: f64) -> f64 {
        if !self.is_valid {
            return INVALID_SPHERE;
        }
        percentile(&self.spheres, q)
    }

    pub fn cylinder_percentile(&self, q: f64) -> f64 {
        if !self.is_valid {
            return 0.0;
        }
        percentile(&self.cylinders, q)
    }

    pub fn axis_percentile(&self, q: f64) -> f64 {
        if !self.is_valid {
            return 0.0;
        }
        percentile(&self.axes, q)
    }

    pub fn median_sphere(&self) -> f64 {
        self.sphere_percentile(0.5)
    }

    pub fn median_cylinder(&self) -> f64 {
        self.cylinder_percentile(0.5)
    }

    pub fn median_axis(&self) -> f64 {
        self.axis_percentile(0.5)
    }

    /// Median reading as a raw refraction.
    pub fn median(&self) -> RawRefraction {
        RawRefraction {
            sphere: self.median_sphere(),
            cylinder: self.median_cylinder(),
            axis: self.median_axis(),
        }
    }
}
