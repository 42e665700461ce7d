//! High-level measurement API.
//!
//! [`Lensmeter`] is the primary entry point. It wraps a [`LensmeterConfig`]
//! and exposes the measurement scenarios: single vision, progressive regions
//! and two-eye exams.

use image::GrayImage;
use std::path::Path;

use crate::config::LensmeterConfig;
use crate::frame::Frame;
use crate::grid::{locate_seed, Anchor, Grid, GridError};
use crate::mask::chroma_mask;
use crate::pipeline::{self, ExamResult, EyeInput, Measurement, ProgressiveResult};
use crate::roi::{GridRoi, RoiStatistics};

/// Primary measurement interface.
///
/// Create once, measure many frames.
///
/// # Examples
///
/// ```no_run
/// use lensgrid::{Frame, Lensmeter};
///
/// let lensmeter = Lensmeter::new();
/// let zero_buf = vec![128u8; 640 * 480 * 3 / 2];
/// let sample_buf = zero_buf.clone();
/// let zero = Frame::new(&zero_buf, 640, 480).unwrap();
/// let sample = Frame::new(&sample_buf, 640, 480).unwrap();
/// let m = lensmeter.measure(&zero, &sample).unwrap();
/// println!("{:?}: {:?}", m.status, m.refraction);
/// ```
pub struct Lensmeter {
    config: LensmeterConfig,
}

impl Default for Lensmeter {
    fn default() -> Self {
        Self::new()
    }
}

impl Lensmeter {
    /// Create a lensmeter with default configuration.
    pub fn new() -> Self {
        Self {
            config: LensmeterConfig::default(),
        }
    }

    /// Create with full config control.
    pub fn with_config(config: LensmeterConfig) -> Self {
        Self { config }
    }

    /// Load a JSON configuration and create a lensmeter in one step.
    pub fn from_json_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self::with_config(LensmeterConfig::from_json_file(path)?))
    }

    /// Access the current configuration.
    pub fn config(&self) -> &LensmeterConfig {
        &self.config
    }

    /// Mutable access to configuration for post-construction tuning.
    pub fn config_mut(&mut self) -> &mut LensmeterConfig {
        &mut self.config
    }

    /// Dot nearest the frame center.
    pub fn locate_seed(&self, frame: &Frame<'_>) -> Option<[f32; 2]> {
        locate_seed(frame, &self.config.filter, frame.center(), &self.config.seed)
    }

    /// Track a grid from `seed`, honoring `anchors`, and trim outlier columns.
    pub fn track(
        &self,
        frame: &Frame<'_>,
        seed: [f32; 2],
        anchors: &[Anchor],
    ) -> Result<Grid, GridError> {
        pipeline::track_frame(frame, seed, anchors, &self.config, &self.config.device)
    }

    /// Single-vision measurement from already tracked, co-indexed grids.
    pub fn measure_grids(&self, zero: &Grid, sample: &Grid) -> Measurement {
        pipeline::measure_grids(zero, sample, &self.config, &self.config.device)
    }

    /// Seed, track and measure a zero/sample frame pair.
    pub fn measure(&self, zero: &Frame<'_>, sample: &Frame<'_>) -> Result<Measurement, GridError> {
        pipeline::measure_frames(zero, sample, &self.config, &self.config.device)
    }

    /// Percentile statistics of the fits over one region.
    pub fn roi_statistics(&self, zero: &Grid, sample: &Grid, roi: &GridRoi) -> RoiStatistics {
        pipeline::roi_statistics(zero, sample, roi, &self.config, &self.config.device)
    }

    /// Far/near statistics and the add of a progressive lens.
    pub fn measure_progressive(
        &self,
        zero: &Grid,
        sample: &Grid,
        far_roi: &GridRoi,
        near_roi: &GridRoi,
    ) -> ProgressiveResult {
        pipeline::measure_progressive(
            zero,
            sample,
            far_roi,
            near_roi,
            &self.config,
            &self.config.device,
        )
    }

    /// Measure both eyes of an exam, including partial PD where a stage
    /// transform is available.
    pub fn measure_exam(&self, right: &EyeInput<'_>, left: &EyeInput<'_>) -> ExamResult {
        pipeline::measure_exam(right, left, &self.config, &self.config.device)
    }

    /// Filtered chroma image for diagnostics.
    pub fn chroma_mask(&self, frame: &Frame<'_>) -> GrayImage {
        chroma_mask(frame, &self.config.filter)
    }
}
