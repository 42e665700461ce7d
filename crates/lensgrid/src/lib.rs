//! lensgrid — dot-grid lensmeter engine.
//!
//! A lens held over a colored dot pattern distorts the grid the camera sees.
//! Comparing a "zero" frame (empty stage) with a "sample" frame (lens in
//! place) gives the local magnification in every direction, and from that
//! the sphere, cylinder and axis of the lens.
//!
//! The pipeline stages are:
//!
//! 1. **Frame** – NV21 access and chrominance filtering of dot pixels.
//! 2. **Grid** – seed location, bidirectional dot tracking with bounded
//!    search windows, and boundary refinement of the tracked columns.
//! 3. **Optical center** – displacement-weighted center estimate and the
//!    empty-stage classifier.
//! 4. **Polar** – neighbor-vector length ratios converted to diopters.
//! 5. **Fit** – damped Gauss-Newton fit of a second-harmonic sinusoid.
//! 6. **Refraction** – sphere/cylinder/axis conversion and device rounding.
//!
//! # Public API
//! - [`Lensmeter`] and [`LensmeterConfig`] as primary entry points
//! - grid tracking primitives for callers that drive their own frames
//! - the device calibration and tuning seam ([`DeviceProfile`])
//! - result structures, all `serde`-serializable

mod api;
mod config;
mod device;
mod fit;
mod frame;
mod grid;
mod mask;
mod optical_center;
mod pipeline;
mod polar;
mod refraction;
mod roi;
mod stats;
mod transform;

#[cfg(test)]
mod test_utils;

pub use api::Lensmeter;
pub use config::{ExamConfig, GridGeometry, LensmeterConfig};
pub use device::{
    CalibrationCoefficients, DeviceKind, DeviceProfile, DeviceSettings, LinearTuning,
    NoLensThresholds, SinusoidParams, StagePosition,
};
pub use fit::{fit_raw, fit_sinusoid, FitConfig, SinusoidalModel};
pub use frame::{ChrominanceFilter, Frame, FrameError};
pub use grid::{
    center_of_mass, locate_seed, refine_dot, step_is_plausible, track_grid, Anchor,
    BoundaryConfig, BoundaryRefiner, Grid, GridDot, GridError, MassCentroid, SearchConfig,
    SeedConfig, StepBand, TrackerConfig,
};
pub use mask::chroma_mask;
pub use optical_center::{estimate_optical_center, OpticalCenterConfig, OpticalCenterEstimate};
pub use pipeline::{ExamResult, EyeInput, Measurement, MeasurementStatus, ProgressiveResult};
pub use polar::{
    diopter_samples, max_extent, polar_samples, polar_samples_at, AngularSample, NeighborVector,
    PolarSample,
};
pub use refraction::{RawRefraction, Refraction, RefractionConfig, RefractionConverter};
pub use roi::{GridRoi, RoiAccumulator, RoiConfig, RoiStatistics, INVALID_SPHERE};
pub use transform::{Rect, SimilarityTransform};
