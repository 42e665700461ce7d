use crate::fit::SinusoidalModel;
use crate::grid::Grid;
use crate::refraction::{RawRefraction, Refraction};
use crate::roi::RoiStatistics;
use crate::transform::SimilarityTransform;

/// Why a measurement did or did not produce a prescription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementStatus {
    Ok,
    /// No dot near the expected seed position.
    NoSeed,
    /// The stage looks empty (optical center classifier).
    NoLens,
    /// No optical center candidate, or the grids are not co-indexed.
    NoCenter,
    /// The sinusoid fit failed a quality gate.
    FitRejected,
    /// The prescription matches the empty-stage baseline band.
    NoLensBaseline,
}

/// Single-vision measurement.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Measurement {
    pub status: MeasurementStatus,
    /// Device-rounded prescription; `is_valid` is `false` unless `status` is `Ok`.
    pub refraction: Refraction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<RawRefraction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<SinusoidalModel>,
    /// Optical center in zero-grid pixel coordinates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optical_center: Option<[f32; 2]>,
    /// Zero-grid cell the polar samples were anchored at.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center_cell: Option<(usize, usize)>,
}

impl Measurement {
    pub(crate) fn failed(status: MeasurementStatus) -> Self {
        Self {
            status,
            refraction: Refraction::invalid(),
            raw: None,
            model: None,
            optical_center: None,
            center_cell: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == MeasurementStatus::Ok
    }
}

/// Far/near region statistics of a progressive lens.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ProgressiveResult {
    pub far: RoiStatistics,
    pub near: RoiStatistics,
    /// Far-zone prescription with `add` set when both regions are valid.
    pub refraction: Refraction,
}

/// One eye's tracked grids plus its pixel-to-stage transform.
#[derive(Debug, Clone, Copy)]
pub struct EyeInput<'a> {
    pub zero: &'a Grid,
    pub sample: &'a Grid,
    /// Maps zero-grid pixels to stage millimeters; required for partial PD.
    pub transform: Option<SimilarityTransform>,
}

/// Both eyes of one exam.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ExamResult {
    pub right: Measurement,
    pub left: Measurement,
}
