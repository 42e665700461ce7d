//! Measurement pipeline.
//!
//! This module is the glue layer that wires the stages together:
//! seed -> track -> boundary refine for each frame, then
//! optical center -> polar sampling -> diopter conversion -> sinusoid fit ->
//! prescription for each zero/sample pair.
//!
//! Algorithmic primitives live in `crate::grid`, `crate::polar`, `crate::fit`
//! and friends; this layer only decides call order and data flow.

mod result;
mod run;

pub use result::{ExamResult, EyeInput, Measurement, MeasurementStatus, ProgressiveResult};

pub(crate) use run::{
    measure_exam, measure_frames, measure_grids, measure_progressive, roi_statistics, track_frame,
};
