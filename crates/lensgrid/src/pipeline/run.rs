use crate::config::LensmeterConfig;
use crate::device::DeviceProfile;
use crate::fit::{fit_sinusoid, SinusoidalModel};
use crate::frame::Frame;
use crate::grid::{locate_seed, track_grid, Anchor, BoundaryRefiner, Grid, GridError};
use crate::optical_center::{estimate_optical_center, OpticalCenterEstimate};
use crate::polar::{diopter_samples, max_extent, polar_samples_at};
use crate::refraction::{RawRefraction, Refraction, RefractionConverter};
use crate::roi::{GridRoi, RoiAccumulator, RoiStatistics};

use super::result::{ExamResult, EyeInput, Measurement, MeasurementStatus, ProgressiveResult};

/// Track and boundary-refine one frame from its seed.
pub(crate) fn track_frame(
    frame: &Frame<'_>,
    seed: [f32; 2],
    anchors: &[Anchor],
    cfg: &LensmeterConfig,
    device: &dyn DeviceProfile,
) -> Result<Grid, GridError> {
    let geometry = &cfg.geometry;
    let mut grid = Grid::new(geometry.rows, geometry.cols, seed)?;
    let pitch = geometry.pitch_for(device.stage());
    track_grid(frame, &cfg.filter, &mut grid, pitch, anchors, &cfg.tracker);
    let trimmed = BoundaryRefiner::new().refine(&mut grid, &cfg.boundary);
    tracing::info!(
        valid = grid.valid_count(),
        total = geometry.rows * geometry.cols,
        trimmed,
        "grid tracked"
    );
    Ok(grid)
}

/// Sinusoid fit of the neighbor vectors anchored at `cell` in both grids.
pub(crate) fn fit_at_cell(
    zero: &Grid,
    sample: &Grid,
    cell: (usize, usize),
    cfg: &LensmeterConfig,
    device: &dyn DeviceProfile,
) -> Option<SinusoidalModel> {
    let z = polar_samples_at(zero, cell, &cfg.neighbor_vectors);
    let s = polar_samples_at(sample, cell, &cfg.neighbor_vectors);
    let readings = diopter_samples(&z, &s, &device.calibration(), device.stage());
    fit_sinusoid(&readings, &cfg.fit, device)
}

pub(crate) fn measure_grids(
    zero: &Grid,
    sample: &Grid,
    cfg: &LensmeterConfig,
    device: &dyn DeviceProfile,
) -> Measurement {
    if !zero.same_shape(sample) {
        tracing::warn!(
            zero_rows = zero.rows(),
            zero_cols = zero.cols(),
            sample_rows = sample.rows(),
            sample_cols = sample.cols(),
            "grids are not co-indexed"
        );
        return Measurement::failed(MeasurementStatus::NoCenter);
    }

    let (position, cell) =
        match estimate_optical_center(zero, sample, &device.thresholds(), &cfg.optical_center) {
            OpticalCenterEstimate::Found { position, cell } => (position, cell),
            OpticalCenterEstimate::NoLens => {
                tracing::info!("no lens on the stage");
                return Measurement::failed(MeasurementStatus::NoLens);
            }
            OpticalCenterEstimate::NoCandidates => {
                tracing::warn!("no optical center candidate");
                return Measurement::failed(MeasurementStatus::NoCenter);
            }
        };

    let mut m = Measurement::failed(MeasurementStatus::FitRejected);
    m.optical_center = Some(position);
    m.center_cell = Some(cell);

    let Some(model) = fit_at_cell(zero, sample, cell, cfg, device) else {
        tracing::warn!(row = cell.0, col = cell.1, "sinusoid fit rejected");
        return m;
    };
    let raw = RawRefraction::from_model(&model);
    let refraction = RefractionConverter::new(cfg.refraction).finalize(&raw);
    m.status = if refraction.is_valid {
        MeasurementStatus::Ok
    } else {
        MeasurementStatus::NoLensBaseline
    };
    tracing::info!(
        sphere = refraction.sphere,
        cylinder = refraction.cylinder,
        axis = refraction.axis,
        std = model.std,
        status = ?m.status,
        "measurement"
    );
    m.refraction = refraction;
    m.raw = Some(raw);
    m.model = Some(model);
    m
}

/// Seed, track and measure a zero/sample frame pair.
///
/// The sample seed is searched next to the zero seed, which co-indexes the two
/// grids as long as the lens does not shift the seed dot by half a pitch.
pub(crate) fn measure_frames(
    zero: &Frame<'_>,
    sample: &Frame<'_>,
    cfg: &LensmeterConfig,
    device: &dyn DeviceProfile,
) -> Result<Measurement, GridError> {
    let Some(zero_seed) = locate_seed(zero, &cfg.filter, zero.center(), &cfg.seed) else {
        tracing::warn!("no seed dot in the zero frame");
        return Ok(Measurement::failed(MeasurementStatus::NoSeed));
    };
    let Some(sample_seed) = locate_seed(sample, &cfg.filter, zero_seed, &cfg.seed) else {
        tracing::warn!("no seed dot in the sample frame");
        return Ok(Measurement::failed(MeasurementStatus::NoSeed));
    };
    tracing::debug!(?zero_seed, ?sample_seed, "seeds located");

    let zero_grid = track_frame(zero, zero_seed, &[], cfg, device)?;
    let sample_grid = track_frame(sample, sample_seed, &[], cfg, device)?;
    Ok(measure_grids(&zero_grid, &sample_grid, cfg, device))
}

/// Repeat the fit over a region and summarize it.
pub(crate) fn roi_statistics(
    zero: &Grid,
    sample: &Grid,
    roi: &GridRoi,
    cfg: &LensmeterConfig,
    device: &dyn DeviceProfile,
) -> RoiStatistics {
    let mut acc = RoiAccumulator::new(cfg.roi);
    if !zero.same_shape(sample) {
        tracing::warn!("roi statistics on grids that are not co-indexed");
        return acc.finish();
    }
    let border = (max_extent(&cfg.neighbor_vectors) as f64 / 2.0).ceil() as usize;
    for cell in roi.sample_cells(zero.rows(), zero.cols(), border, cfg.roi.stride) {
        let raw =
            fit_at_cell(zero, sample, cell, cfg, device).map(|m| RawRefraction::from_model(&m));
        acc.push(raw);
    }
    tracing::debug!(sampled = acc.sampled(), usable = acc.usable(), "roi sampled");
    acc.finish()
}

pub(crate) fn measure_progressive(
    zero: &Grid,
    sample: &Grid,
    far_roi: &GridRoi,
    near_roi: &GridRoi,
    cfg: &LensmeterConfig,
    device: &dyn DeviceProfile,
) -> ProgressiveResult {
    let far = roi_statistics(zero, sample, far_roi, cfg, device);
    let near = roi_statistics(zero, sample, near_roi, cfg, device);
    let converter = RefractionConverter::new(cfg.refraction);

    let mut refraction = if far.is_valid {
        converter.finalize(&far.median())
    } else {
        Refraction::invalid()
    };
    if far.is_valid && near.is_valid {
        let add = near.median_sphere() - far.median_sphere();
        refraction = converter.with_add(refraction, add);
    }
    tracing::info!(
        far_valid = far.is_valid,
        near_valid = near.is_valid,
        sphere = refraction.sphere,
        add = ?refraction.add,
        "progressive measurement"
    );
    ProgressiveResult {
        far,
        near,
        refraction,
    }
}

fn measure_eye(
    eye: &EyeInput<'_>,
    cfg: &LensmeterConfig,
    device: &dyn DeviceProfile,
) -> Measurement {
    let mut m = measure_grids(eye.zero, eye.sample, cfg, device);
    if !m.is_ok() {
        return m;
    }
    if let (Some(t), Some(c)) = (eye.transform, m.optical_center) {
        let stage = t.apply([c[0] as f64, c[1] as f64]);
        let pd = (stage[0] - cfg.exam.midline_x_mm).abs();
        m.refraction = RefractionConverter::new(cfg.refraction).with_partial_pd(m.refraction, pd);
    }
    m
}

/// Measure both eyes concurrently.
pub(crate) fn measure_exam(
    right: &EyeInput<'_>,
    left: &EyeInput<'_>,
    cfg: &LensmeterConfig,
    device: &dyn DeviceProfile,
) -> ExamResult {
    let (right, left) = rayon::join(
        || measure_eye(right, cfg, device),
        || measure_eye(left, cfg, device),
    );
    ExamResult { right, left }
}
