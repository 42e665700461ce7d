//! Damped Gauss-Newton fit of `A sin(Bθ + C) + D` with fixed frequency `B`.
//!
//! A thin lens maps a circle of neighbors onto an ellipse, so the per-angle
//! power is (to first order) a sinusoid at twice the angular frequency. The
//! fitted amplitude is half the cylinder, the offset the spherical equivalent
//! and the phase the cylinder axis.

use std::f64::consts::{PI, TAU};

use nalgebra::{Matrix3, Vector3};

use crate::device::{DeviceProfile, SinusoidParams};
use crate::polar::AngularSample;

/// Fitter parameters and quality gates.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Fixed angular frequency `B`.
    pub frequency: f64,
    /// Fraction of each Gauss-Newton update that is applied.
    pub damping: f64,
    pub max_iterations: usize,
    /// Stop once the damped update norm falls below this.
    pub epsilon: f64,
    /// Fits over fewer valid samples than this fraction are rejected.
    pub min_valid_fraction: f64,
    /// Fits with a larger residual RMS are rejected.
    pub max_residual_std: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            frequency: 2.0,
            damping: 0.5,
            max_iterations: 100,
            epsilon: 0.01,
            min_valid_fraction: 0.1,
            max_residual_std: 0.35,
        }
    }
}

/// Accepted sinusoid fit.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SinusoidalModel {
    /// Non-negative amplitude `A`.
    pub amplitude: f64,
    pub frequency: f64,
    /// Phase `C` in `[0, 2π)`.
    pub phase: f64,
    pub offset: f64,
    /// Residual RMS of the raw fit.
    pub std: f64,
}

impl SinusoidalModel {
    pub fn eval(&self, theta: f64) -> f64 {
        self.amplitude * (self.frequency * theta + self.phase).sin() + self.offset
    }

    fn params(&self) -> SinusoidParams {
        SinusoidParams {
            amplitude: self.amplitude,
            frequency: self.frequency,
            phase: self.phase,
            offset: self.offset,
        }
    }
}

/// Fold a negative amplitude into the phase and wrap the phase into `[0, 2π)`.
fn normalize(amplitude: f64, phase: f64) -> (f64, f64) {
    let (a, c) = if amplitude < 0.0 {
        (-amplitude, phase + PI)
    } else {
        (amplitude, phase)
    };
    (a, c.rem_euclid(TAU))
}

/// Fit the sinusoid to the valid samples without gating or tuning.
///
/// Returns `(model, valid_count)`; `None` when fewer than three samples are
/// valid.
pub fn fit_raw(
    samples: &[Option<AngularSample>],
    cfg: &FitConfig,
) -> Option<(SinusoidalModel, usize)> {
    let valid: Vec<AngularSample> = samples
        .iter()
        .flatten()
        .filter(|s| s.theta.is_finite() && s.value.is_finite())
        .copied()
        .collect();
    if valid.len() < 3 {
        return None;
    }

    let b = cfg.frequency;
    let (min, max) = valid
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
            (lo.min(s.value), hi.max(s.value))
        });
    let mean = valid.iter().map(|s| s.value).sum::<f64>() / valid.len() as f64;

    // p = [A, C, D]
    let mut p = Vector3::new((max - min) * 0.5, 0.0, mean);
    for iter in 0..cfg.max_iterations {
        let mut jtj = Matrix3::<f64>::zeros();
        let mut jtr = Vector3::<f64>::zeros();
        for s in &valid {
            let arg = b * s.theta + p[1];
            let (sin, cos) = arg.sin_cos();
            let r = s.value - (p[0] * sin + p[2]);
            let j = Vector3::new(sin, p[0] * cos, 1.0);
            jtj += j * j.transpose();
            jtr += j * r;
        }
        let Some(delta) = jtj.lu().solve(&jtr) else {
            tracing::trace!(iter, "singular normal equations");
            break;
        };
        if !delta.iter().all(|v| v.is_finite()) {
            break;
        }
        let update = delta * cfg.damping;
        p += update;
        if update.norm() < cfg.epsilon {
            tracing::trace!(iter, "gauss-newton converged");
            break;
        }
    }

    let sse: f64 = valid
        .iter()
        .map(|s| {
            let r = s.value - (p[0] * (b * s.theta + p[1]).sin() + p[2]);
            r * r
        })
        .sum();
    let std = (sse / valid.len() as f64).sqrt();
    let (amplitude, phase) = normalize(p[0], p[1]);
    Some((
        SinusoidalModel {
            amplitude,
            frequency: b,
            phase,
            offset: p[2],
            std,
        },
        valid.len(),
    ))
}

/// Fit, gate and device-tune a set of angular samples.
///
/// Rejected when fewer than `min_valid_fraction` of the samples are valid or
/// when the residual RMS exceeds `max_residual_std`.
pub fn fit_sinusoid(
    samples: &[Option<AngularSample>],
    cfg: &FitConfig,
    device: &dyn DeviceProfile,
) -> Option<SinusoidalModel> {
    if samples.is_empty() {
        return None;
    }
    let valid = samples.iter().filter(|s| s.is_some()).count();
    if (valid as f64) < cfg.min_valid_fraction * samples.len() as f64 {
        tracing::debug!(valid, total = samples.len(), "too few valid samples");
        return None;
    }
    let (model, _) = fit_raw(samples, cfg)?;
    if !model.std.is_finite() || model.std > cfg.max_residual_std {
        tracing::debug!(std = model.std, "fit residual too large");
        return None;
    }

    let tuned = device.fine_tune(model.params(), model.std);
    let (amplitude, phase) = normalize(tuned.amplitude, tuned.phase);
    Some(SinusoidalModel {
        amplitude,
        frequency: tuned.frequency,
        phase,
        offset: tuned.offset,
        std: model.std,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceSettings, LinearTuning};
    use approx::assert_abs_diff_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn uniform(n: usize, f: impl Fn(f64) -> f64) -> Vec<Option<AngularSample>> {
        (0..n)
            .map(|i| {
                let theta = TAU * i as f64 / n as f64;
                Some(AngularSample {
                    theta,
                    value: f(theta),
                })
            })
            .collect()
    }

    fn strict() -> FitConfig {
        FitConfig {
            epsilon: 1e-9,
            max_iterations: 200,
            ..FitConfig::default()
        }
    }

    #[test]
    fn recovers_generated_parameters() {
        let device = DeviceSettings::default();
        for &(a, c, d) in &[(0.25, 1.0, -3.5), (1.0, 5.5, 2.0), (0.6, 0.1, 0.0)] {
            let samples = uniform(40, |t| a * (2.0 * t + c).sin() + d);
            let m = fit_sinusoid(&samples, &strict(), &device).unwrap();
            assert_abs_diff_eq!(m.amplitude, a, epsilon = 1e-6);
            assert_abs_diff_eq!(m.phase, c, epsilon = 1e-6);
            assert_abs_diff_eq!(m.offset, d, epsilon = 1e-6);
            assert!(m.std < 1e-6);

            let m = fit_sinusoid(&samples, &FitConfig::default(), &device).unwrap();
            assert_abs_diff_eq!(m.amplitude, a, epsilon = 0.02);
            assert_abs_diff_eq!(m.offset, d, epsilon = 0.02);
        }
    }

    #[test]
    fn negative_amplitude_is_folded_into_phase() {
        let (a, c) = normalize(-0.5, 0.25);
        assert_abs_diff_eq!(a, 0.5);
        assert_abs_diff_eq!(c, 0.25 + PI);
        let (_, c) = normalize(1.0, -0.5);
        assert_abs_diff_eq!(c, TAU - 0.5);
    }

    #[test]
    fn amplitude_is_never_negative_under_noise() {
        let mut rng = StdRng::seed_from_u64(11);
        let device = DeviceSettings::default();
        for _ in 0..25 {
            let a = rng.gen_range(-1.0..1.0);
            let c = rng.gen_range(0.0..TAU);
            let d = rng.gen_range(-5.0..5.0);
            let samples: Vec<_> = uniform(40, |t| a * (2.0 * t + c).sin() + d)
                .into_iter()
                .map(|s| {
                    s.map(|s| AngularSample {
                        value: s.value + rng.gen_range(-0.05..0.05),
                        ..s
                    })
                })
                .collect();
            let m = fit_sinusoid(&samples, &FitConfig::default(), &device).unwrap();
            assert!(m.amplitude >= 0.0);
            assert!((0.0..TAU).contains(&m.phase));
            assert_abs_diff_eq!(m.amplitude, a.abs(), epsilon = 0.05);
        }
    }

    #[test]
    fn residual_std_gate_is_inclusive() {
        let device = DeviceSettings::default();
        let with_std = |std: f64| {
            let k = std * 2f64.sqrt();
            uniform(36, move |t| 0.5 * (2.0 * t + 1.0).sin() - 2.0 + k * (4.0 * t).sin())
        };
        let m = fit_sinusoid(&with_std(0.349), &strict(), &device).unwrap();
        assert_abs_diff_eq!(m.std, 0.349, epsilon = 1e-6);
        assert!(fit_sinusoid(&with_std(0.351), &strict(), &device).is_none());
    }

    #[test]
    fn too_few_valid_samples_are_rejected() {
        let device = DeviceSettings::default();
        let keep = |n: usize| -> Vec<Option<AngularSample>> {
            uniform(36, |t| 0.5 * (2.0 * t + 1.0).sin() - 2.0)
                .into_iter()
                .enumerate()
                .map(|(i, s)| if i % 5 == 0 && i / 5 < n { s } else { None })
                .collect()
        };
        assert!(fit_sinusoid(&keep(3), &strict(), &device).is_none());
        assert!(fit_sinusoid(&keep(4), &strict(), &device).is_some());
        assert!(fit_sinusoid(&[], &strict(), &device).is_none());
    }

    #[test]
    fn device_tuning_applies_after_the_gates() {
        let device = DeviceSettings {
            tuning: LinearTuning {
                bias: [0.0, 0.0, 0.0, 0.25],
                ..LinearTuning::default()
            },
            ..DeviceSettings::default()
        };
        let samples = uniform(40, |t| 0.5 * (2.0 * t + 1.0).sin() - 2.0);
        let m = fit_sinusoid(&samples, &strict(), &device).unwrap();
        assert_abs_diff_eq!(m.offset, -1.75, epsilon = 1e-6);
    }
}
