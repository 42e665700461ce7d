//! Per-device calibration and post-fit tuning.
//!
//! A device is described by plain configuration values: its ratio-to-diopter
//! coefficients, the no-lens classifier thresholds and a small linear
//! correction applied to every accepted sinusoid fit. The measurement code
//! only talks to the [`DeviceProfile`] trait, so tests and integrators can
//! supply their own implementation.

use serde::{Deserialize, Serialize};

/// Linear ratio-to-diopter coefficients, persisted as four doubles.
///
/// `(c, d)` convert distance-grid ratios, `(a, b)` near-grid ratios:
/// `diopter = k1 / ratio + k0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationCoefficients {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl CalibrationCoefficients {
    /// Coefficient pair `(k1, k0)` for the given stage position.
    pub fn pair(&self, stage: StagePosition) -> (f64, f64) {
        match stage {
            StagePosition::Distance => (self.c, self.d),
            StagePosition::Near => (self.a, self.b),
        }
    }

    /// Convert a lens/zero radius ratio into diopters.
    pub fn diopter(&self, ratio: f64, stage: StagePosition) -> Option<f64> {
        if !ratio.is_finite() || ratio <= 0.0 {
            return None;
        }
        let (k1, k0) = self.pair(stage);
        let value = k1 / ratio + k0;
        value.is_finite().then_some(value)
    }

    pub fn to_array(self) -> [f64; 4] {
        [self.a, self.b, self.c, self.d]
    }

    pub fn from_array(v: [f64; 4]) -> Self {
        Self {
            a: v[0],
            b: v[1],
            c: v[2],
            d: v[3],
        }
    }
}

impl Default for CalibrationCoefficients {
    fn default() -> Self {
        Self {
            a: 40.0,
            b: -40.0,
            c: 40.0,
            d: -40.0,
        }
    }
}

/// No-lens classifier thresholds used by the optical center estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoLensThresholds {
    /// Fraction of near-still dots in the central vertical strip.
    pub strip_fraction: f64,
    /// Fraction of near-still dots in the whole search window.
    pub window_fraction: f64,
}

impl Default for NoLensThresholds {
    fn default() -> Self {
        Self {
            strip_fraction: 0.8,
            window_fraction: 0.7,
        }
    }
}

/// Which grid the optical path currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagePosition {
    #[default]
    Distance,
    Near,
}

/// Hardware family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Fixed stage, distance grid only.
    #[default]
    Standard,
    /// Motorized stage that can switch to the near grid.
    SmartStage,
}

/// Sinusoid parameters `(A, B, C, D)` of `A sin(Bθ + C) + D`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SinusoidParams {
    pub amplitude: f64,
    pub frequency: f64,
    pub phase: f64,
    pub offset: f64,
}

/// Per-parameter `gain * p + bias` correction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearTuning {
    /// Gains for `[amplitude, frequency, phase, offset]`.
    pub gain: [f64; 4],
    /// Biases for `[amplitude, frequency, phase, offset]`.
    pub bias: [f64; 4],
    /// Amplitude shrink per unit of residual std (noise floor suppression).
    pub amplitude_std_shrink: f64,
}

impl Default for LinearTuning {
    fn default() -> Self {
        Self {
            gain: [1.0; 4],
            bias: [0.0; 4],
            amplitude_std_shrink: 0.0,
        }
    }
}

impl LinearTuning {
    pub fn apply(&self, p: SinusoidParams, std: f64) -> SinusoidParams {
        let amplitude = self.gain[0] * p.amplitude + self.bias[0] - self.amplitude_std_shrink * std;
        SinusoidParams {
            amplitude: amplitude.max(0.0),
            frequency: self.gain[1] * p.frequency + self.bias[1],
            phase: self.gain[2] * p.phase + self.bias[2],
            offset: self.gain[3] * p.offset + self.bias[3],
        }
    }
}

/// Device capability consumed by the measurement stages.
pub trait DeviceProfile: Sync {
    /// Post-process accepted fit parameters.
    fn fine_tune(&self, params: SinusoidParams, std: f64) -> SinusoidParams;
    /// No-lens classifier thresholds.
    fn thresholds(&self) -> NoLensThresholds;
    /// Ratio-to-diopter coefficients.
    fn calibration(&self) -> CalibrationCoefficients;
    /// Grid currently in the optical path.
    fn stage(&self) -> StagePosition {
        StagePosition::Distance
    }
}

/// Configuration-selected device description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    pub name: String,
    pub kind: DeviceKind,
    /// Only honored by [`DeviceKind::SmartStage`].
    pub stage: StagePosition,
    pub calibration: CalibrationCoefficients,
    pub thresholds: NoLensThresholds,
    pub tuning: LinearTuning,
    /// Tuning used instead of `tuning` at the near stage position.
    pub near_tuning: Option<LinearTuning>,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            name: "standard".to_string(),
            kind: DeviceKind::Standard,
            stage: StagePosition::Distance,
            calibration: CalibrationCoefficients::default(),
            thresholds: NoLensThresholds::default(),
            tuning: LinearTuning::default(),
            near_tuning: None,
        }
    }
}

impl DeviceProfile for DeviceSettings {
    fn fine_tune(&self, params: SinusoidParams, std: f64) -> SinusoidParams {
        let tuning = match (self.stage(), &self.near_tuning) {
            (StagePosition::Near, Some(near)) => near,
            _ => &self.tuning,
        };
        tuning.apply(params, std)
    }

    fn thresholds(&self) -> NoLensThresholds {
        self.thresholds
    }

    fn calibration(&self) -> CalibrationCoefficients {
        self.calibration
    }

    fn stage(&self) -> StagePosition {
        match self.kind {
            DeviceKind::Standard => StagePosition::Distance,
            DeviceKind::SmartStage => self.stage,
        }
    }
}
