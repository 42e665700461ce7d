//! Sinusoid-to-prescription conversion.

use std::f64::consts::FRAC_PI_2;

use crate::fit::SinusoidalModel;

/// Unrounded sphere/cylinder/axis derived from a fit.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RawRefraction {
    pub sphere: f64,
    pub cylinder: f64,
    /// Degrees in `[0, 180)`.
    pub axis: f64,
}

impl RawRefraction {
    /// Minus-cylinder prescription of a fitted power sinusoid.
    pub fn from_model(model: &SinusoidalModel) -> Self {
        let a = model.amplitude.abs();
        let axis = ((FRAC_PI_2 - model.phase) * 0.5 + FRAC_PI_2).to_degrees();
        Self {
            sphere: a + model.offset,
            cylinder: -2.0 * a,
            axis: axis.rem_euclid(180.0),
        }
    }
}

/// Final device-rounded prescription.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Refraction {
    pub sphere: f64,
    pub cylinder: f64,
    /// Whole degrees in `[0, 180)`.
    pub axis: f64,
    pub add: Option<f64>,
    /// Monocular pupillary distance in millimeters.
    pub partial_pd: Option<f64>,
    /// `false` when the reading looks like an empty stage.
    pub is_valid: bool,
}

impl Refraction {
    /// Placeholder for readings that produced no prescription.
    pub fn invalid() -> Self {
        Self {
            sphere: 0.0,
            cylinder: 0.0,
            axis: 0.0,
            add: None,
            partial_pd: None,
            is_valid: false,
        }
    }
}

/// Rounding steps and the empty-stage band.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RefractionConfig {
    pub sphere_step: f64,
    pub cylinder_step: f64,
    pub axis_step_deg: f64,
    pub add_step: f64,
    pub pd_step_mm: f64,
    /// Rounded cylinders at or above this report axis 0.
    pub axis_cylinder_floor: f64,
    /// Raw sphere range that reads as "no lens" when the cylinder rounds to 0.
    pub no_lens_sphere_min: f64,
    pub no_lens_sphere_max: f64,
}

impl Default for RefractionConfig {
    fn default() -> Self {
        Self {
            sphere_step: 0.25,
            cylinder_step: 0.25,
            axis_step_deg: 1.0,
            add_step: 0.25,
            pd_step_mm: 0.5,
            axis_cylinder_floor: -0.25,
            no_lens_sphere_min: -0.40,
            no_lens_sphere_max: -0.36,
        }
    }
}

fn round_to(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    // `+ 0.0` turns -0.0 into 0.0.
    (value / step).round() * step + 0.0
}

/// Rounds raw readings to the device's reporting steps.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefractionConverter {
    cfg: RefractionConfig,
}

impl RefractionConverter {
    pub fn new(cfg: RefractionConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &RefractionConfig {
        &self.cfg
    }

    pub fn finalize(&self, raw: &RawRefraction) -> Refraction {
        let sphere = round_to(raw.sphere, self.cfg.sphere_step);
        let cylinder = round_to(raw.cylinder, self.cfg.cylinder_step);
        let mut axis = round_to(raw.axis, self.cfg.axis_step_deg).rem_euclid(180.0);
        if cylinder >= self.cfg.axis_cylinder_floor {
            axis = 0.0;
        }
        let no_lens = cylinder == 0.0
            && (self.cfg.no_lens_sphere_min..=self.cfg.no_lens_sphere_max).contains(&raw.sphere);
        if no_lens {
            tracing::debug!(sphere = raw.sphere, "reading matches the empty-stage band");
        }
        Refraction {
            sphere,
            cylinder,
            axis,
            add: None,
            partial_pd: None,
            is_valid: !no_lens,
        }
    }

    pub fn with_add(&self, refraction: Refraction, add: f64) -> Refraction {
        Refraction {
            add: add.is_finite().then(|| round_to(add, self.cfg.add_step)),
            ..refraction
        }
    }

    pub fn with_partial_pd(&self, refraction: Refraction, pd_mm: f64) -> Refraction {
        Refraction {
            partial_pd: pd_mm.is_finite().then(|| round_to(pd_mm, self.cfg.pd_step_mm)),
            ..refraction
        }
    }
}
