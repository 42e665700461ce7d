use std::path::Path;

use crate::device::{DeviceSettings, StagePosition};
use crate::fit::FitConfig;
use crate::frame::ChrominanceFilter;
use crate::grid::{BoundaryConfig, SeedConfig, TrackerConfig};
use crate::optical_center::OpticalCenterConfig;
use crate::polar::NeighborVector;
use crate::refraction::RefractionConfig;
use crate::roi::RoiConfig;

/// Physical layout of the dot pattern as seen by the camera.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GridGeometry {
    /// Tracked rows (odd).
    pub rows: usize,
    /// Tracked columns (odd).
    pub cols: usize,
    /// Dot pitch (pixels) of the distance grid without a lens.
    pub pitch_px: f32,
    /// Dot pitch (pixels) of the near grid on smart-stage devices.
    pub near_pitch_px: f32,
}

impl Default for GridGeometry {
    fn default() -> Self {
        Self {
            rows: 11,
            cols: 15,
            pitch_px: 24.0,
            near_pitch_px: 18.0,
        }
    }
}

impl GridGeometry {
    pub fn pitch_for(&self, stage: StagePosition) -> f32 {
        match stage {
            StagePosition::Distance => self.pitch_px,
            StagePosition::Near => self.near_pitch_px,
        }
    }
}

/// Two-eye exam parameters.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ExamConfig {
    /// Stage x (millimeters) of the nose-bridge midline partial PD is measured from.
    pub midline_x_mm: f64,
}

impl Default for ExamConfig {
    fn default() -> Self {
        Self { midline_x_mm: 0.0 }
    }
}

/// Top-level measurement configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LensmeterConfig {
    pub filter: ChrominanceFilter,
    pub geometry: GridGeometry,
    pub seed: SeedConfig,
    pub tracker: TrackerConfig,
    pub boundary: BoundaryConfig,
    pub optical_center: OpticalCenterConfig,
    pub fit: FitConfig,
    pub refraction: RefractionConfig,
    pub roi: RoiConfig,
    pub exam: ExamConfig,
    pub device: DeviceSettings,
    /// Vectors sampled around the polar anchor.
    pub neighbor_vectors: Vec<NeighborVector>,
}

impl Default for LensmeterConfig {
    fn default() -> Self {
        Self {
            filter: ChrominanceFilter::default(),
            geometry: GridGeometry::default(),
            seed: SeedConfig::default(),
            tracker: TrackerConfig::default(),
            boundary: BoundaryConfig::default(),
            optical_center: OpticalCenterConfig::default(),
            fit: FitConfig::default(),
            refraction: RefractionConfig::default(),
            roi: RoiConfig::default(),
            exam: ExamConfig::default(),
            device: DeviceSettings::default(),
            neighbor_vectors: NeighborVector::rings(&[2, 3]),
        }
    }
}

impl LensmeterConfig {
    /// Load a (possibly partial) JSON configuration.
    pub fn from_json_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let data = std::fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Check invariants the stages rely on.
    pub fn validate(&self) -> Result<(), String> {
        let g = &self.geometry;
        if g.rows == 0 || g.cols == 0 || g.rows % 2 == 0 || g.cols % 2 == 0 {
            return Err(format!("grid dimensions must be odd, got {}x{}", g.rows, g.cols));
        }
        if !(g.pitch_px > 0.0 && g.near_pitch_px > 0.0) {
            return Err(format!(
                "grid pitch must be positive, got {} / {}",
                g.pitch_px, g.near_pitch_px
            ));
        }
        if self.neighbor_vectors.is_empty() {
            return Err("at least one neighbor vector is required".to_string());
        }
        let band = self.tracker.band;
        if !(band.min > 0.0 && band.min < band.max) {
            return Err(format!("invalid step band [{}, {}]", band.min, band.max));
        }
        if !(self.fit.damping > 0.0 && self.fit.damping <= 1.0) {
            return Err(format!("fit damping must be in (0, 1], got {}", self.fit.damping));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = LensmeterConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.neighbor_vectors.len(), 40);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let json = r#"{
            "geometry": { "rows": 21, "pitch_px": 30.0 },
            "fit": { "max_residual_std": 0.5 },
            "device": { "kind": "smart_stage", "stage": "near" }
        }"#;
        let cfg: LensmeterConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.geometry.rows, 21);
        assert_eq!(cfg.geometry.cols, 15);
        assert_eq!(cfg.fit.max_residual_std, 0.5);
        assert_eq!(cfg.fit.damping, 0.5);
        assert_eq!(cfg.tracker, TrackerConfig::default());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn even_grid_is_rejected() {
        let cfg = LensmeterConfig {
            geometry: GridGeometry {
                rows: 10,
                ..GridGeometry::default()
            },
            ..LensmeterConfig::default()
        };
        assert!(cfg.validate().unwrap_err().contains("odd"));
    }

    #[test]
    fn json_round_trip_through_file() {
        let dir = std::env::temp_dir().join(format!("lensgrid-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        let mut cfg = LensmeterConfig::default();
        cfg.geometry.pitch_px = 31.5;
        std::fs::write(&path, cfg.to_json().unwrap()).unwrap();
        let loaded = LensmeterConfig::from_json_file(&path).unwrap();
        assert_eq!(loaded, cfg);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn pitch_follows_stage() {
        let g = GridGeometry::default();
        assert_eq!(g.pitch_for(StagePosition::Distance), 24.0);
        assert_eq!(g.pitch_for(StagePosition::Near), 18.0);
    }
}
