//! Local center-of-mass search on the filtered chroma plane.

use crate::frame::{ChrominanceFilter, Frame};

/// Mass-weighted centroid of a search window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassCentroid {
    /// Sub-pixel position (pixel centers at `x + 0.5`).
    pub position: [f32; 2],
    /// Sum of filtered chroma values inside the window.
    pub mass: f64,
}

/// Accepted range of a measured step relative to the expected one.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StepBand {
    pub min: f32,
    pub max: f32,
}

impl Default for StepBand {
    fn default() -> Self {
        Self {
            min: 0.7,
            max: 1.45,
        }
    }
}

/// Window sizes for the two-pass dot refinement.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Broad-pass half-width as a fraction of the step length.
    pub broad_radius_frac: f32,
    /// Fine-pass half-width as a fraction of the step length.
    pub fine_radius_frac: f32,
    /// Lower bound for either half-width (pixels).
    pub min_radius_px: i32,
    /// Windows with total mass at or below this are empty.
    pub min_mass: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            broad_radius_frac: 0.5,
            fine_radius_frac: 0.25,
            min_radius_px: 2,
            min_mass: 100.0,
        }
    }
}

/// Seed finder parameters.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    /// Half-width (pixels) of the window scanned for dot peaks.
    pub search_radius_px: i32,
    /// Pixels at or above `peak_fraction × max` count as dot peaks.
    pub peak_fraction: f32,
    /// Half-width (pixels) of the first centroid pass.
    pub refine_radius_px: i32,
    /// Centroid passes; each pass shrinks the window by a quarter.
    pub max_iterations: usize,
    /// Stop once a pass moves the estimate less than this (pixels).
    pub convergence_px: f32,
    pub min_mass: f64,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            search_radius_px: 48,
            peak_fraction: 0.5,
            refine_radius_px: 8,
            max_iterations: 5,
            convergence_px: 0.05,
            min_mass: 100.0,
        }
    }
}

/// Weighted centroid of `filtered` values in the `(2r+1)²` window around `center`.
///
/// Returns `None` when the window carries no more than `min_mass`.
pub fn center_of_mass(
    frame: &Frame<'_>,
    filter: &ChrominanceFilter,
    center: [f32; 2],
    radius: i32,
    min_mass: f64,
) -> Option<MassCentroid> {
    if !center[0].is_finite() || !center[1].is_finite() {
        return None;
    }
    let cx = center[0].floor() as i32;
    let cy = center[1].floor() as i32;
    let mut mass = 0.0f64;
    let mut sx = 0.0f64;
    let mut sy = 0.0f64;
    for y in (cy - radius)..=(cy + radius) {
        for x in (cx - radius)..=(cx + radius) {
            let w = frame.filtered(x, y, filter) as f64;
            if w == 0.0 {
                continue;
            }
            mass += w;
            sx += w * (x as f64 + 0.5);
            sy += w * (y as f64 + 0.5);
        }
    }
    if mass <= min_mass {
        return None;
    }
    Some(MassCentroid {
        position: [(sx / mass) as f32, (sy / mass) as f32],
        mass,
    })
}

/// Two-pass dot refinement around a predicted position.
///
/// The broad pass recovers from prediction error, the fine pass re-centers on
/// the dot alone so that neighbors do not bias the centroid.
pub fn refine_dot(
    frame: &Frame<'_>,
    filter: &ChrominanceFilter,
    predicted: [f32; 2],
    step_len: f32,
    cfg: &SearchConfig,
) -> Option<[f32; 2]> {
    let broad_r = ((cfg.broad_radius_frac * step_len).round() as i32).max(cfg.min_radius_px);
    let fine_r = ((cfg.fine_radius_frac * step_len).round() as i32).max(cfg.min_radius_px);
    let broad = center_of_mass(frame, filter, predicted, broad_r, cfg.min_mass)?;
    let fine = center_of_mass(frame, filter, broad.position, fine_r, cfg.min_mass);
    Some(fine.unwrap_or(broad).position)
}

/// `band.min × expected ≤ displacement ≤ band.max × expected`.
#[inline]
pub fn step_is_plausible(displacement: f32, expected: f32, band: StepBand) -> bool {
    expected > 0.0 && displacement >= band.min * expected && displacement <= band.max * expected
}

/// Find the dot nearest `approx`.
///
/// Picks the strongest-chroma pixel closest to `approx`, then re-centers with
/// shrinking centroid windows until the estimate settles.
pub fn locate_seed(
    frame: &Frame<'_>,
    filter: &ChrominanceFilter,
    approx: [f32; 2],
    cfg: &SeedConfig,
) -> Option<[f32; 2]> {
    let cx = approx[0].floor() as i32;
    let cy = approx[1].floor() as i32;
    let r = cfg.search_radius_px;

    let mut peak = 0u8;
    for y in (cy - r)..=(cy + r) {
        for x in (cx - r)..=(cx + r) {
            peak = peak.max(frame.filtered(x, y, filter));
        }
    }
    if peak == 0 {
        return None;
    }
    let level = (peak as f32 * cfg.peak_fraction).ceil() as u8;

    let mut best: Option<([f32; 2], f32)> = None;
    for y in (cy - r)..=(cy + r) {
        for x in (cx - r)..=(cx + r) {
            if frame.filtered(x, y, filter) < level.max(1) {
                continue;
            }
            let p = [x as f32 + 0.5, y as f32 + 0.5];
            let d2 = (p[0] - approx[0]).powi(2) + (p[1] - approx[1]).powi(2);
            if best.map_or(true, |(_, bd)| d2 < bd) {
                best = Some((p, d2));
            }
        }
    }
    let (mut pos, _) = best?;

    let mut radius = cfg.refine_radius_px.max(1) as f32;
    for _ in 0..cfg.max_iterations.max(1) {
        let c = center_of_mass(frame, filter, pos, radius.round() as i32, cfg.min_mass)?;
        let moved = ((c.position[0] - pos[0]).powi(2) + (c.position[1] - pos[1]).powi(2)).sqrt();
        pos = c.position;
        if moved < cfg.convergence_px {
            break;
        }
        radius = (radius * 0.75).max(2.0);
    }
    Some(pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{render_frame, DotStyle};

    fn single_dot(at: [f32; 2]) -> Vec<u8> {
        render_frame(64, 64, &[at], &DotStyle::default())
    }

    #[test]
    fn centroid_recovers_subpixel_position() {
        let at = [30.3, 33.8];
        let buf = single_dot(at);
        let frame = Frame::new(&buf, 64, 64).unwrap();
        let filter = ChrominanceFilter::default();
        let c = center_of_mass(&frame, &filter, [28.0, 31.0], 10, 1.0).unwrap();
        assert!((c.position[0] - at[0]).abs() < 0.35, "{:?}", c.position);
        assert!((c.position[1] - at[1]).abs() < 0.35, "{:?}", c.position);
        assert!(c.mass > 1000.0);
    }

    #[test]
    fn empty_window_has_no_mass() {
        let buf = single_dot([10.0, 10.0]);
        let frame = Frame::new(&buf, 64, 64).unwrap();
        let filter = ChrominanceFilter::default();
        assert!(center_of_mass(&frame, &filter, [50.0, 50.0], 5, 0.0).is_none());
        assert!(center_of_mass(&frame, &filter, [f32::NAN, 50.0], 5, 0.0).is_none());
    }

    #[test]
    fn window_past_the_frame_edge_is_safe() {
        let buf = single_dot([2.0, 2.0]);
        let frame = Frame::new(&buf, 64, 64).unwrap();
        let c = center_of_mass(&frame, &ChrominanceFilter::default(), [0.0, 0.0], 8, 1.0);
        assert!(c.is_some());
    }

    #[test]
    fn refine_pulls_a_poor_prediction_onto_the_dot() {
        let at = [32.5, 32.5];
        let buf = single_dot(at);
        let frame = Frame::new(&buf, 64, 64).unwrap();
        let p = refine_dot(
            &frame,
            &ChrominanceFilter::default(),
            [38.0, 28.0],
            24.0,
            &SearchConfig::default(),
        )
        .unwrap();
        assert!((p[0] - at[0]).abs() < 0.35 && (p[1] - at[1]).abs() < 0.35, "{p:?}");
    }

    #[test]
    fn step_band_edges() {
        let band = StepBand::default();
        let eps = 1e-3;
        assert!(step_is_plausible(7.0 + eps, 10.0, band));
        assert!(!step_is_plausible(7.0 - eps, 10.0, band));
        assert!(step_is_plausible(14.5 - eps, 10.0, band));
        assert!(!step_is_plausible(14.5 + eps, 10.0, band));
        assert!(!step_is_plausible(0.0, 0.0, band));
    }

    #[test]
    fn seed_is_the_dot_nearest_the_hint() {
        let dots = [[20.5, 32.5], [44.5, 32.5]];
        let buf = render_frame(64, 64, &dots, &DotStyle::default());
        let frame = Frame::new(&buf, 64, 64).unwrap();
        let cfg = SeedConfig::default();
        let filter = ChrominanceFilter::default();

        let p = locate_seed(&frame, &filter, [36.0, 30.0], &cfg).unwrap();
        assert!((p[0] - 44.5).abs() < 0.4 && (p[1] - 32.5).abs() < 0.4, "{p:?}");

        let p = locate_seed(&frame, &filter, [28.0, 36.0], &cfg).unwrap();
        assert!((p[0] - 20.5).abs() < 0.4, "{p:?}");
    }

    #[test]
    fn seed_on_a_blank_frame_is_none() {
        let buf = render_frame(64, 64, &[], &DotStyle::default());
        let frame = Frame::new(&buf, 64, 64).unwrap();
        let filter = ChrominanceFilter::default();
        let seed = locate_seed(&frame, &filter, [32.0, 32.0], &SeedConfig::default());
        assert!(seed.is_none());
    }
}
