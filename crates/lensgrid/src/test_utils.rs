//! Shared synthetic-frame helpers for unit tests.
//!
//! Frames are rendered straight into the NV21 layout. Dot chroma is written
//! per 2×2 block with coverage weighting so that chroma centroids land at
//! sub-pixel accuracy.

use crate::device::CalibrationCoefficients;

const SUPERSAMPLE: usize = 4;

/// Appearance of the rendered pattern.
#[derive(Debug, Clone)]
pub(crate) struct DotStyle {
    pub radius: f32,
    pub dot_luma: u8,
    pub background_luma: u8,
    /// `[V, U]` of a fully covered block.
    pub dot_chroma: [u8; 2],
    /// Circular lens aperture `(center, radius)`; outside it luma is `outside_luma`.
    pub aperture: Option<([f32; 2], f32)>,
    pub outside_luma: u8,
}

impl Default for DotStyle {
    fn default() -> Self {
        Self {
            radius: 4.5,
            dot_luma: 90,
            background_luma: 190,
            dot_chroma: [60, 70],
            aperture: None,
            outside_luma: 15,
        }
    }
}

fn coverage(center: [f32; 2], radius: f32, x0: f32, y0: f32, size: f32) -> f32 {
    let r2 = radius * radius;
    let step = size / SUPERSAMPLE as f32;
    let mut hits = 0usize;
    for sy in 0..SUPERSAMPLE {
        for sx in 0..SUPERSAMPLE {
            let px = x0 + (sx as f32 + 0.5) * step;
            let py = y0 + (sy as f32 + 0.5) * step;
            let dx = px - center[0];
            let dy = py - center[1];
            if dx * dx + dy * dy <= r2 {
                hits += 1;
            }
        }
    }
    hits as f32 / (SUPERSAMPLE * SUPERSAMPLE) as f32
}

fn blend(bg: u8, fg: u8, t: f32) -> u8 {
    (bg as f32 + (fg as f32 - bg as f32) * t).round().clamp(0.0, 255.0) as u8
}

/// Render dots (pixel-center convention: pixel `(x, y)` covers `[x, x+1)`,
/// so a dot at `(x + 0.5, y + 0.5)` is centered on that pixel).
pub(crate) fn render_frame(w: u32, h: u32, dots: &[[f32; 2]], style: &DotStyle) -> Vec<u8> {
    let (wu, hu) = (w as usize, h as usize);
    let mut data = vec![128u8; wu * hu + wu * hu / 2];

    for y in 0..hu {
        for x in 0..wu {
            let inside = match style.aperture {
                Some((c, r)) => {
                    let dx = x as f32 + 0.5 - c[0];
                    let dy = y as f32 + 0.5 - c[1];
                    dx * dx + dy * dy <= r * r
                }
                None => true,
            };
            data[y * wu + x] = if inside {
                style.background_luma
            } else {
                style.outside_luma
            };
        }
    }

    let chroma_base = wu * hu;
    let reach = style.radius.ceil() as i32 + 2;
    for d in dots {
        let cx = d[0].floor() as i32;
        let cy = d[1].floor() as i32;
        for y in (cy - reach)..=(cy + reach) {
            for x in (cx - reach)..=(cx + reach) {
                if x < 0 || y < 0 || x >= w as i32 || y >= h as i32 {
                    continue;
                }
                let t = coverage(*d, style.radius, x as f32, y as f32, 1.0);
                if t > 0.0 {
                    let i = y as usize * wu + x as usize;
                    data[i] = blend(data[i], style.dot_luma, t);
                }
            }
        }
        for by in ((cy - reach) / 2 - 1)..=((cy + reach) / 2 + 1) {
            for bx in ((cx - reach) / 2 - 1)..=((cx + reach) / 2 + 1) {
                if bx < 0 || by < 0 || bx >= (w / 2) as i32 || by >= (h / 2) as i32 {
                    continue;
                }
                let t = coverage(*d, style.radius, bx as f32 * 2.0, by as f32 * 2.0, 2.0);
                if t > 0.0 {
                    let i = chroma_base + by as usize * wu + bx as usize * 2;
                    data[i] = blend(data[i], style.dot_chroma[0], t);
                    data[i + 1] = blend(data[i + 1], style.dot_chroma[1], t);
                }
            }
        }
    }
    data
}

/// Regular grid of dot centers, row-major, centered on `center`.
pub(crate) fn grid_points(
    center: [f32; 2],
    pitch: f32,
    rotation_rad: f32,
    rows: usize,
    cols: usize,
) -> Vec<[f32; 2]> {
    let (s, c) = rotation_rad.sin_cos();
    let r0 = (rows / 2) as f32;
    let c0 = (cols / 2) as f32;
    let mut out = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        for col in 0..cols {
            let gx = (col as f32 - c0) * pitch;
            let gy = (r as f32 - r0) * pitch;
            out.push([center[0] + c * gx - s * gy, center[1] + s * gx + c * gy]);
        }
    }
    out
}

/// Linear magnification `M` (row-major 2×2) a lens applies around its center.
///
/// The image-space meridian carrying the sphere power lies 90° from the axis
/// in this crate's axis convention.
pub(crate) fn lens_matrix(
    sphere: f64,
    cylinder: f64,
    axis_deg: f64,
    calibration: &CalibrationCoefficients,
) -> [[f32; 2]; 2] {
    let ratio = |diopter: f64| calibration.c / (diopter - calibration.d);
    let m1 = ratio(sphere);
    let m2 = ratio(sphere + cylinder);
    let phi = (axis_deg - 90.0).to_radians();
    let (s, c) = phi.sin_cos();
    // R(phi) * diag(m1, m2) * R(-phi)
    let a = m1 * c * c + m2 * s * s;
    let b = (m1 - m2) * s * c;
    let d = m1 * s * s + m2 * c * c;
    [[a as f32, b as f32], [b as f32, d as f32]]
}

/// Apply `m` to every point around `center`.
pub(crate) fn apply_lens(points: &[[f32; 2]], center: [f32; 2], m: [[f32; 2]; 2]) -> Vec<[f32; 2]> {
    points
        .iter()
        .map(|p| {
            let dx = p[0] - center[0];
            let dy = p[1] - center[1];
            [
                center[0] + m[0][0] * dx + m[0][1] * dy,
                center[1] + m[1][0] * dx + m[1][1] * dy,
            ]
        })
        .collect()
}
