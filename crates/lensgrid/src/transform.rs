//! Two-point similarity transform between pixel and stage coordinates.

use nalgebra::{Matrix3, Vector3};

/// `q = s · R(θ) · p + t`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SimilarityTransform {
    pub scale: f64,
    /// Rotation angle in radians.
    pub rotation: f64,
    pub translation: [f64; 2],
}

/// Axis-aligned rectangle `[x0, y0, x1, y1]`.
pub type Rect = [f64; 4];

impl SimilarityTransform {
    pub fn identity() -> Self {
        Self {
            scale: 1.0,
            rotation: 0.0,
            translation: [0.0, 0.0],
        }
    }

    /// Solve the transform mapping `from[i]` onto `to[i]`.
    ///
    /// The rotation comes from the angle between the two difference vectors;
    /// scale and translation are then the least-squares solution over the
    /// rotated source points. `None` for coincident or non-finite points.
    pub fn from_point_pairs(from: [[f64; 2]; 2], to: [[f64; 2]; 2]) -> Option<Self> {
        let dp = [from[1][0] - from[0][0], from[1][1] - from[0][1]];
        let dq = [to[1][0] - to[0][0], to[1][1] - to[0][1]];
        let lp = dp[0].hypot(dp[1]);
        let lq = dq[0].hypot(dq[1]);
        if !(lp > 1e-12 && lq > 1e-12) || !lp.is_finite() || !lq.is_finite() {
            return None;
        }
        let rotation = dq[1].atan2(dq[0]) - dp[1].atan2(dp[0]);
        let (s, c) = rotation.sin_cos();

        // Unknowns [scale, tx, ty]; rows: scale·u + tx = qx, scale·v + ty = qy.
        let mut ata = Matrix3::<f64>::zeros();
        let mut atb = Vector3::<f64>::zeros();
        for (p, q) in from.iter().zip(&to) {
            let u = c * p[0] - s * p[1];
            let v = s * p[0] + c * p[1];
            let rx = Vector3::new(u, 1.0, 0.0);
            let ry = Vector3::new(v, 0.0, 1.0);
            ata += rx * rx.transpose() + ry * ry.transpose();
            atb += rx * q[0] + ry * q[1];
        }
        let x = ata.lu().solve(&atb)?;
        let t = Self {
            scale: x[0],
            rotation,
            translation: [x[1], x[2]],
        };
        (t.scale.is_finite() && t.scale > 0.0 && x[1].is_finite() && x[2].is_finite()).then_some(t)
    }

    pub fn apply(&self, p: [f64; 2]) -> [f64; 2] {
        let (s, c) = self.rotation.sin_cos();
        [
            self.scale * (c * p[0] - s * p[1]) + self.translation[0],
            self.scale * (s * p[0] + c * p[1]) + self.translation[1],
        ]
    }

    /// Bounding box of the four mapped corners.
    pub fn apply_rect(&self, r: Rect) -> Rect {
        let corners = [[r[0], r[1]], [r[2], r[1]], [r[2], r[3]], [r[0], r[3]]];
        let mut out = [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY];
        for p in corners.map(|p| self.apply(p)) {
            out[0] = out[0].min(p[0]);
            out[1] = out[1].min(p[1]);
            out[2] = out[2].max(p[0]);
            out[3] = out[3].max(p[1]);
        }
        out
    }

    pub fn inverse(&self) -> Option<Self> {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return None;
        }
        let scale = 1.0 / self.scale;
        let rotation = -self.rotation;
        let (s, c) = rotation.sin_cos();
        let [tx, ty] = self.translation;
        Some(Self {
            scale,
            rotation,
            translation: [
                -scale * (c * tx - s * ty),
                -scale * (s * tx + c * ty),
            ],
        })
    }
}
