//! Chrominance-plane frame access.
//!
//! Frames arrive in an NV21-style layout: a full-resolution luma plane
//! (`width * height` bytes) followed by a half-resolution chroma plane in
//! which every 2×2 luma block shares one interleaved `(V, U)` byte pair.
//!
//! All accessors saturate: coordinates outside the frame read as zero and
//! never panic. Every mass computation downstream goes through
//! [`Frame::filtered`].

use serde::{Deserialize, Serialize};

/// Neutral chroma value (no color).
const CHROMA_NEUTRAL: i16 = 128;

/// Errors for frames that violate the buffer contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Width or height is zero or odd.
    InvalidDimensions {
        /// Frame width in pixels.
        width: u32,
        /// Frame height in pixels.
        height: u32,
    },
    /// Buffer is shorter than `width * height * 3 / 2`.
    BufferTooShort {
        /// Required byte count.
        needed: usize,
        /// Provided byte count.
        got: usize,
    },
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDimensions { width, height } => {
                write!(f, "frame dimensions must be even and non-zero, got {width}x{height}")
            }
            Self::BufferTooShort { needed, got } => {
                write!(f, "frame buffer too short: need {needed} bytes, got {got}")
            }
        }
    }
}

impl std::error::Error for FrameError {}

/// Rectangular acceptance range over the two chroma channels (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChrominanceFilter {
    pub v_min: u8,
    pub v_max: u8,
    pub u_min: u8,
    pub u_max: u8,
}

impl ChrominanceFilter {
    /// Returns `true` when both chroma channels fall inside the range.
    #[inline]
    pub fn accepts(&self, v: u8, u: u8) -> bool {
        (self.v_min..=self.v_max).contains(&v) && (self.u_min..=self.u_max).contains(&u)
    }
}

impl Default for ChrominanceFilter {
    /// Accepts the green illumination of the stock dot pattern.
    fn default() -> Self {
        Self {
            v_min: 0,
            v_max: 120,
            u_min: 0,
            u_max: 120,
        }
    }
}

/// Borrowed view over one captured frame.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
}

impl<'a> Frame<'a> {
    /// Wrap a raw NV21 buffer.
    pub fn new(data: &'a [u8], width: u32, height: u32) -> Result<Self, FrameError> {
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(FrameError::InvalidDimensions { width, height });
        }
        let needed = Self::buffer_len(width, height);
        if data.len() < needed {
            return Err(FrameError::BufferTooShort {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Number of bytes a `width × height` frame occupies.
    pub fn buffer_len(width: u32, height: u32) -> usize {
        let luma = width as usize * height as usize;
        luma + luma / 2
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Frame center in pixel coordinates.
    pub fn center(&self) -> [f32; 2] {
        [self.width as f32 * 0.5, self.height as f32 * 0.5]
    }

    #[inline]
    fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height
    }

    /// Luma sample at `(x, y)`, 0 outside the frame.
    #[inline]
    pub fn luma(&self, x: i32, y: i32) -> u8 {
        if !self.in_bounds(x, y) {
            return 0;
        }
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// `[V, U]` chroma pair of the 2×2 block containing `(x, y)`.
    #[inline]
    pub fn chroma(&self, x: i32, y: i32) -> [u8; 2] {
        if !self.in_bounds(x, y) {
            return [0, 0];
        }
        let w = self.width as usize;
        let idx = w * self.height as usize + (y as usize / 2) * w + (x as usize / 2) * 2;
        [self.data[idx], self.data[idx + 1]]
    }

    /// Averaged chroma magnitude if the pixel passes `filter`, else 0.
    #[inline]
    pub fn filtered(&self, x: i32, y: i32, filter: &ChrominanceFilter) -> u8 {
        if !self.in_bounds(x, y) {
            return 0;
        }
        let [v, u] = self.chroma(x, y);
        if !filter.accepts(v, u) {
            return 0;
        }
        let dv = (v as i16 - CHROMA_NEUTRAL).unsigned_abs();
        let du = (u as i16 - CHROMA_NEUTRAL).unsigned_abs();
        ((dv + du) / 2) as u8
    }

    /// Box-averaged luma in a `(2r+1)²` window; outside pixels count as 0.
    pub fn mean_luma(&self, x: f32, y: f32, radius: i32) -> f32 {
        let cx = x.round() as i32;
        let cy = y.round() as i32;
        let mut sum = 0u32;
        let mut n = 0u32;
        for yy in (cy - radius)..=(cy + radius) {
            for xx in (cx - radius)..=(cx + radius) {
                sum += self.luma(xx, yy) as u32;
                n += 1;
            }
        }
        sum as f32 / n.max(1) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_frame() -> Vec<u8> {
        // 4x2 luma, then one chroma row of 2 blocks.
        let mut data = vec![10, 20, 30, 40, 50, 60, 70, 80];
        data.extend_from_slice(&[60, 70, 128, 128]);
        data
    }

    #[test]
    fn rejects_odd_dimensions() {
        let data = vec![0u8; 64];
        assert_eq!(
            Frame::new(&data, 3, 2).unwrap_err(),
            FrameError::InvalidDimensions { width: 3, height: 2 }
        );
    }

    #[test]
    fn rejects_short_buffer() {
        let data = vec![0u8; 10];
        assert_eq!(
            Frame::new(&data, 4, 4).unwrap_err(),
            FrameError::BufferTooShort { needed: 24, got: 10 }
        );
    }

    #[test]
    fn luma_and_chroma_lookup() {
        let data = tiny_frame();
        let frame = Frame::new(&data, 4, 2).unwrap();
        assert_eq!(frame.luma(1, 1), 60);
        assert_eq!(frame.chroma(0, 1), [60, 70]);
        assert_eq!(frame.chroma(1, 0), [60, 70]);
        assert_eq!(frame.chroma(3, 1), [128, 128]);
    }

    #[test]
    fn out_of_bounds_reads_zero() {
        let data = tiny_frame();
        let frame = Frame::new(&data, 4, 2).unwrap();
        assert_eq!(frame.luma(-1, 0), 0);
        assert_eq!(frame.luma(4, 0), 0);
        assert_eq!(frame.chroma(0, 2), [0, 0]);
        // [0, 0] would pass the default filter; out-of-bounds must still be 0.
        assert_eq!(frame.filtered(-5, -5, &ChrominanceFilter::default()), 0);
    }

    #[test]
    fn filtered_requires_both_channels_in_range() {
        let data = tiny_frame();
        let frame = Frame::new(&data, 4, 2).unwrap();
        let filter = ChrominanceFilter::default();
        // |60-128| = 68, |70-128| = 58 -> mean 63
        assert_eq!(frame.filtered(0, 0, &filter), 63);
        assert_eq!(frame.filtered(2, 0, &filter), 0);

        let narrow = ChrominanceFilter {
            v_min: 0,
            v_max: 65,
            u_min: 0,
            u_max: 65,
        };
        assert_eq!(frame.filtered(0, 0, &narrow), 0);
    }

    #[test]
    fn mean_luma_counts_outside_as_zero() {
        let data = tiny_frame();
        let frame = Frame::new(&data, 4, 2).unwrap();
        let inside = frame.mean_luma(1.0, 0.0, 0);
        assert_eq!(inside, 20.0);
        let corner = frame.mean_luma(0.0, 0.0, 1);
        // window covers (0,0)=10, (1,0)=20, (0,1)=50, (1,1)=60 plus 5 outside pixels
        assert!((corner - 140.0 / 9.0).abs() < 1e-5);
    }
}
