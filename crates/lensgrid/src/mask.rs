//! Whole-frame chrominance mask for diagnostics.
//!
//! The output is split into four quadrants and every quadrant is filled by its
//! own worker. Workers receive only the row slices of their quadrant, so no
//! two of them can touch the same byte.

use image::GrayImage;

use crate::frame::{ChrominanceFilter, Frame};

/// One worker's share of the output: row slices plus their frame origin.
struct Quadrant<'a> {
    x0: u32,
    y0: u32,
    rows: Vec<&'a mut [u8]>,
}

impl Quadrant<'_> {
    fn new(x0: u32, y0: u32) -> Self {
        Self {
            x0,
            y0,
            rows: Vec::new(),
        }
    }

    fn fill(&mut self, frame: &Frame<'_>, filter: &ChrominanceFilter) {
        for (dy, row) in self.rows.iter_mut().enumerate() {
            let y = (self.y0 as usize + dy) as i32;
            for (dx, px) in row.iter_mut().enumerate() {
                let x = (self.x0 as usize + dx) as i32;
                *px = frame.filtered(x, y, filter);
            }
        }
    }
}

/// Build the filtered-chroma intensity image of a frame.
pub fn chroma_mask(frame: &Frame<'_>, filter: &ChrominanceFilter) -> GrayImage {
    let (w, h) = (frame.width(), frame.height());
    let half_w = (w / 2) as usize;
    let half_h = h / 2;
    let mut out = GrayImage::new(w, h);

    {
        let mut quadrants = [
            Quadrant::new(0, 0),
            Quadrant::new(half_w as u32, 0),
            Quadrant::new(0, half_h),
            Quadrant::new(half_w as u32, half_h),
        ];
        for (y, row) in out.chunks_mut(w as usize).enumerate() {
            let (left, right) = row.split_at_mut(half_w);
            let base = if (y as u32) < half_h { 0 } else { 2 };
            quadrants[base].rows.push(left);
            quadrants[base + 1].rows.push(right);
        }

        rayon::scope(|s| {
            for quadrant in quadrants.iter_mut() {
                s.spawn(move |_| quadrant.fill(frame, filter));
            }
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{render_frame, DotStyle};

    #[test]
    fn mask_matches_pointwise_filter() {
        let dots = [[10.0, 10.0], [45.0, 12.0], [12.0, 37.0], [50.0, 40.0]];
        let buf = render_frame(64, 48, &dots, &DotStyle::default());
        let frame = Frame::new(&buf, 64, 48).unwrap();
        let filter = ChrominanceFilter::default();

        let mask = chroma_mask(&frame, &filter);
        assert_eq!(mask.dimensions(), (64, 48));
        for y in 0..48 {
            for x in 0..64 {
                assert_eq!(
                    mask.get_pixel(x, y)[0],
                    frame.filtered(x as i32, y as i32, &filter),
                    "mismatch at ({x}, {y})"
                );
            }
        }
    }

    #[test]
    fn every_quadrant_sees_its_dot() {
        let dots = [[10.0, 10.0], [45.0, 12.0], [12.0, 37.0], [50.0, 40.0]];
        let buf = render_frame(64, 48, &dots, &DotStyle::default());
        let frame = Frame::new(&buf, 64, 48).unwrap();
        let mask = chroma_mask(&frame, &ChrominanceFilter::default());
        for d in dots {
            assert!(mask.get_pixel(d[0] as u32, d[1] as u32)[0] > 0);
        }
        assert_eq!(mask.get_pixel(30, 25)[0], 0);
    }
}
