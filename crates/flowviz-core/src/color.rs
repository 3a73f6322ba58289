//! Middlebury-style flow visualization.
//!
//! A 60-entry color wheel maps vector direction to hue and normalized
//! magnitude to saturation.  Band lengths are uneven on purpose: the eye
//! distinguishes more shades between red and yellow than between yellow
//! and green, so the red→yellow band gets more entries.

use crate::types::{RgbImage, VectorField};

/// Flow components at or beyond this magnitude mark an invalid vector.
const UNKNOWN_FLOW_THRESH: f32 = 1e9;

const NCOLS: usize = 60;

fn unknown_flow(fx: f32, fy: f32) -> bool {
    fx.abs() > UNKNOWN_FLOW_THRESH || fy.abs() > UNKNOWN_FLOW_THRESH || fx.is_nan() || fy.is_nan()
}

/// Direction-to-hue lookup table plus the rendering routines built on it.
pub struct ColorWheel {
    colors: [[u8; 3]; NCOLS],
}

impl Default for ColorWheel {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorWheel {
    /// Build the 60-entry wheel: RY 15, YG 6, GC 4, CB 11, BM 13, MR 6.
    pub fn new() -> Self {
        const RY: usize = 15;
        const YG: usize = 6;
        const GC: usize = 4;
        const CB: usize = 11;
        const BM: usize = 13;
        const MR: usize = 6;

        let mut colors = [[0u8; 3]; NCOLS];
        let mut k = 0;
        let mut set = |r: usize, g: usize, b: usize, k: &mut usize| {
            colors[*k] = [r as u8, g as u8, b as u8];
            *k += 1;
        };
        for i in 0..RY {
            set(255, 255 * i / RY, 0, &mut k);
        }
        for i in 0..YG {
            set(255 - 255 * i / YG, 255, 0, &mut k);
        }
        for i in 0..GC {
            set(0, 255, 255 * i / GC, &mut k);
        }
        for i in 0..CB {
            set(0, 255 - 255 * i / CB, 255, &mut k);
        }
        for i in 0..BM {
            set(255 * i / BM, 0, 255, &mut k);
        }
        for i in 0..MR {
            set(255, 0, 255 - 255 * i / MR, &mut k);
        }
        debug_assert_eq!(k, NCOLS);
        Self { colors }
    }

    /// Raw wheel entry, RGB order.
    pub fn entry(&self, k: usize) -> [u8; 3] {
        self.colors[k]
    }

    /// Render a decoded flow field as an RGB image.
    ///
    /// Vectors are normalized by the frame's maximum magnitude (clamped to
    /// at least 1.0) before hue lookup.  Returns `None` when any vector in
    /// the frame is invalid — the whole frame is suppressed, matching
    /// long-standing visualizer behavior that downstream consumers key on.
    pub fn render(&self, width: u32, height: u32, flow: &[(f32, f32)]) -> Option<RgbImage> {
        debug_assert_eq!(flow.len(), width as usize * height as usize);

        let mut maxrad = -1.0f32;
        for &(fx, fy) in flow {
            if unknown_flow(fx, fy) {
                return None;
            }
            maxrad = maxrad.max((fx * fx + fy * fy).sqrt());
        }
        let maxrad = maxrad.max(1.0);

        let mut data = Vec::with_capacity(flow.len() * 3);
        for &(fx, fy) in flow {
            let pix = self.compute_color(fx / maxrad, fy / maxrad);
            data.extend_from_slice(&pix);
        }
        Some(RgbImage::from_parts(width, height, data))
    }

    /// Map one flow field to an image, decoding from fixed point first.
    pub fn visualize(&self, field: &VectorField) -> Option<RgbImage> {
        let flow: Vec<(f32, f32)> = field.vectors().iter().map(|v| v.decode()).collect();
        self.render(field.width(), field.height(), &flow)
    }

    /// One pixel of the Middlebury mapping.  `fx`/`fy` must already be
    /// normalized to roughly [-1, 1].
    ///
    /// Channel order comes out reversed relative to the wheel entries
    /// (`pix[2 - b]`), inherited from the reference visualizer.  Kept
    /// as-is so output images stay bit-comparable with it.
    fn compute_color(&self, fx: f32, fy: f32) -> [u8; 3] {
        let rad = (fx * fx + fy * fy).sqrt();
        let a = (-fy).atan2(-fx) / std::f32::consts::PI;
        let fk = (a + 1.0) / 2.0 * (NCOLS as f32 - 1.0);
        let k0 = fk as usize;
        let k1 = (k0 + 1) % NCOLS;
        let f = fk - k0 as f32;

        let mut pix = [0u8; 3];
        for b in 0..3 {
            let col0 = f32::from(self.colors[k0][b]) / 255.0;
            let col1 = f32::from(self.colors[k1][b]) / 255.0;
            let mut col = (1.0 - f) * col0 + f * col1;
            if rad <= 1.0 {
                // Saturation grows with radius.
                col = 1.0 - rad * (1.0 - col);
            } else {
                // Out of range.
                col *= 0.75;
            }
            pix[2 - b] = (255.0 * col) as u8;
        }
        pix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FlowVector;

    #[test]
    fn wheel_has_sixty_entries_with_correct_band_starts() {
        let wheel = ColorWheel::new();
        // Band starts: RY at 0, YG at 15, GC at 21, CB at 25, BM at 36, MR at 49.
        assert_eq!(wheel.entry(0), [255, 0, 0]);
        assert_eq!(wheel.entry(15), [255, 255, 0]);
        assert_eq!(wheel.entry(21), [0, 255, 0]);
        assert_eq!(wheel.entry(25), [0, 255, 255]);
        assert_eq!(wheel.entry(36), [0, 0, 255]);
        assert_eq!(wheel.entry(49), [255, 0, 255]);
    }

    #[test]
    fn zero_flow_renders_white() {
        let wheel = ColorWheel::new();
        // rad == 0 → col = 1 for every channel.
        let img = wheel.render(1, 1, &[(0.0, 0.0)]).unwrap();
        assert_eq!(img.data(), &[255, 255, 255]);
    }

    #[test]
    fn single_nan_vector_suppresses_whole_frame() {
        let wheel = ColorWheel::new();
        let mut flow = vec![(0.5f32, 0.5f32); 16];
        flow[7] = (f32::NAN, 0.0);
        assert!(wheel.render(4, 4, &flow).is_none());
    }

    #[test]
    fn huge_component_suppresses_whole_frame() {
        let wheel = ColorWheel::new();
        let flow = [(0.1, 0.1), (2e9, 0.0)];
        assert!(wheel.render(2, 1, &flow).is_none());
    }

    #[test]
    fn visualize_matches_field_dimensions() {
        let wheel = ColorWheel::new();
        let vectors = vec![FlowVector { flow_x: 16, flow_y: -8 }; 480 * 270];
        let field = VectorField::new(480, 270, vectors).unwrap();
        let img = wheel.visualize(&field).unwrap();
        assert_eq!((img.width(), img.height()), (480, 270));
        assert_eq!(img.data().len(), 480 * 270 * 3);
    }

    #[test]
    fn uniform_field_renders_uniform_color() {
        let wheel = ColorWheel::new();
        let flow = vec![(1.0f32, 0.0f32); 9];
        let img = wheel.render(3, 3, &flow).unwrap();
        let first = &img.data()[..3];
        for px in img.data().chunks_exact(3) {
            assert_eq!(px, first);
        }
    }

    #[test]
    fn adjacent_wheel_entries_differ_by_at_most_one_band_step() {
        // The coarsest band (green→cyan, 4 entries) steps by at most
        // ceil(255 / 4) = 64 per channel; every neighbor pair, band
        // boundaries and the 59→0 wrap included, must stay within that.
        let wheel = ColorWheel::new();
        for k in 0..60 {
            let a = wheel.entry(k);
            let b = wheel.entry((k + 1) % 60);
            for c in 0..3 {
                let diff = (i16::from(a[c]) - i16::from(b[c])).abs();
                assert!(diff <= 64, "entries {k}->{}, channel {c}: jump of {diff}", (k + 1) % 60);
            }
        }
    }

    #[test]
    fn visualization_is_idempotent() {
        let wheel = ColorWheel::new();
        let vectors = vec![
            FlowVector { flow_x: 16, flow_y: -8 },
            FlowVector { flow_x: -96, flow_y: 64 },
            FlowVector { flow_x: 0, flow_y: 0 },
            FlowVector { flow_x: 320, flow_y: 320 },
        ];
        let field = VectorField::new(2, 2, vectors).unwrap();
        let first = wheel.visualize(&field).unwrap();
        let second = wheel.visualize(&field).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn render_is_total_for_finite_flow() {
        // `None` is reserved for unknown-vector suppression; any finite
        // flow field, the empty one included, renders.
        let wheel = ColorWheel::new();
        let img = wheel.render(0, 0, &[]).unwrap();
        assert!(img.data().is_empty());
    }

    #[test]
    fn dominant_vector_is_fully_saturated_after_normalization() {
        // Normalization divides by the frame max, so the largest vector
        // lands on rad == 1 and keeps its full wheel color.
        let wheel = ColorWheel::new();
        let flow = [(5.0, 0.0), (0.5, 0.0)];
        let img = wheel.render(2, 1, &flow).unwrap();
        // (1, 0) maps to the start of the wheel: pure red, stored reversed.
        assert_eq!(&img.data()[..3], &[0, 0, 255]);
    }
}
