// src/analysis/motion_estimator.rs
//
// Frame-to-frame translational motion estimation by phase correlation.
//
// Froth surfaces are textured but low-contrast and offer no stable features
// to track, so correspondence-based flow is unreliable here. Phase
// correlation uses the whole crop at once: the normalized cross-power
// spectrum of two consecutive crops inverse-transforms into a correlation
// surface with a single peak at the translation that best aligns them.
// Normalizing every frequency bin to unit magnitude makes the peak location
// insensitive to illumination changes, and a weighted centroid around the
// peak refines it to sub-pixel precision.
//
// Output convention: positive dx = surface moved right, positive dy =
// surface moved down (image coordinates).

use crate::types::GrayFrame;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Cross-power bins with less energy than this carry no usable phase and
/// are dropped from the spectrum.
const NORM_EPS: f32 = 1e-12;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Minimum usable crop side length in pixels. Anything smaller cannot
    /// produce a meaningful spectrum and is rejected outright.
    pub min_crop_px: usize,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self { min_crop_px: 8 }
    }
}

pub struct MotionEstimator {
    config: EstimatorConfig,
    previous: Option<GrayFrame>,
    planner: FftPlanner<f32>,
}

impl MotionEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            config,
            previous: None,
            planner: FftPlanner::new(),
        }
    }

    /// Estimate the displacement of `current` relative to the previously
    /// seen crop.
    ///
    /// Returns None on the first crop (nothing to compare against), when
    /// the crop dimensions changed since the last call (the estimate
    /// re-seeds), or when the crop is below the minimum usable size (the
    /// stored reference is left untouched). On success the stored
    /// reference is replaced by `current`, so estimation is always between
    /// consecutive frames.
    pub fn estimate(&mut self, current: &GrayFrame) -> Option<(f32, f32)> {
        if current.width < self.config.min_crop_px || current.height < self.config.min_crop_px {
            debug!(
                "crop {}x{} below minimum {} px, ignoring",
                current.width, current.height, self.config.min_crop_px
            );
            return None;
        }

        let prev = match self.previous.take() {
            Some(p) if p.width == current.width && p.height == current.height => p,
            _ => {
                // First crop for this ROI, or its geometry changed: re-seed.
                self.previous = Some(current.clone());
                return None;
            }
        };

        let delta = self.phase_correlate(&prev, current);
        self.previous = Some(current.clone());
        Some(delta)
    }

    /// Forget the stored reference; the next crop seeds a fresh estimate.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    pub fn has_reference(&self) -> bool {
        self.previous.is_some()
    }

    fn phase_correlate(&mut self, prev: &GrayFrame, curr: &GrayFrame) -> (f32, f32) {
        let (w, h) = (curr.width, curr.height);

        let mut a = to_spectrum_input(prev);
        let mut b = to_spectrum_input(curr);
        self.fft_2d(&mut a, w, h, false);
        self.fft_2d(&mut b, w, h, false);

        // Normalized cross-power spectrum: conj(prev) * curr keeps the sign
        // convention "content moved right yields positive dx".
        let mut cross: Vec<Complex<f32>> = a
            .iter()
            .zip(b.iter())
            .map(|(pa, pb)| {
                let c = pa.conj() * pb;
                let mag = c.norm();
                if mag > NORM_EPS {
                    c / mag
                } else {
                    Complex::new(0.0, 0.0)
                }
            })
            .collect();

        self.fft_2d(&mut cross, w, h, true);

        // Integer peak of the correlation surface.
        let mut peak_idx = 0usize;
        let mut peak_val = f32::MIN;
        for (i, c) in cross.iter().enumerate() {
            if c.re > peak_val {
                peak_val = c.re;
                peak_idx = i;
            }
        }
        let px = peak_idx % w;
        let py = peak_idx / w;

        // Sub-pixel refinement: weighted centroid over the wrapped 3x3
        // neighborhood. Negative correlation values carry no mass.
        let mut sum_w = 0.0f32;
        let mut sum_x = 0.0f32;
        let mut sum_y = 0.0f32;
        for oy in -1isize..=1 {
            for ox in -1isize..=1 {
                let nx = (px as isize + ox).rem_euclid(w as isize) as usize;
                let ny = (py as isize + oy).rem_euclid(h as isize) as usize;
                let val = cross[ny * w + nx].re.max(0.0);
                sum_w += val;
                sum_x += val * ox as f32;
                sum_y += val * oy as f32;
            }
        }
        let (fx, fy) = if sum_w > 0.0 {
            (px as f32 + sum_x / sum_w, py as f32 + sum_y / sum_w)
        } else {
            (px as f32, py as f32)
        };

        // The surface is circular: anything past half the extent is a
        // negative displacement.
        (wrap_signed(fx, w), wrap_signed(fy, h))
    }

    /// In-place 2-D FFT: all rows in one pass, then each column through a
    /// gather/scatter buffer.
    fn fft_2d(&mut self, buf: &mut [Complex<f32>], width: usize, height: usize, inverse: bool) {
        let row_fft = if inverse {
            self.planner.plan_fft_inverse(width)
        } else {
            self.planner.plan_fft_forward(width)
        };
        row_fft.process(buf);

        let col_fft = if inverse {
            self.planner.plan_fft_inverse(height)
        } else {
            self.planner.plan_fft_forward(height)
        };
        let mut column = vec![Complex::new(0.0, 0.0); height];
        for x in 0..width {
            for y in 0..height {
                column[y] = buf[y * width + x];
            }
            col_fft.process(&mut column);
            for y in 0..height {
                buf[y * width + x] = column[y];
            }
        }
    }
}

/// Zero-mean complex buffer for the transform. Removing the mean keeps the
/// DC bin from dominating the spectrum on bright scenes.
fn to_spectrum_input(frame: &GrayFrame) -> Vec<Complex<f32>> {
    let mean = frame.data.iter().map(|&p| p as f32).sum::<f32>() / frame.data.len() as f32;
    frame
        .data
        .iter()
        .map(|&p| Complex::new(p as f32 - mean, 0.0))
        .collect()
}

fn wrap_signed(v: f32, extent: usize) -> f32 {
    let e = extent as f32;
    if v > e / 2.0 {
        v - e
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texel(x: usize, y: usize) -> u8 {
        // Deterministic speckle with a broadband spectrum.
        let h = (x as u32)
            .wrapping_mul(2_654_435_761)
            .wrapping_add((y as u32).wrapping_mul(97_003));
        (h ^ (h >> 13)) as u8
    }

    /// Speckle frame circularly shifted by (shift_x, shift_y); positive
    /// shifts move content right/down.
    fn textured_frame(width: usize, height: usize, shift_x: isize, shift_y: isize) -> GrayFrame {
        let mut data = vec![0u8; width * height];
        for y in 0..height {
            for x in 0..width {
                let sx = (x as isize - shift_x).rem_euclid(width as isize) as usize;
                let sy = (y as isize - shift_y).rem_euclid(height as isize) as usize;
                data[y * width + x] = texel(sx, sy);
            }
        }
        GrayFrame::new(data, width, height)
    }

    #[test]
    fn test_first_crop_yields_no_estimate() {
        let mut est = MotionEstimator::new(EstimatorConfig::default());
        assert!(est.estimate(&textured_frame(32, 32, 0, 0)).is_none());
        assert!(est.has_reference());
    }

    #[test]
    fn test_identical_frames_zero_displacement() {
        let mut est = MotionEstimator::new(EstimatorConfig::default());
        let frame = textured_frame(64, 64, 0, 0);

        est.estimate(&frame);
        let (dx, dy) = est.estimate(&frame).unwrap();

        assert!(dx.abs() < 0.1, "dx = {}", dx);
        assert!(dy.abs() < 0.1, "dy = {}", dy);
    }

    #[test]
    fn test_known_shift_recovered() {
        let mut est = MotionEstimator::new(EstimatorConfig::default());

        est.estimate(&textured_frame(64, 64, 0, 0));
        let (dx, dy) = est.estimate(&textured_frame(64, 64, 3, 2)).unwrap();

        assert!((dx - 3.0).abs() < 0.5, "dx = {}", dx);
        assert!((dy - 2.0).abs() < 0.5, "dy = {}", dy);
    }

    #[test]
    fn test_negative_shift_recovered() {
        let mut est = MotionEstimator::new(EstimatorConfig::default());

        est.estimate(&textured_frame(64, 64, 0, 0));
        let (dx, dy) = est.estimate(&textured_frame(64, 64, -4, 5)).unwrap();

        assert!((dx + 4.0).abs() < 0.5, "dx = {}", dx);
        assert!((dy - 5.0).abs() < 0.5, "dy = {}", dy);
    }

    #[test]
    fn test_undersized_crop_leaves_reference_untouched() {
        let mut est = MotionEstimator::new(EstimatorConfig::default());

        est.estimate(&textured_frame(64, 64, 0, 0));
        assert!(est.estimate(&textured_frame(4, 4, 0, 0)).is_none());

        // The stored reference must still be the first 64x64 frame.
        let (dx, dy) = est.estimate(&textured_frame(64, 64, 3, 0)).unwrap();
        assert!((dx - 3.0).abs() < 0.5, "dx = {}", dx);
        assert!(dy.abs() < 0.5, "dy = {}", dy);
    }

    #[test]
    fn test_dimension_change_reseeds() {
        let mut est = MotionEstimator::new(EstimatorConfig::default());

        est.estimate(&textured_frame(64, 64, 0, 0));
        assert!(est.estimate(&textured_frame(32, 32, 0, 0)).is_none());

        let (dx, dy) = est.estimate(&textured_frame(32, 32, 0, 0)).unwrap();
        assert!(dx.abs() < 0.1 && dy.abs() < 0.1);
    }

    #[test]
    fn test_reset_drops_reference() {
        let mut est = MotionEstimator::new(EstimatorConfig::default());
        let frame = textured_frame(32, 32, 0, 0);

        est.estimate(&frame);
        est.reset();
        assert!(!est.has_reference());
        assert!(est.estimate(&frame).is_none());
    }
}
