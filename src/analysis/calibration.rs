// src/analysis/calibration.rs
//
// Pixel-space displacement to calibrated millimeter displacement along the
// configured overflow direction. The operator draws a ruler over a known
// 20 mm reference in the scene; the ruler's pixel length fixes the scale.

use serde::{Deserialize, Serialize};

/// Physical length of the on-screen calibration ruler.
pub const RULER_MM: f32 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParams {
    /// Pixel length of the 20 mm calibration ruler. Must be positive.
    pub pixels_per_20_mm: f32,
    /// Monitoring direction in degrees: 0 points along +x, angles increase
    /// counter-clockwise on a screen where +y is downward.
    pub direction_degrees: f32,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        // 1 mm per pixel, overflow direction "up" the image.
        Self {
            pixels_per_20_mm: 20.0,
            direction_degrees: -90.0,
        }
    }
}

impl CalibrationParams {
    pub fn new(pixels_per_20_mm: f32, direction_degrees: f32) -> Self {
        Self {
            pixels_per_20_mm,
            direction_degrees,
        }
    }

    /// A usable calibration has a positive, finite ruler length and a
    /// finite direction.
    pub fn is_valid(&self) -> bool {
        self.pixels_per_20_mm.is_finite()
            && self.pixels_per_20_mm > 0.0
            && self.direction_degrees.is_finite()
    }

    pub fn scale_mm_per_px(&self) -> f32 {
        RULER_MM / self.pixels_per_20_mm
    }

    /// Project a pixel displacement onto the monitoring direction and scale
    /// the result to millimeters. The unit vector's y component is negated
    /// because image y grows downward while the angle convention treats
    /// counter-clockwise as positive. The component orthogonal to the
    /// direction is discarded.
    pub fn project(&self, delta_px: (f32, f32)) -> f32 {
        let rad = self.direction_degrees.to_radians();
        let (ux, uy) = (rad.cos(), -rad.sin());
        (delta_px.0 * ux + delta_px.1 * uy) * self.scale_mm_per_px()
    }
}
