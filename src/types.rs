// src/types.rs

use serde::{Deserialize, Serialize};

use crate::analysis::{CalibrationParams, EstimatorConfig};
use crate::pipeline::PipelineConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub calibration: CalibrationParams,
    pub estimator: EstimatorConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Rectangular region of interest in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoiRect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl RoiRect {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Does the rectangle have positive area and lie fully inside a frame
    /// of the given size?
    pub fn fits_within(&self, frame_width: usize, frame_height: usize) -> bool {
        self.width > 0
            && self.height > 0
            && self
                .x
                .checked_add(self.width)
                .map_or(false, |right| right <= frame_width)
            && self
                .y
                .checked_add(self.height)
                .map_or(false, |bottom| bottom <= frame_height)
    }
}

/// Grayscale frame, row-major storage: pixel at (x, y) = data[y * width + x].
/// Color sources convert on ingest via `from_rgb` / `from_bgr`.
#[derive(Clone)]
pub struct GrayFrame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl GrayFrame {
    pub fn new(data: Vec<u8>, width: usize, height: usize) -> Self {
        debug_assert_eq!(data.len(), width * height);
        Self {
            data,
            width,
            height,
        }
    }

    /// Convert from RGB packed bytes (3 bytes per pixel)
    pub fn from_rgb(rgb: &[u8], width: usize, height: usize) -> Self {
        let mut gray = Vec::with_capacity(width * height);
        for pixel in rgb.chunks_exact(3) {
            // ITU-R BT.601 luma
            let g =
                (0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32) as u8;
            gray.push(g);
        }
        Self::new(gray, width, height)
    }

    /// Convert from BGR packed bytes (3 bytes per pixel), the usual camera
    /// delivery order.
    pub fn from_bgr(bgr: &[u8], width: usize, height: usize) -> Self {
        let mut gray = Vec::with_capacity(width * height);
        for pixel in bgr.chunks_exact(3) {
            let g =
                (0.299 * pixel[2] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[0] as f32) as u8;
            gray.push(g);
        }
        Self::new(gray, width, height)
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    /// A frame the pipeline will accept: positive dimensions and a buffer
    /// that matches them.
    pub fn is_well_formed(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == self.width * self.height
    }

    /// Copy out the sub-image covered by `roi`. Returns None when the
    /// rectangle is degenerate or falls outside the frame; the caller skips
    /// that ROI for the current frame.
    pub fn crop(&self, roi: &RoiRect) -> Option<GrayFrame> {
        if !roi.fits_within(self.width, self.height) {
            return None;
        }
        let mut data = Vec::with_capacity(roi.width * roi.height);
        for y in roi.y..roi.y + roi.height {
            let row = y * self.width + roi.x;
            data.extend_from_slice(&self.data[row..row + roi.width]);
        }
        Some(GrayFrame::new(data, roi.width, roi.height))
    }
}

impl std::fmt::Debug for GrayFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrayFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}
