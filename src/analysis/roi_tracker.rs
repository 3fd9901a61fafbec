// src/analysis/roi_tracker.rs
//
// Per-ROI tracking state: motion estimation over the cropped sub-image,
// calibration to millimeters, and aggregation of per-frame deltas into
// per-second velocity buckets.
//
// Bucket protocol: every calibrated delta is summed into the bucket for its
// wall-clock second. The open bucket is finalized when a sample from a
// LATER second arrives or when `flush` closes the session; process_frame
// alone never closes the last bucket of a run. Aggregates are sums of
// mm-per-frame deltas, not averages. A consumer wanting mm/s over irregular
// frame pacing divides by elapsed time itself.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::debug;

use super::calibration::CalibrationParams;
use super::motion_estimator::{EstimatorConfig, MotionEstimator};
use crate::types::{GrayFrame, RoiRect};

/// Wall-clock second a sample falls into. Buckets compare as integers, so
/// millisecond rounding or locale formatting can never split or merge a
/// second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SecondBucket(u64);

impl SecondBucket {
    pub fn from_time(at: SystemTime) -> Self {
        // Pre-epoch clocks clamp to bucket zero.
        let secs = at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        SecondBucket(secs)
    }

    pub fn from_secs(secs: u64) -> Self {
        SecondBucket(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// `HH:MM:SS` (UTC) display label for operator-facing views.
    pub fn label(&self) -> String {
        let s = self.0 % 86_400;
        format!("{:02}:{:02}:{:02}", s / 3600, (s % 3600) / 60, s % 60)
    }
}

impl fmt::Display for SecondBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// One successful motion estimate. `bucket_velocity` stays None until the
/// sample's bucket is finalized; the last sample of a bucket then carries
/// the bucket total.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MotionSample {
    /// Raw estimator output in pixels (positive dx right, positive dy down)
    pub pixel_delta: (f32, f32),
    /// Projection onto the monitoring direction, in millimeters
    pub calibrated_delta_mm: f32,
    pub timestamp: SystemTime,
    pub bucket: SecondBucket,
    pub bucket_velocity: Option<f32>,
}

/// Sum of calibrated deltas over one finalized second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VelocityAggregate {
    pub bucket: SecondBucket,
    pub velocity_mm: f32,
}

#[derive(Debug, Clone, Copy)]
enum BucketState {
    Empty,
    Accumulating {
        bucket: SecondBucket,
        running_mm: f32,
    },
}

/// Explicit bucket state machine: Empty until the first sample arrives,
/// then Accumulating over exactly one open bucket at a time.
#[derive(Debug, Clone)]
pub struct VelocityAccumulator {
    state: BucketState,
}

impl VelocityAccumulator {
    pub fn new() -> Self {
        Self {
            state: BucketState::Empty,
        }
    }

    /// Fold one calibrated delta into its bucket. Returns the finalized
    /// aggregate of the previously open bucket when `bucket` differs from
    /// it; the very first push only opens a bucket.
    pub fn push(&mut self, bucket: SecondBucket, delta_mm: f32) -> Option<VelocityAggregate> {
        match self.state {
            BucketState::Empty => {
                self.state = BucketState::Accumulating {
                    bucket,
                    running_mm: delta_mm,
                };
                None
            }
            BucketState::Accumulating {
                bucket: open,
                running_mm,
            } if open == bucket => {
                self.state = BucketState::Accumulating {
                    bucket: open,
                    running_mm: running_mm + delta_mm,
                };
                None
            }
            BucketState::Accumulating {
                bucket: open,
                running_mm,
            } => {
                self.state = BucketState::Accumulating {
                    bucket,
                    running_mm: delta_mm,
                };
                Some(VelocityAggregate {
                    bucket: open,
                    velocity_mm: running_mm,
                })
            }
        }
    }

    /// Close the open bucket without waiting for a later sample (session
    /// end). Leaves the accumulator Empty.
    pub fn flush(&mut self) -> Option<VelocityAggregate> {
        match std::mem::replace(&mut self.state, BucketState::Empty) {
            BucketState::Empty => None,
            BucketState::Accumulating { bucket, running_mm } => Some(VelocityAggregate {
                bucket,
                velocity_mm: running_mm,
            }),
        }
    }

    /// Running sum of the open bucket, if one is open.
    pub fn running(&self) -> Option<f32> {
        match self.state {
            BucketState::Empty => None,
            BucketState::Accumulating { running_mm, .. } => Some(running_mm),
        }
    }

    pub fn open_bucket(&self) -> Option<SecondBucket> {
        match self.state {
            BucketState::Empty => None,
            BucketState::Accumulating { bucket, .. } => Some(bucket),
        }
    }
}

impl Default for VelocityAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// One user-defined region of interest with its own estimator state,
/// calibration snapshot, and sample/aggregate histories. Owned exclusively
/// by the frame pipeline; nothing is shared across trackers.
pub struct RoiTracker {
    roi: RoiRect,
    calibration: CalibrationParams,
    estimator: MotionEstimator,
    accumulator: VelocityAccumulator,
    samples: Vec<MotionSample>,
    aggregates: Vec<VelocityAggregate>,
}

impl RoiTracker {
    pub fn new(
        roi: RoiRect,
        calibration: CalibrationParams,
        estimator_config: EstimatorConfig,
    ) -> Self {
        Self {
            roi,
            calibration,
            estimator: MotionEstimator::new(estimator_config),
            accumulator: VelocityAccumulator::new(),
            samples: Vec::new(),
            aggregates: Vec::new(),
        }
    }

    /// Run one cropped frame through estimate, calibrate, accumulate.
    /// Returns the appended sample, or None when no motion could be
    /// estimated (first frame, undersized crop, geometry change). A None
    /// leaves every history untouched.
    pub fn process_frame(&mut self, crop: &GrayFrame, at: SystemTime) -> Option<MotionSample> {
        let pixel_delta = self.estimator.estimate(crop)?;
        let calibrated = self.calibration.project(pixel_delta);
        let bucket = SecondBucket::from_time(at);

        if let Some(closed) = self.accumulator.push(bucket, calibrated) {
            // The most recent sample is the last one of the closed bucket;
            // it carries the bucket total, mirroring the aggregate history.
            if let Some(last) = self.samples.last_mut() {
                last.bucket_velocity = Some(closed.velocity_mm);
            }
            debug!(
                "bucket {} finalized at {:.3} mm for ROI {:?}",
                closed.bucket, closed.velocity_mm, self.roi
            );
            self.aggregates.push(closed);
        }

        let sample = MotionSample {
            pixel_delta,
            calibrated_delta_mm: calibrated,
            timestamp: at,
            bucket,
            bucket_velocity: None,
        };
        self.samples.push(sample);
        Some(sample)
    }

    /// Close the open bucket at session end and record it as the final
    /// aggregate. Returns None once the accumulator is already empty, so
    /// calling twice is harmless.
    pub fn flush(&mut self) -> Option<VelocityAggregate> {
        let closed = self.accumulator.flush()?;
        if let Some(last) = self.samples.last_mut() {
            if last.bucket == closed.bucket {
                last.bucket_velocity = Some(closed.velocity_mm);
            }
        }
        self.aggregates.push(closed);
        Some(closed)
    }

    /// Re-apply calibration to this tracker. Pipeline-level recalibration
    /// only affects trackers created afterwards; this is the explicit
    /// opt-in for an existing one.
    pub fn recalibrate(&mut self, calibration: CalibrationParams) {
        self.calibration = calibration;
    }

    /// Forget the previous crop; the next frame seeds a fresh estimate.
    /// Histories are kept.
    pub fn reset(&mut self) {
        self.estimator.reset();
    }

    pub fn roi(&self) -> &RoiRect {
        &self.roi
    }

    pub fn calibration(&self) -> CalibrationParams {
        self.calibration
    }

    pub fn last_pixel_delta(&self) -> Option<(f32, f32)> {
        self.samples.last().map(|s| s.pixel_delta)
    }

    pub fn last_calibrated_delta(&self) -> Option<f32> {
        self.samples.last().map(|s| s.calibrated_delta_mm)
    }

    /// Append-only sample history, oldest first.
    pub fn samples(&self) -> &[MotionSample] {
        &self.samples
    }

    /// Finalized per-second aggregates, oldest first.
    pub fn aggregates(&self) -> &[VelocityAggregate] {
        &self.aggregates
    }

    /// Sum of the still-open bucket, if any.
    pub fn running_velocity(&self) -> Option<f32> {
        self.accumulator.running()
    }

    pub fn open_bucket(&self) -> Option<SecondBucket> {
        self.accumulator.open_bucket()
    }
}
