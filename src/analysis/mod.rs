// src/analysis/mod.rs
//
// Per-ROI analysis modules.
//
// Signal flow:
//   cropped frame → motion_estimator (phase correlation) → (dx, dy) px
//   (dx, dy) px   → calibration (projection onto overflow direction) → mm
//   mm per frame  → roi_tracker (per-second bucket aggregation)
//
// Driven by pipeline::FramePipeline, one RoiTracker per user-defined ROI.

pub mod calibration;
pub mod motion_estimator;
pub mod roi_tracker;

// Re-exports for ergonomic access from consumers
pub use calibration::CalibrationParams;
pub use motion_estimator::{EstimatorConfig, MotionEstimator};
pub use roi_tracker::{
    MotionSample, RoiTracker, SecondBucket, VelocityAccumulator, VelocityAggregate,
};
