// src/lib.rs
//
// Froth surface velocity monitoring core.
//
// Signal flow:
//   raw frame → FramePipeline (crop per ROI, wall-clock stamp)
//                 → RoiTracker (one per ROI, insertion order)
//                     → MotionEstimator (phase correlation, px delta)
//                     → CalibrationParams (px → mm along overflow direction)
//                     → VelocityAccumulator (per-second velocity buckets)
//
// Frame acquisition, GUI and persistence are external collaborators: they
// feed frames in through FramePipeline::process_frame and read tracker
// state back out through the accessors. The core is synchronous; callers
// with multiple producers serialize access themselves.

pub mod analysis;
mod config;
pub mod pipeline;
pub mod types;

pub use analysis::{
    CalibrationParams, EstimatorConfig, MotionEstimator, MotionSample, RoiTracker, SecondBucket,
    VelocityAccumulator, VelocityAggregate,
};
pub use pipeline::{
    FramePipeline, FrameRecord, FrameSummary, MetricsSummary, PipelineConfig, PipelineMetrics,
};
pub use types::{Config, GrayFrame, LoggingConfig, RoiRect};
