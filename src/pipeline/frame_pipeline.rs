// src/pipeline/frame_pipeline.rs
//
// Owns the ordered ROI tracker collection and the global frame clock.
// Frames flow in, get cropped per ROI in insertion order, and each crop is
// handed to its tracker together with the pipeline's wall-clock timestamp.
// Results flow back out through the tracker accessors; the pipeline keeps
// no frame buffer beyond the one in flight.

use std::collections::VecDeque;
use std::time::SystemTime;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::{CalibrationParams, EstimatorConfig, RoiTracker, VelocityAggregate};
use crate::pipeline::metrics::PipelineMetrics;
use crate::types::{Config, GrayFrame, RoiRect};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of recent frame records kept for consumers that poll late.
    pub history_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            history_capacity: 512,
        }
    }
}

/// Book-keeping entry for one processed frame.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FrameRecord {
    pub frame_index: u64,
    pub timestamp: SystemTime,
}

/// Per-call result: which frame this was and how the ROIs fared.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FrameSummary {
    pub frame_index: u64,
    pub rois_processed: usize,
    pub rois_skipped: usize,
    pub samples_produced: usize,
}

/// Synchronous frame dispatcher. One call runs to completion before the
/// next frame is accepted; callers with multiple producers serialize access
/// themselves.
pub struct FramePipeline {
    frame_count: u64,
    trackers: Vec<RoiTracker>,
    calibration: CalibrationParams,
    estimator_config: EstimatorConfig,
    history: VecDeque<FrameRecord>,
    history_capacity: usize,
    last_processed_at: Option<SystemTime>,
    metrics: PipelineMetrics,
}

impl FramePipeline {
    pub fn new() -> Self {
        Self::with(
            CalibrationParams::default(),
            EstimatorConfig::default(),
            PipelineConfig::default(),
        )
    }

    pub fn from_config(config: &Config) -> Self {
        Self::with(
            config.calibration,
            config.estimator.clone(),
            config.pipeline.clone(),
        )
    }

    fn with(
        calibration: CalibrationParams,
        estimator_config: EstimatorConfig,
        pipeline_config: PipelineConfig,
    ) -> Self {
        Self {
            frame_count: 0,
            trackers: Vec::new(),
            calibration,
            estimator_config,
            history: VecDeque::with_capacity(pipeline_config.history_capacity),
            history_capacity: pipeline_config.history_capacity.max(1),
            last_processed_at: None,
            metrics: PipelineMetrics::new(),
        }
    }

    /// Process one frame against every ROI, stamping it with the wall
    /// clock at the moment of the call.
    pub fn process_frame(&mut self, frame: &GrayFrame) -> Option<FrameSummary> {
        self.process_frame_at(frame, SystemTime::now())
    }

    /// Same as `process_frame` with an explicit timestamp, for replaying a
    /// recorded session under its original clock.
    ///
    /// A malformed frame (zero dimension, or a buffer that does not match
    /// the dimensions) is rejected without incrementing the frame counter
    /// or touching any tracker.
    pub fn process_frame_at(&mut self, frame: &GrayFrame, at: SystemTime) -> Option<FrameSummary> {
        if !frame.is_well_formed() {
            warn!(
                "rejecting malformed frame ({}x{}, {} bytes)",
                frame.width,
                frame.height,
                frame.data.len()
            );
            self.metrics.inc(&self.metrics.frames_rejected);
            return None;
        }

        self.frame_count += 1;
        self.last_processed_at = Some(at);
        self.metrics.inc(&self.metrics.total_frames);

        self.history.push_back(FrameRecord {
            frame_index: self.frame_count,
            timestamp: at,
        });
        if self.history.len() > self.history_capacity {
            self.history.pop_front();
        }

        let mut rois_processed = 0;
        let mut rois_skipped = 0;
        let mut samples_produced = 0;

        for (idx, tracker) in self.trackers.iter_mut().enumerate() {
            match frame.crop(tracker.roi()) {
                Some(crop) => {
                    rois_processed += 1;
                    let buckets_before = tracker.aggregates().len();
                    if tracker.process_frame(&crop, at).is_some() {
                        samples_produced += 1;
                        self.metrics.inc(&self.metrics.samples_produced);
                    }
                    let finalized = tracker.aggregates().len() - buckets_before;
                    if finalized > 0 {
                        self.metrics
                            .add(&self.metrics.buckets_finalized, finalized as u64);
                    }
                }
                None => {
                    debug!(
                        "frame {}: ROI #{} {:?} outside {}x{} frame, skipped",
                        self.frame_count, idx, tracker.roi(), frame.width, frame.height
                    );
                    rois_skipped += 1;
                    self.metrics.inc(&self.metrics.rois_skipped);
                }
            }
        }

        Some(FrameSummary {
            frame_index: self.frame_count,
            rois_processed,
            rois_skipped,
            samples_produced,
        })
    }

    /// Add a tracker for `roi`, seeded with the calibration in effect right
    /// now. Returns the tracker's stable index in the collection.
    pub fn add_roi(&mut self, roi: RoiRect) -> usize {
        info!(
            "ROI #{} added: {:?} ({} px per 20 mm, {}°)",
            self.trackers.len(),
            roi,
            self.calibration.pixels_per_20_mm,
            self.calibration.direction_degrees
        );
        self.trackers.push(RoiTracker::new(
            roi,
            self.calibration,
            self.estimator_config.clone(),
        ));
        self.trackers.len() - 1
    }

    /// Remove the most recently added tracker together with its estimator
    /// state and history. Returns false when there is nothing to remove.
    pub fn delete_last_roi(&mut self) -> bool {
        match self.trackers.pop() {
            Some(tracker) => {
                info!("ROI removed: {:?}", tracker.roi());
                true
            }
            None => false,
        }
    }

    /// Update the calibration used for trackers created from now on.
    /// Existing trackers keep the parameters they captured; call
    /// `RoiTracker::recalibrate` (or re-add the ROI) to apply new ones.
    /// A non-positive or non-finite ruler length is rejected and the
    /// previous calibration stays in effect.
    pub fn set_calibration(&mut self, pixels_per_20_mm: f32, direction_degrees: f32) -> Result<()> {
        let candidate = CalibrationParams::new(pixels_per_20_mm, direction_degrees);
        if !candidate.is_valid() {
            warn!(
                "rejecting calibration: {} px per 20 mm, {}°",
                pixels_per_20_mm, direction_degrees
            );
            bail!(
                "invalid calibration: {} px per 20 mm, {}°",
                pixels_per_20_mm,
                direction_degrees
            );
        }
        info!(
            "📏 calibration set: {} px per 20 mm ({:.3} mm/px), direction {}°",
            pixels_per_20_mm,
            candidate.scale_mm_per_px(),
            direction_degrees
        );
        self.calibration = candidate;
        Ok(())
    }

    /// Close every tracker's open bucket at session end, in insertion
    /// order. Entries are None for trackers that had nothing open.
    pub fn flush(&mut self) -> Vec<Option<VelocityAggregate>> {
        self.trackers.iter_mut().map(|t| t.flush()).collect()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn calibration(&self) -> CalibrationParams {
        self.calibration
    }

    /// Trackers in insertion order.
    pub fn trackers(&self) -> &[RoiTracker] {
        &self.trackers
    }

    pub fn trackers_mut(&mut self) -> &mut [RoiTracker] {
        &mut self.trackers
    }

    /// Recent frame records, oldest first, capped at the configured
    /// capacity.
    pub fn history(&self) -> &VecDeque<FrameRecord> {
        &self.history
    }

    pub fn last_processed_at(&self) -> Option<SystemTime> {
        self.last_processed_at
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }
}

impl Default for FramePipeline {
    fn default() -> Self {
        Self::new()
    }
}
