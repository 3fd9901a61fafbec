// src/pipeline/metrics.rs
//
// Pipeline observability. Counters live behind Arc<AtomicU64> so a GUI or
// export thread can snapshot them while the processing thread runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub total_frames: Arc<AtomicU64>,
    pub frames_rejected: Arc<AtomicU64>,
    pub samples_produced: Arc<AtomicU64>,
    pub rois_skipped: Arc<AtomicU64>,
    pub buckets_finalized: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            total_frames: Arc::new(AtomicU64::new(0)),
            frames_rejected: Arc::new(AtomicU64::new(0)),
            samples_produced: Arc::new(AtomicU64::new(0)),
            rois_skipped: Arc::new(AtomicU64::new(0)),
            buckets_finalized: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.total_frames.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_frames: self.total_frames.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            samples_produced: self.samples_produced.load(Ordering::Relaxed),
            rois_skipped: self.rois_skipped.load(Ordering::Relaxed),
            buckets_finalized: self.buckets_finalized.load(Ordering::Relaxed),
            fps: self.fps(),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub frames_rejected: u64,
    pub samples_produced: u64,
    pub rois_skipped: u64,
    pub buckets_finalized: u64,
    pub fps: f64,
    pub elapsed_secs: f64,
}
