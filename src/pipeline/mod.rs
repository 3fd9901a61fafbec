// src/pipeline/mod.rs

pub mod frame_pipeline;
pub mod metrics;

pub use frame_pipeline::{FramePipeline, FrameRecord, FrameSummary, PipelineConfig};
pub use metrics::{MetricsSummary, PipelineMetrics};
