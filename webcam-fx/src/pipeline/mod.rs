//! The per-frame processing loop and the state it shares with the control layer.

mod orchestrator;
mod settings;
mod stats;

pub use orchestrator::{
    FramePipeline, Iteration, PipelineConfig, ERROR_BACKOFF, NO_FRAME_BACKOFF,
};
pub use settings::{PipelineSettings, SharedSettings, DEFAULT_BLUR_INTENSITY, DEFAULT_BLUR_MODE};
pub use stats::{PerformanceGrade, PipelineStats, SharedStats, STATS_INTERVAL};
