pub use crate::capture::CaptureConfig;
pub use crate::effects::{CompositorConfig, SmoothingConfig};
pub use crate::engine::ModelConfig;
pub use crate::output::OutputConfig;
pub use crate::pipeline::PipelineSettings;

use std::time::Duration;

pub const DEFAULT_TARGET_FPS: u32 = 30;
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(15);

/// Everything the engine needs to build and run a pipeline
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub capture: CaptureConfig,
    pub model: ModelConfig,
    pub output: OutputConfig,
    pub smoothing: SmoothingConfig,
    pub compositor: CompositorConfig,
    /// Upper bound on emitted frames per second
    pub target_fps: u32,
    /// How long `stop` waits for the loop to exit
    pub stop_timeout: Duration,
    /// How long `start` waits for the devices and model to open
    pub start_timeout: Duration,
    /// Initial live settings
    pub settings: PipelineSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            model: ModelConfig::default(),
            output: OutputConfig::default(),
            smoothing: SmoothingConfig::default(),
            compositor: CompositorConfig::default(),
            target_fps: DEFAULT_TARGET_FPS,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            start_timeout: DEFAULT_START_TIMEOUT,
            settings: PipelineSettings::default(),
        }
    }
}
