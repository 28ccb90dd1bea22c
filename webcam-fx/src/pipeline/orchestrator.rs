use super::settings::{PipelineSettings, SharedSettings};
use super::stats::SharedStats;
use crate::capture::Frame;
use crate::effects::{reduce_noise, Compositor, CompositorConfig, MaskSmoother, SmoothingConfig};
use crate::engine::{release_logged, Backend, Collaborators, StateCell};
use crate::segmentation::{Mask, Quality};
use anyhow::{anyhow, Context, Result};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Pause before polling the source again when it had no frame
pub const NO_FRAME_BACKOFF: Duration = Duration::from_millis(10);
/// Pause after a failed iteration
pub const ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Result of one pass through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iteration {
    /// The source had nothing ready
    NoFrame,
    /// A composited frame reached the sink
    Emitted,
}

/// Static parameters of the processing loop
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub smoothing: SmoothingConfig,
    pub compositor: CompositorConfig,
    pub target_fps: u32,
}

/// Capture -> segmentation -> smoothing -> compositing -> output, one frame at a time
pub struct FramePipeline {
    collaborators: Collaborators,
    smoother: MaskSmoother,
    compositor: Compositor,
    settings: SharedSettings,
    stats: SharedStats,
    backend: Arc<dyn Backend>,
    target_fps: u32,
    // Preset whose model failed to load; not retried until the request changes
    failed_quality: Option<Quality>,
}

impl FramePipeline {
    pub fn new(
        collaborators: Collaborators,
        config: &PipelineConfig,
        settings: SharedSettings,
        stats: SharedStats,
        backend: Arc<dyn Backend>,
    ) -> Self {
        Self {
            collaborators,
            smoother: MaskSmoother::new(config.smoothing.clone()),
            compositor: Compositor::new(&config.compositor),
            settings,
            stats,
            backend,
            target_fps: config.target_fps.max(1),
            failed_quality: None,
        }
    }

    /// Loop until `state` leaves `Running`
    ///
    /// The flag is checked once per iteration; an iteration in progress always
    /// completes. Failures and panics inside an iteration are logged and never
    /// end the loop.
    pub fn run(&mut self, state: &StateCell) {
        let frame_budget = Duration::from_secs_f64(1.0 / self.target_fps as f64);
        tracing::info!("Starting main pipeline loop at {} fps", self.target_fps);

        while state.is_running() {
            let started = Instant::now();

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_iteration()))
                .unwrap_or_else(|payload| {
                    // Masks buffered around a panic are not trusted
                    self.smoother.reset();
                    Err(anyhow!("iteration panicked: {}", panic_message(&*payload)))
                });

            match outcome {
                Ok(Iteration::NoFrame) => thread::sleep(NO_FRAME_BACKOFF),
                Ok(Iteration::Emitted) => {
                    let latency = started.elapsed();
                    let (stats, refreshed) = self.stats.record(latency, self.target_fps);
                    if refreshed {
                        tracing::info!(
                            "Frame {}: latency={:.1}ms, fps={:.1}, grade={}",
                            stats.frames_processed,
                            stats.last_iteration_latency_ms,
                            stats.fps,
                            stats
                                .performance_grade
                                .map(|g| g.to_string())
                                .unwrap_or_default()
                        );
                    }

                    // Frame rate limiting
                    if latency < frame_budget {
                        thread::sleep(frame_budget - latency);
                    }
                }
                Err(e) => {
                    tracing::warn!("Frame iteration failed: {:#}", e);
                    thread::sleep(ERROR_BACKOFF);
                }
            }
        }

        tracing::info!("Pipeline loop exited");
    }

    /// Process a single frame end to end
    pub fn run_iteration(&mut self) -> Result<Iteration> {
        let settings = self.settings.snapshot();
        self.sync_model(settings.quality);

        let frame = {
            let _span = tracing::debug_span!("capture").entered();
            self.collaborators
                .source
                .acquire()
                .context("Failed to acquire frame")?
        };
        let Some(frame) = frame else {
            return Ok(Iteration::NoFrame);
        };

        let output = self.process(frame, &settings);

        let _span = tracing::debug_span!("emit").entered();
        self.collaborators
            .sink
            .emit(&output)
            .context("Failed to write frame")?;

        Ok(Iteration::Emitted)
    }

    /// Segmentation, smoothing, compositing and optional noise reduction
    fn process(&mut self, frame: Frame, settings: &PipelineSettings) -> Frame {
        let (width, height) = frame.dimensions();

        // A missing mask blurs the whole frame rather than exposing it
        let mask = match self.segment(&frame) {
            Some(raw) => self.smoother.smooth(
                raw,
                settings.temporal_smoothing,
                settings.edge_smoothing,
            ),
            None => Mask::background(width, height),
        };

        let composited = self
            .compositor
            .composite(frame, &mask, settings.blur_intensity);

        if settings.noise_reduction {
            reduce_noise(&composited)
        } else {
            composited
        }
    }

    /// Model mask normalized and upsampled to the frame, or `None` on failure
    fn segment(&mut self, frame: &Frame) -> Option<Mask> {
        let _span = tracing::debug_span!("segment").entered();
        let (width, height) = frame.dimensions();

        match self.collaborators.model.infer(frame) {
            Ok(Some(mask)) => Some(mask.normalized().resized(width, height)),
            Ok(None) => {
                tracing::debug!("Model returned no mask, blurring the full frame");
                None
            }
            Err(e) => {
                tracing::warn!("Segmentation failed, blurring the full frame: {:#}", e);
                None
            }
        }
    }

    /// Rebuild the model when the requested preset differs from the loaded one
    fn sync_model(&mut self, requested: Quality) {
        if requested == self.collaborators.model.quality() {
            self.failed_quality = None;
            return;
        }
        if self.failed_quality == Some(requested) {
            return;
        }

        tracing::info!(
            "Switching segmentation model from {} to {}",
            self.collaborators.model.quality(),
            requested
        );
        match self.backend.open_model(requested) {
            Ok(model) => {
                let (input_width, input_height) = model.input_size();
                tracing::info!(
                    "Loaded {} model with {}x{} input",
                    requested,
                    input_width,
                    input_height
                );
                let mut previous = std::mem::replace(&mut self.collaborators.model, model);
                release_logged("previous segmentation model", previous.release());
                self.smoother.reset();
                self.failed_quality = None;
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to load {} model, keeping {}: {:#}",
                    requested,
                    self.collaborators.model.quality(),
                    e
                );
                self.failed_quality = Some(requested);
            }
        }
    }

    pub fn model_quality(&self) -> Quality {
        self.collaborators.model.quality()
    }

    pub fn into_collaborators(self) -> Collaborators {
        self.collaborators
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
