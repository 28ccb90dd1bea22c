//! Lifecycle controller: owns the pipeline thread and the collaborators' lifetime.

mod backend;
mod state;

pub use backend::{Backend, Collaborators, DeviceBackend, ModelConfig};
pub(crate) use backend::release_logged;
use state::IdleOnExit;
pub use state::{LifecycleState, StateCell};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::pipeline::{
    FramePipeline, PerformanceGrade, PipelineConfig, SharedSettings, SharedStats,
};
use crate::segmentation::Quality;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Outcome of a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// Outcome of a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    Stopped,
    AlreadyStopped,
}

/// Acknowledgement of a blur update
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlurAck {
    pub blur_strength: f32,
    pub mode: String,
}

/// Acknowledgement of a quality update
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityAck {
    pub quality: Quality,
    pub smoothing_hint: f32,
    /// The running pipeline will swap its model
    pub model_reload: bool,
}

/// Snapshot reported to the control layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub running: bool,
    pub state: LifecycleState,
    pub blur_strength: f32,
    pub blur_mode: String,
    pub quality: Quality,
    pub smoothing_hint: f32,
    pub edge_smoothing: bool,
    pub temporal_smoothing: bool,
    pub noise_reduction: bool,
    pub frames_processed: u64,
    pub fps: f64,
    pub performance_grade: Option<PerformanceGrade>,
    pub last_iteration_latency_ms: f64,
    pub virtual_camera_active: bool,
}

struct Worker {
    handle: JoinHandle<()>,
    // Disconnects when the thread exits
    done: Receiver<()>,
    state: StateCell,
}

impl Worker {
    fn is_alive(&self) -> bool {
        matches!(self.done.try_recv(), Err(TryRecvError::Empty))
    }
}

/// Wait up to `wait` for the worker in `slot` to exit and join it
///
/// Returns false, leaving the worker in place, if it is still running. Its
/// devices are only released once the thread itself gets out.
fn reap(slot: &mut Option<Worker>, wait: Duration) -> bool {
    let Some(worker) = slot.take() else {
        return true;
    };

    match worker.done.recv_timeout(wait) {
        Err(RecvTimeoutError::Timeout) => {
            *slot = Some(worker);
            false
        }
        _ => {
            if worker.handle.join().is_err() {
                tracing::error!("Pipeline thread panicked");
            }
            worker.state.set(LifecycleState::Idle);
            true
        }
    }
}

/// Background blur engine
///
/// `start` spawns a pipeline thread that builds its own collaborators, so
/// every run starts from a clean slate; `stop` signals it, waits a bounded
/// time and joins it. Both are idempotent and serialized against each other.
/// A thread that overruns the stop timeout stays tracked, and the engine
/// reports `Stopping` and refuses to start until it has released everything.
pub struct Engine {
    config: EngineConfig,
    backend: Arc<dyn Backend>,
    settings: SharedSettings,
    stats: SharedStats,
    // Replaced on every start so a late thread never sees a later run's flag
    state: RwLock<StateCell>,
    worker: Mutex<Option<Worker>>,
}

impl Engine {
    pub fn new(config: EngineConfig, backend: Arc<dyn Backend>) -> Self {
        let settings = SharedSettings::new(config.settings.clone());
        Self {
            config,
            backend,
            settings,
            stats: SharedStats::default(),
            state: RwLock::new(StateCell::default()),
            worker: Mutex::new(None),
        }
    }

    /// Engine backed by the real webcam, ONNX model and loopback device
    pub fn with_devices(config: EngineConfig) -> Self {
        let backend = DeviceBackend::new(
            config.capture.clone(),
            config.model.clone(),
            config.output.clone(),
        );
        Self::new(config, Arc::new(backend))
    }

    pub fn state(&self) -> LifecycleState {
        self.state.read().get()
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    /// Build the collaborators and start the processing loop
    ///
    /// Frame counting restarts from zero. On failure everything built so far
    /// is released and the engine is back in `Idle`. A previous run that is
    /// still winding down gets one more stop timeout to finish first.
    pub fn start(&self) -> Result<StartOutcome, EngineError> {
        let mut worker = self.worker.lock();
        if let Some(active) = worker.as_ref() {
            if active.is_alive() && active.state.is_running() {
                tracing::info!("Start requested but the pipeline is already running");
                return Ok(StartOutcome::AlreadyRunning);
            }
            if !reap(&mut worker, self.config.stop_timeout) {
                tracing::warn!("Previous pipeline thread still holds its devices");
                return Err(EngineError::PreviousRunActive);
            }
            tracing::info!("Reaped previous pipeline thread");
        }

        let state = StateCell::new(LifecycleState::Initializing);
        *self.state.write() = state.clone();
        self.stats.reset();
        tracing::info!("Starting pipeline");

        let (ready_tx, ready_rx) = bounded::<Result<(), EngineError>>(1);
        let (done_tx, done_rx) = bounded::<()>(1);

        let backend = Arc::clone(&self.backend);
        let settings = self.settings.clone();
        let stats = self.stats.clone();
        let pipeline_config = PipelineConfig {
            smoothing: self.config.smoothing.clone(),
            compositor: self.config.compositor.clone(),
            target_fps: self.config.target_fps,
        };
        let thread_state = state.clone();

        let spawned = thread::Builder::new()
            .name("blurcam-pipeline".to_string())
            .spawn(move || {
                // Dropped last: state goes Idle only after everything is released
                let _idle = IdleOnExit(thread_state.clone());
                let _done = done_tx;
                let quality = settings.snapshot().quality;

                let mut collaborators = match Collaborators::open(backend.as_ref(), quality) {
                    Ok(collaborators) => collaborators,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Fails when start gave up waiting
                if !thread_state.transition(LifecycleState::Initializing, LifecycleState::Running)
                {
                    tracing::warn!("Pipeline became ready after start gave up, releasing");
                    collaborators.release();
                    let _ = ready_tx.send(Err(EngineError::WorkerLost));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                let mut pipeline =
                    FramePipeline::new(collaborators, &pipeline_config, settings, stats, backend);
                pipeline.run(&thread_state);
                pipeline.into_collaborators().release();
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                state.set(LifecycleState::Idle);
                tracing::error!("Failed to spawn pipeline thread: {}", e);
                return Err(EngineError::Spawn(e));
            }
        };

        let active = Worker {
            handle,
            done: done_rx,
            state: state.clone(),
        };

        match ready_rx.recv_timeout(self.config.start_timeout) {
            Ok(Ok(())) => {
                *worker = Some(active);
                tracing::info!("Pipeline running");
                Ok(StartOutcome::Started)
            }
            Ok(Err(e)) => {
                *worker = Some(active);
                reap(&mut worker, self.config.stop_timeout);
                tracing::error!("Pipeline failed to start: {}", e);
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) => {
                // The thread sees this and releases whatever it opened
                state.set(LifecycleState::Stopping);
                *worker = Some(active);
                tracing::error!(
                    "Pipeline did not become ready within {:?}",
                    self.config.start_timeout
                );
                Err(EngineError::StartTimedOut(self.config.start_timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                *worker = Some(active);
                reap(&mut worker, self.config.stop_timeout);
                tracing::error!("Pipeline thread died during initialization");
                Err(EngineError::WorkerLost)
            }
        }
    }

    /// Signal the loop, wait for it and tear everything down
    ///
    /// Errors with `StopTimedOut` when the loop is stuck in an iteration past
    /// the stop timeout; the engine then reports `Stopping` until the thread
    /// gets out and releases its devices, and `stop` may be called again.
    pub fn stop(&self) -> Result<StopOutcome, EngineError> {
        let mut worker = self.worker.lock();
        let Some(active) = worker.as_ref() else {
            return Ok(StopOutcome::AlreadyStopped);
        };

        if !active.is_alive() {
            // Thread already gone on its own or after an earlier timeout
            reap(&mut worker, Duration::ZERO);
            return Ok(StopOutcome::AlreadyStopped);
        }

        active.state.set(LifecycleState::Stopping);
        tracing::info!("Stopping pipeline");

        if !reap(&mut worker, self.config.stop_timeout) {
            tracing::warn!(
                "Pipeline thread did not exit within {:?}; it releases its devices when the current iteration returns",
                self.config.stop_timeout
            );
            return Err(EngineError::StopTimedOut(self.config.stop_timeout));
        }

        tracing::info!("Pipeline stopped");
        Ok(StopOutcome::Stopped)
    }

    /// Change blur strength live; out of range values are clamped
    pub fn update_blur(&self, strength: f32, mode: &str) -> BlurAck {
        let applied = self.settings.set_blur(strength, mode);
        let mode = self.settings.snapshot().blur_mode;
        tracing::info!("Blur updated to {} ({})", applied, mode);
        BlurAck {
            blur_strength: applied,
            mode,
        }
    }

    /// Change the segmentation preset; a running pipeline reloads its model
    pub fn update_quality(&self, quality: Quality, smoothing_hint: f32) -> QualityAck {
        let changed = self.settings.set_quality(quality, smoothing_hint);
        let model_reload = changed && self.is_running();
        tracing::info!(
            "Quality set to {}{}",
            quality,
            if model_reload { ", reloading model" } else { "" }
        );
        QualityAck {
            quality,
            smoothing_hint: self.settings.snapshot().smoothing_hint,
            model_reload,
        }
    }

    pub fn update_smoothing(&self, edge: bool, temporal: bool) {
        self.settings.set_smoothing(edge, temporal);
        tracing::info!("Smoothing: edge={}, temporal={}", edge, temporal);
    }

    pub fn update_noise_reduction(&self, enabled: bool) {
        self.settings.set_noise_reduction(enabled);
        tracing::info!("Noise reduction {}", if enabled { "on" } else { "off" });
    }

    pub fn status(&self) -> EngineStatus {
        let state = self.state();
        let settings = self.settings.snapshot();
        let stats = self.stats.snapshot();
        let running = state == LifecycleState::Running;

        EngineStatus {
            running,
            state,
            blur_strength: settings.blur_intensity,
            blur_mode: settings.blur_mode,
            quality: settings.quality,
            smoothing_hint: settings.smoothing_hint,
            edge_smoothing: settings.edge_smoothing,
            temporal_smoothing: settings.temporal_smoothing,
            noise_reduction: settings.noise_reduction,
            frames_processed: stats.frames_processed,
            fps: stats.fps,
            performance_grade: stats.performance_grade,
            last_iteration_latency_ms: stats.last_iteration_latency_ms,
            virtual_camera_active: running,
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("Engine dropped while the pipeline was busy: {}", e);
        }
    }
}
