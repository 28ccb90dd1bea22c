use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Collaborator being constructed when a start attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    Source,
    Model,
    Sink,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InitStage::Source => "frame source",
            InitStage::Model => "segmentation model",
            InitStage::Sink => "virtual output",
        };
        f.write_str(name)
    }
}

/// Errors surfaced to the control layer by the engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to initialize {stage}: {message}")]
    Initialization { stage: InitStage, message: String },

    #[error("failed to spawn pipeline thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("pipeline thread exited before reporting readiness")]
    WorkerLost,

    #[error("pipeline did not become ready within {0:?}")]
    StartTimedOut(Duration),

    #[error("pipeline thread did not exit within {0:?}; its devices are still held")]
    StopTimedOut(Duration),

    #[error("previous pipeline run is still shutting down")]
    PreviousRunActive,
}

impl EngineError {
    pub fn initialization(stage: InitStage, err: anyhow::Error) -> Self {
        EngineError::Initialization {
            stage,
            message: format!("{err:#}"),
        }
    }

    /// Stage that failed, for initialization errors
    pub fn stage(&self) -> Option<InitStage> {
        match self {
            EngineError::Initialization { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
