//! Real-time webcam background blur.
//!
//! Frames flow from a [`capture::CaptureSource`] through a
//! [`segmentation::SegmentationModel`], get their person mask smoothed and
//! their background blurred, and land in an [`output::OutputSink`]
//! (normally a v4l2loopback device). The [`Engine`] owns that loop on a
//! dedicated thread and exposes start/stop plus live setting updates.

pub mod capture;
pub mod config;
pub mod control;
pub mod effects;
pub mod engine;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod segmentation;

pub use config::EngineConfig;
pub use engine::{
    Backend, BlurAck, Collaborators, Engine, EngineStatus, LifecycleState, QualityAck,
    StartOutcome, StopOutcome,
};
pub use error::{EngineError, InitStage};
