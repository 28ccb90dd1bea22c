use crate::capture::{CaptureConfig, CaptureSource};
use crate::error::{EngineError, InitStage};
use crate::output::{OutputConfig, OutputSink};
use crate::segmentation::{Quality, SegmentationModel};
use anyhow::Result;
use std::path::PathBuf;

/// Factory for the pipeline's collaborators
///
/// Every start builds a fresh set from scratch on the pipeline thread, which
/// is also where live model swaps happen.
pub trait Backend: Send + Sync {
    fn open_source(&self) -> Result<Box<dyn CaptureSource>>;

    fn open_model(&self, quality: Quality) -> Result<Box<dyn SegmentationModel>>;

    /// `source` is the resolution established by the frame source
    fn open_sink(&self, source: (u32, u32)) -> Result<Box<dyn OutputSink>>;
}

/// The frame source, model and sink of one pipeline run
pub struct Collaborators {
    pub source: Box<dyn CaptureSource>,
    pub model: Box<dyn SegmentationModel>,
    pub sink: Box<dyn OutputSink>,
}

impl Collaborators {
    /// Construct source, then model, then sink
    ///
    /// Anything already built is released again when a later stage fails.
    pub fn open(backend: &dyn Backend, quality: Quality) -> Result<Self, EngineError> {
        let mut source = backend
            .open_source()
            .map_err(|e| EngineError::initialization(InitStage::Source, e))?;

        let mut model = match backend.open_model(quality) {
            Ok(model) => model,
            Err(e) => {
                release_logged("frame source", source.release());
                return Err(EngineError::initialization(InitStage::Model, e));
            }
        };

        let sink = match backend.open_sink(source.resolution()) {
            Ok(sink) => sink,
            Err(e) => {
                release_logged("segmentation model", model.release());
                release_logged("frame source", source.release());
                return Err(EngineError::initialization(InitStage::Sink, e));
            }
        };

        Ok(Self {
            source,
            model,
            sink,
        })
    }

    /// Release every resource, carrying on past individual failures
    pub fn release(&mut self) {
        release_logged("virtual output", self.sink.release());
        release_logged("segmentation model", self.model.release());
        release_logged("frame source", self.source.release());
    }
}

pub(crate) fn release_logged(what: &str, result: Result<()>) {
    match result {
        Ok(()) => tracing::debug!("Released {}", what),
        Err(e) => tracing::warn!("Failed to release {}: {:#}", what, e),
    }
}

/// Segmentation model files and per-preset input sizes
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub path: PathBuf,
    /// Separate model for the fast preset; `path` is used when absent
    pub fast_path: Option<PathBuf>,
    pub accurate_input: (u32, u32),
    pub fast_input: (u32, u32),
    pub intra_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/selfie_segmentation.onnx"),
            fast_path: None,
            accurate_input: (512, 288),
            fast_input: (256, 144),
            intra_threads: 4,
        }
    }
}

impl ModelConfig {
    pub fn preset(&self, quality: Quality) -> (&PathBuf, (u32, u32)) {
        match quality {
            Quality::Accurate => (&self.path, self.accurate_input),
            Quality::Fast => (self.fast_path.as_ref().unwrap_or(&self.path), self.fast_input),
        }
    }
}

/// Real devices: nokhwa webcam, ONNX Runtime model, v4l2loopback sink
#[derive(Debug, Clone)]
pub struct DeviceBackend {
    capture: CaptureConfig,
    model: ModelConfig,
    output: OutputConfig,
}

impl DeviceBackend {
    pub fn new(capture: CaptureConfig, model: ModelConfig, output: OutputConfig) -> Self {
        Self {
            capture,
            model,
            output,
        }
    }
}

impl Backend for DeviceBackend {
    #[cfg(feature = "webcam")]
    fn open_source(&self) -> Result<Box<dyn CaptureSource>> {
        Ok(Box::new(crate::capture::WebcamCapture::new(&self.capture)?))
    }

    #[cfg(not(feature = "webcam"))]
    fn open_source(&self) -> Result<Box<dyn CaptureSource>> {
        anyhow::bail!(
            "webcam {} unavailable: built without the `webcam` feature",
            self.capture.device_index
        )
    }

    #[cfg(feature = "onnx")]
    fn open_model(&self, quality: Quality) -> Result<Box<dyn SegmentationModel>> {
        let (path, input_size) = self.model.preset(quality);
        let model = crate::segmentation::OnnxSegmenter::new(
            path,
            quality,
            input_size,
            self.model.intra_threads,
        )?;
        Ok(Box::new(model))
    }

    #[cfg(not(feature = "onnx"))]
    fn open_model(&self, quality: Quality) -> Result<Box<dyn SegmentationModel>> {
        let (path, _) = self.model.preset(quality);
        anyhow::bail!(
            "cannot load {}: built without the `onnx` feature",
            path.display()
        )
    }

    #[cfg(feature = "v4l2-output")]
    fn open_sink(&self, source: (u32, u32)) -> Result<Box<dyn OutputSink>> {
        let (width, height) = self.output.size_for(source);
        let sink = crate::output::V4L2Output::new(&self.output.device, width, height)?;
        Ok(Box::new(sink))
    }

    #[cfg(not(feature = "v4l2-output"))]
    fn open_sink(&self, _source: (u32, u32)) -> Result<Box<dyn OutputSink>> {
        anyhow::bail!(
            "cannot open {}: built without the `v4l2-output` feature",
            self.output.device.display()
        )
    }
}
