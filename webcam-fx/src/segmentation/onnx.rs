use super::preprocess::{mask_from_output, Preprocessor};
use super::types::{Mask, Quality, SegmentationModel};
use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use std::path::Path;

/// Single-input person segmentation model run through ONNX Runtime
///
/// Expects an NCHW float input in [0, 1] and a single-channel probability
/// output, as exported by the common selfie/portrait segmentation models.
pub struct OnnxSegmenter {
    session: Option<Session>,
    preprocessor: Preprocessor,
    quality: Quality,
    width: u32,
    height: u32,
}

impl OnnxSegmenter {
    /// Load a model for the given preset
    ///
    /// # Arguments
    /// * `model_path` - Path to the ONNX model file
    /// * `quality` - Preset this instance serves
    /// * `input_size` - Model input (width, height) for the preset
    /// * `intra_threads` - ONNX Runtime intra-op threads
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        quality: Quality,
        input_size: (u32, u32),
        intra_threads: usize,
    ) -> Result<Self> {
        let path = model_path.as_ref();
        let (width, height) = input_size;

        tracing::info!(
            "Loading {} segmentation model from {} ({}x{})",
            quality,
            path.display(),
            width,
            height
        );

        let session = Session::builder()
            .map_err(|e| anyhow!("Failed to create session builder: {e}"))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow!("Failed to set optimization level: {e}"))?
            .with_intra_threads(intra_threads.max(1))
            .map_err(|e| anyhow!("Failed to set intra threads: {e}"))?
            .commit_from_file(path)
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("Segmentation model loaded successfully");

        Ok(Self {
            session: Some(session),
            preprocessor: Preprocessor::new(width, height),
            quality,
            width,
            height,
        })
    }
}

impl SegmentationModel for OnnxSegmenter {
    fn infer(&mut self, frame: &RgbImage) -> Result<Option<Mask>> {
        let _span = tracing::debug_span!("onnx_infer").entered();

        let session = self
            .session
            .as_mut()
            .context("Segmentation model already released")?;

        let tensor = self.preprocessor.preprocess(frame);
        let shape = tensor.shape().to_vec();
        let input = Tensor::from_array((shape, tensor.into_raw_vec().into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| anyhow!("Failed to create input tensor: {e}"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| anyhow!("Failed to run inference: {e}"))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| anyhow!("Failed to extract mask tensor: {e}"))?;
        if data.is_empty() {
            return Ok(None);
        }

        let dims: Vec<i64> = shape.iter().copied().collect();
        mask_from_output(&dims, data).map(Some)
    }

    fn quality(&self) -> Quality {
        self.quality
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn release(&mut self) -> Result<()> {
        if self.session.take().is_some() {
            tracing::debug!("Released {} segmentation session", self.quality);
        }
        Ok(())
    }
}
