#[cfg(feature = "onnx")]
mod onnx;
mod preprocess;
pub mod types;

#[cfg(feature = "onnx")]
pub use onnx::OnnxSegmenter;
pub use preprocess::{mask_from_output, Preprocessor};
pub use types::{Mask, Quality, SegmentationModel};
