#[cfg(feature = "v4l2-output")]
mod loopback;
mod yuyv;

#[cfg(feature = "v4l2-output")]
pub use loopback::V4L2Output;
pub use yuyv::rgb_to_yuyv;

use anyhow::Result;
use image::RgbImage;
use std::path::PathBuf;

/// Virtual camera settings
#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    pub device: PathBuf,
    /// Output size; `None` follows the capture resolution
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/video10"),
            width: None,
            height: None,
        }
    }
}

impl OutputConfig {
    /// Output size for a given source resolution
    pub fn size_for(&self, source: (u32, u32)) -> (u32, u32) {
        (
            self.width.unwrap_or(source.0),
            self.height.unwrap_or(source.1),
        )
    }
}

/// Trait for output destinations
pub trait OutputSink {
    /// Write a frame to the output
    fn emit(&mut self, frame: &RgbImage) -> Result<()>;

    /// Get the expected output resolution
    fn resolution(&self) -> (u32, u32);

    /// Close the device. Must tolerate repeated calls.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}
