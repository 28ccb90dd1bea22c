#[cfg(feature = "webcam")]
mod webcam;

#[cfg(feature = "webcam")]
pub use webcam::WebcamCapture;

use anyhow::Result;
use image::RgbImage;

/// One captured picture: 8-bit, 3 channels, owned by a single pipeline iteration
pub type Frame = RgbImage;

/// Camera capture settings
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    pub device_index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Flip horizontally so the preview behaves like a mirror
    pub mirror: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            width: 1280,
            height: 720,
            fps: 30,
            mirror: true,
        }
    }
}

/// Trait for camera capture sources
pub trait CaptureSource {
    /// Acquire the next frame
    ///
    /// `Ok(None)` means no frame is ready yet; the caller polls again shortly.
    fn acquire(&mut self) -> Result<Option<Frame>>;

    /// Get the resolution of captured frames
    fn resolution(&self) -> (u32, u32);

    /// Stop the device. Must tolerate repeated calls.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}
