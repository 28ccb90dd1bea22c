use super::yuyv::rgb_to_yuyv;
use super::OutputSink;
use anyhow::{Context, Result};
use image::RgbImage;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, Format, FourCC};

/// v4l2loopback virtual camera fed with raw YUYV writes
pub struct V4L2Output {
    // Keeps the negotiated format alive for the lifetime of the writer
    device: Option<Device>,
    file: Option<File>,
    width: u32,
    height: u32,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        let device = Device::with_path(path)
            .with_context(|| format!("Failed to open v4l2 device at {}", path.display()))?;

        let requested = Format::new(width, height, FourCC::new(b"YUYV"));
        let applied = Output::set_format(&device, &requested)
            .context("Failed to set YUYV output format")?;
        if applied.width != width || applied.height != height {
            tracing::warn!(
                "Loopback device negotiated {}x{} instead of {}x{}",
                applied.width,
                applied.height,
                width,
                height
            );
        }

        // v4l2loopback accepts raw frame data written to the device file
        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        tracing::info!("v4l2loopback device opened successfully");

        Ok(Self {
            device: Some(device),
            file: Some(file),
            width: applied.width,
            height: applied.height,
        })
    }
}

impl OutputSink for V4L2Output {
    fn emit(&mut self, frame: &RgbImage) -> Result<()> {
        let _span = tracing::debug_span!("v4l2_emit").entered();

        let file = self
            .file
            .as_mut()
            .context("Loopback device already released")?;

        let resized;
        let frame = if frame.dimensions() != (self.width, self.height) {
            resized = image::imageops::resize(
                frame,
                self.width,
                self.height,
                image::imageops::FilterType::Triangle,
            );
            &resized
        } else {
            frame
        };

        file.write_all(&rgb_to_yuyv(frame))
            .context("Failed to write frame to v4l2loopback device")?;

        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn release(&mut self) -> Result<()> {
        let flushed = match self.file.take() {
            Some(mut file) => file.flush().context("Failed to flush loopback device"),
            None => Ok(()),
        };
        self.device = None;
        flushed
    }
}
