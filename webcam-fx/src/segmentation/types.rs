use anyhow::Result;
use image::{imageops, ImageBuffer, Luma, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Foreground likelihood map: 0.0 = background, 1.0 = foreground
///
/// Row-major, one `f32` per pixel. Models may hand back a mask at their own
/// input resolution or in a 0-255 scale; `normalized` and `resized` bring it in
/// line with the frame before compositing.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl Mask {
    /// Wrap raw samples, rejecting empty or mis-sized buffers
    pub fn from_raw(width: u32, height: u32, data: Vec<f32>) -> Option<Self> {
        if width == 0 || height == 0 || data.len() != (width as usize) * (height as usize) {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Uniform mask
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; (width as usize) * (height as usize)],
        }
    }

    /// All-background mask, substituted when segmentation yields nothing
    pub fn background(width: u32, height: u32) -> Self {
        Self::filled(width, height, 0.0)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[(y as usize) * (self.width as usize) + x as usize]
    }

    /// Largest sample, used to detect 0-255 scaled masks
    pub fn max_value(&self) -> f32 {
        self.data.iter().copied().fold(f32::MIN, f32::max)
    }

    /// Bring a 0-255 scaled mask into [0, 1]; masks already in range are copied as-is
    pub fn normalized(&self) -> Mask {
        if self.max_value() > 1.0 {
            Mask {
                width: self.width,
                height: self.height,
                data: self.data.iter().map(|v| v / 255.0).collect(),
            }
        } else {
            self.clone()
        }
    }

    /// Bilinear resize. Samples are expected in [0, 1].
    pub fn resized(&self, width: u32, height: u32) -> Mask {
        if self.dimensions() == (width, height) {
            return self.clone();
        }

        let source: ImageBuffer<Luma<f32>, Vec<f32>> =
            ImageBuffer::from_fn(self.width, self.height, |x, y| Luma([self.get(x, y)]));
        let resized = imageops::resize(&source, width, height, imageops::FilterType::Triangle);

        Mask {
            width,
            height,
            data: resized.into_raw(),
        }
    }
}

/// Segmentation quality preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// Coarse, low-latency model input
    Fast,
    /// Slower, finer mask
    Accurate,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Fast => "fast",
            Quality::Accurate => "accurate",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = String;

    /// Accepts the front end's names too: "high" is the accurate model,
    /// "standard"/"performance"/"low" the fast one.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accurate" | "high" | "quality" => Ok(Quality::Accurate),
            "fast" | "standard" | "performance" | "low" => Ok(Quality::Fast),
            other => Err(format!("unknown quality '{other}', expected fast or accurate")),
        }
    }
}

/// Trait for segmentation models
/// Allows swapping the ONNX backend for test doubles
pub trait SegmentationModel {
    /// Produce a foreground mask for a frame
    ///
    /// The mask may be at the model's own resolution and in either a [0, 1]
    /// or [0, 255] scale. `Ok(None)` means the model ran but found nothing usable.
    fn infer(&mut self, frame: &RgbImage) -> Result<Option<Mask>>;

    /// Preset this model instance was built for
    fn quality(&self) -> Quality;

    /// Get the model's input dimensions
    ///
    /// Returns (width, height)
    fn input_size(&self) -> (u32, u32);

    /// Free runtime resources. Must tolerate repeated calls.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}
