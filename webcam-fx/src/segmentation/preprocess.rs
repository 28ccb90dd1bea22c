use super::types::Mask;
use anyhow::{bail, Context, Result};
use image::{imageops, RgbImage};
use ndarray::Array4;

/// Preprocessor for converting RGB frames to model input tensors
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// Preprocess an RGB frame into a normalized NCHW tensor
    ///
    /// Steps:
    /// 1. Resize to the model input size (bilinear, this runs every frame)
    /// 2. Convert to float and normalize to [0, 1]
    /// 3. Transpose from HWC to NCHW format
    ///
    /// Returns: Array4<f32> with shape [1, 3, height, width]
    pub fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized;
        let source = if image.dimensions() != (self.target_width, self.target_height) {
            resized = imageops::resize(
                image,
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            );
            &resized
        } else {
            image
        };

        let (width, height) = source.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        for (x, y, pixel) in source.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
            }
        }

        tensor
    }
}

/// Interpret a raw model output as a mask
///
/// Accepts single-channel layouts: [H, W], [1, H, W], [1, 1, H, W] and
/// [1, H, W, 1]. The mask stays at model resolution.
pub fn mask_from_output(shape: &[i64], data: &[f32]) -> Result<Mask> {
    let dims = shape
        .iter()
        .map(|&d| usize::try_from(d))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Dynamic dimension in mask output shape {shape:?}"))?;

    let (height, width) = match dims.as_slice() {
        [h, w] | [1, h, w] | [1, 1, h, w] | [1, h, w, 1] => (*h, *w),
        other => bail!("Unsupported mask output shape {other:?}"),
    };

    if data.len() != height * width {
        bail!(
            "Mask output holds {} values, expected {}x{}",
            data.len(),
            width,
            height
        );
    }

    Mask::from_raw(width as u32, height as u32, data.to_vec())
        .with_context(|| format!("Empty mask output {width}x{height}"))
}
