//! Separable gaussian convolution over interleaved `f32` rasters.
//!
//! Borders use reflect-101 (`dcb|abcd|cba`), so a constant field blurs to
//! itself.

use image::RgbImage;
use rayon::prelude::*;

/// Round `value` up to an odd kernel size no smaller than `minimum`
pub fn odd_at_least(value: i64, minimum: u32) -> u32 {
    let size = value.max(minimum as i64).min(u32::MAX as i64 - 1) as u32;
    if size % 2 == 0 {
        size + 1
    } else {
        size
    }
}

/// Sigma implied by a kernel size when none is given
pub fn sigma_for_kernel(ksize: u32) -> f32 {
    0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Normalized 1-D gaussian weights. `sigma <= 0` derives sigma from the size.
pub fn gaussian_kernel(ksize: u32, sigma: f32) -> Vec<f32> {
    let ksize = odd_at_least(ksize as i64, 1);
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        sigma_for_kernel(ksize)
    };
    let radius = (ksize / 2) as i64;
    let denom = 2.0 * sigma * sigma;

    let mut weights: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / denom).exp())
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.iter_mut().for_each(|w| *w /= sum);
    weights
}

pub(crate) fn reflect_101(index: i64, len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    let len = len as i64;
    let period = 2 * (len - 1);
    let mut m = index.rem_euclid(period);
    if m >= len {
        m = period - m;
    }
    m as usize
}

/// Gaussian blur of a `width` x `height` raster with `channels` interleaved samples
pub fn gaussian_blur(
    data: &[f32],
    width: usize,
    height: usize,
    channels: usize,
    ksize: u32,
    sigma: f32,
) -> Vec<f32> {
    let row_len = width * channels;
    if width == 0 || height == 0 || channels == 0 || data.len() != row_len * height {
        return data.to_vec();
    }

    let weights = gaussian_kernel(ksize, sigma);
    let radius = (weights.len() / 2) as i64;

    // Column offsets for every (x, tap) are the same on every row
    let columns: Vec<usize> = (0..width as i64)
        .flat_map(|x| (0..weights.len() as i64).map(move |k| reflect_101(x + k - radius, width)))
        .collect();

    let mut horizontal = vec![0.0f32; data.len()];
    horizontal
        .par_chunks_mut(row_len)
        .zip(data.par_chunks(row_len))
        .for_each(|(out, src)| {
            for x in 0..width {
                let taps = &columns[x * weights.len()..(x + 1) * weights.len()];
                for c in 0..channels {
                    let mut acc = 0.0;
                    for (w, &sx) in weights.iter().zip(taps) {
                        acc += w * src[sx * channels + c];
                    }
                    out[x * channels + c] = acc;
                }
            }
        });

    let mut output = vec![0.0f32; data.len()];
    output
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, out)| {
            for (k, w) in weights.iter().enumerate() {
                let sy = reflect_101(y as i64 + k as i64 - radius, height);
                let src = &horizontal[sy * row_len..(sy + 1) * row_len];
                for (o, s) in out.iter_mut().zip(src) {
                    *o += w * s;
                }
            }
        });

    output
}

/// Frame samples as floats
pub fn frame_to_f32(frame: &RgbImage) -> Vec<f32> {
    frame.as_raw().iter().map(|&v| v as f32).collect()
}

/// Round and saturate a float sample into 8 bits
pub fn saturate_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Rebuild an 8-bit frame from float samples with saturation
pub fn frame_from_f32(width: u32, height: u32, data: &[f32]) -> RgbImage {
    let mut frame = RgbImage::new(width, height);
    for (dst, &src) in frame.iter_mut().zip(data) {
        *dst = saturate_u8(src);
    }
    frame
}

/// Blur an 8-bit frame, keeping the float result for further passes
pub fn blur_frame(frame: &RgbImage, ksize: u32) -> Vec<f32> {
    let (width, height) = frame.dimensions();
    gaussian_blur(
        &frame_to_f32(frame),
        width as usize,
        height as usize,
        3,
        ksize,
        0.0,
    )
}
