use super::kernel::{reflect_101, saturate_u8};
use image::RgbImage;
use rayon::prelude::*;

pub const DEFAULT_DIAMETER: u32 = 5;
pub const DEFAULT_SIGMA_COLOR: f32 = 80.0;
pub const DEFAULT_SIGMA_SPACE: f32 = 80.0;

/// Edge-preserving noise reduction applied to the final composite
pub fn reduce_noise(frame: &RgbImage) -> RgbImage {
    bilateral_filter(frame, DEFAULT_DIAMETER, DEFAULT_SIGMA_COLOR, DEFAULT_SIGMA_SPACE)
}

/// Bilateral filter over a circular neighbourhood
///
/// Colour distance is the L1 distance across channels.
pub fn bilateral_filter(
    frame: &RgbImage,
    diameter: u32,
    sigma_color: f32,
    sigma_space: f32,
) -> RgbImage {
    let _span = tracing::debug_span!("bilateral").entered();

    let (width, height) = frame.dimensions();
    let (w, h) = (width as usize, height as usize);
    let radius = (diameter.max(1) / 2) as i64;
    if w == 0 || h == 0 || radius == 0 {
        return frame.clone();
    }

    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let space_coeff = -0.5 / (sigma_space * sigma_space);

    let offsets: Vec<(i64, i64, f32)> = (-radius..=radius)
        .flat_map(|dy| (-radius..=radius).map(move |dx| (dx, dy)))
        .filter(|(dx, dy)| dx * dx + dy * dy <= radius * radius)
        .map(|(dx, dy)| (dx, dy, (((dx * dx + dy * dy) as f32) * space_coeff).exp()))
        .collect();

    // Colour weights for every possible L1 distance
    let color_lut: Vec<f32> = (0..=255 * 3)
        .map(|d| (((d * d) as f32) * color_coeff).exp())
        .collect();

    let src = frame.as_raw();
    let row_len = w * 3;
    let mut out = vec![0u8; src.len()];

    out.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..w {
                let center = &src[(y * w + x) * 3..(y * w + x) * 3 + 3];
                let mut acc = [0.0f32; 3];
                let mut total = 0.0f32;

                for &(dx, dy, space_weight) in &offsets {
                    let sx = reflect_101(x as i64 + dx, w);
                    let sy = reflect_101(y as i64 + dy, h);
                    let sample = &src[(sy * w + sx) * 3..(sy * w + sx) * 3 + 3];

                    let distance: usize = center
                        .iter()
                        .zip(sample)
                        .map(|(&a, &b)| (a as i32 - b as i32).unsigned_abs() as usize)
                        .sum();
                    let weight = space_weight * color_lut[distance];

                    for c in 0..3 {
                        acc[c] += sample[c] as f32 * weight;
                    }
                    total += weight;
                }

                for c in 0..3 {
                    row[x * 3 + c] = saturate_u8(acc[c] / total);
                }
            }
        });

    RgbImage::from_raw(width, height, out).unwrap_or_else(|| frame.clone())
}
