use image::RgbImage;

/// Convert an RGB frame to packed YUV 4:2:2 (YUYV), the format v4l2loopback
/// consumers expect. Odd widths repeat the last pixel for the final pair.
pub fn rgb_to_yuyv(rgb_image: &RgbImage) -> Vec<u8> {
    let (width, height) = rgb_image.dimensions();
    let (width, height) = (width as usize, height as usize);
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let raw = rgb_image.as_raw();
    let pairs = width.div_ceil(2);
    let mut yuyv = Vec::with_capacity(pairs * 4 * height);

    for row in raw.chunks_exact(width * 3).take(height) {
        for pair in 0..pairs {
            let first = pair * 2;
            let second = (first + 1).min(width - 1);
            let p1 = &row[first * 3..first * 3 + 3];
            let p2 = &row[second * 3..second * 3 + 3];

            let (y1, u1, v1) = rgb_to_yuv(p1[0], p1[1], p1[2]);
            let (y2, u2, v2) = rgb_to_yuv(p2[0], p2[1], p2[2]);

            // Chroma is shared by the pair
            let u = ((u1 as u16 + u2 as u16) / 2) as u8;
            let v = ((v1 as u16 + v2 as u16) / 2) as u8;

            yuyv.extend_from_slice(&[y1, u, y2, v]);
        }
    }

    yuyv
}

/// Convert RGB to YUV color space
fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let r = r as f32;
    let g = g as f32;
    let b = b as f32;

    let y = (0.299 * r + 0.587 * g + 0.114 * b).clamp(0.0, 255.0) as u8;
    let u = ((-0.147 * r - 0.289 * g + 0.436 * b) + 128.0).clamp(0.0, 255.0) as u8;
    let v = ((0.615 * r - 0.515 * g - 0.100 * b) + 128.0).clamp(0.0, 255.0) as u8;

    (y, u, v)
}
