use super::kernel::{blur_frame, frame_from_f32, frame_to_f32, gaussian_blur, odd_at_least};
use crate::capture::Frame;
use crate::segmentation::Mask;
use image::imageops::{self, FilterType};

/// Default gain between the user-facing blur setting and the applied strength
pub const DEFAULT_INTENSITY_MULTIPLIER: f32 = 1.8;

/// Highest user-facing blur setting honoured; larger values are clamped
pub const MAX_BLUR_INTENSITY: f32 = 100.0;

/// Effective intensities up to this use a single pass
pub const LIGHT_TIER_MAX: u32 = 15;
/// Effective intensities up to this use two full-resolution passes
pub const MEDIUM_TIER_MAX: u32 = 25;

const SEAM_KERNEL: u32 = 5;
const SEAM_SIGMA: f32 = 1.5;

/// Clamp a user-facing blur setting into the supported range. NaN maps to 0.
pub fn clamp_intensity(intensity: f32) -> f32 {
    if intensity.is_nan() {
        0.0
    } else {
        intensity.clamp(0.0, MAX_BLUR_INTENSITY)
    }
}

/// Applied blur strength for a user setting, truncated to whole steps
pub fn effective_intensity(intensity: f32, multiplier: f32) -> u32 {
    (clamp_intensity(intensity) * multiplier.max(1.0)) as u32
}

/// Blur strategy for one frame, chosen by effective intensity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlurPlan {
    /// One full-resolution pass
    Light { kernel: u32 },
    /// Two full-resolution passes of increasing size
    Medium { first: u32, second: u32 },
    /// Two passes at half resolution, upsample, then a finishing pass
    Heavy { downsampled: u32, finish: u32 },
}

impl BlurPlan {
    pub fn for_intensity(effective: u32) -> Self {
        let scaled = |factor: f32| (effective as f32 * factor) as i64 + 1;

        if effective <= LIGHT_TIER_MAX {
            BlurPlan::Light {
                kernel: odd_at_least(effective as i64 + 1, 3),
            }
        } else if effective <= MEDIUM_TIER_MAX {
            BlurPlan::Medium {
                first: odd_at_least(scaled(0.6), 5),
                second: odd_at_least(scaled(0.8), 7),
            }
        } else {
            BlurPlan::Heavy {
                downsampled: odd_at_least(scaled(0.4), 7),
                finish: odd_at_least(scaled(0.3), 5),
            }
        }
    }

    /// Every kernel size the plan applies, in order
    pub fn kernels(&self) -> Vec<u32> {
        match *self {
            BlurPlan::Light { kernel } => vec![kernel],
            BlurPlan::Medium { first, second } => vec![first, second],
            BlurPlan::Heavy {
                downsampled,
                finish,
            } => vec![downsampled, downsampled, finish],
        }
    }
}

/// Background compositor settings
#[derive(Debug, Clone, PartialEq)]
pub struct CompositorConfig {
    /// Gain applied to the user-facing intensity, at least 1
    pub intensity_multiplier: f32,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            intensity_multiplier: DEFAULT_INTENSITY_MULTIPLIER,
        }
    }
}

/// Blurs the background and blends the sharp foreground back over it
pub struct Compositor {
    multiplier: f32,
}

impl Compositor {
    pub fn new(config: &CompositorConfig) -> Self {
        Self {
            multiplier: config.intensity_multiplier.max(1.0),
        }
    }

    pub fn plan(&self, blur_intensity: f32) -> BlurPlan {
        BlurPlan::for_intensity(effective_intensity(blur_intensity, self.multiplier))
    }

    /// Composite `frame` over its blurred self using `mask` as foreground weight
    ///
    /// A non-positive intensity hands the frame back untouched. The mask may be
    /// in [0, 1] or [0, 255] and at any resolution.
    pub fn composite(&self, frame: Frame, mask: &Mask, blur_intensity: f32) -> Frame {
        if !(blur_intensity > 0.0) {
            return frame;
        }

        let _span = tracing::debug_span!("composite").entered();
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return frame;
        }

        let plan = self.plan(blur_intensity);
        let background = self.blur_background(&frame, plan);
        let weights = seam_weights(mask, width, height);

        let mut output = vec![0.0f32; background.len()];
        for (i, (pixel, bg)) in frame
            .as_raw()
            .chunks_exact(3)
            .zip(background.chunks_exact(3))
            .enumerate()
        {
            let alpha = weights[i].clamp(0.0, 1.0);
            for c in 0..3 {
                output[i * 3 + c] = pixel[c] as f32 * alpha + bg[c] * (1.0 - alpha);
            }
        }

        frame_from_f32(width, height, &output)
    }

    /// Fully blurred background for `frame` at the given user intensity
    pub fn blurred_background(&self, frame: &Frame, blur_intensity: f32) -> Frame {
        let (width, height) = frame.dimensions();
        let background = self.blur_background(frame, self.plan(blur_intensity));
        frame_from_f32(width, height, &background)
    }

    fn blur_background(&self, frame: &Frame, plan: BlurPlan) -> Vec<f32> {
        let (width, height) = frame.dimensions();
        let (w, h) = (width as usize, height as usize);

        match plan {
            BlurPlan::Light { kernel } => blur_frame(frame, kernel),
            BlurPlan::Medium { first, second } => {
                let pass = blur_frame(frame, first);
                gaussian_blur(&pass, w, h, 3, second, 0.0)
            }
            BlurPlan::Heavy {
                downsampled,
                finish,
            } => {
                let (small_w, small_h) = ((width / 2).max(1), (height / 2).max(1));
                let small = imageops::resize(frame, small_w, small_h, FilterType::Triangle);

                let pass = blur_frame(&small, downsampled);
                let pass = gaussian_blur(
                    &pass,
                    small_w as usize,
                    small_h as usize,
                    3,
                    downsampled,
                    0.0,
                );

                let restored = imageops::resize(
                    &frame_from_f32(small_w, small_h, &pass),
                    width,
                    height,
                    FilterType::Triangle,
                );
                gaussian_blur(&frame_to_f32(&restored), w, h, 3, finish, 0.0)
            }
        }
    }
}

/// Per-pixel foreground weights at frame size, softened along the seam
fn seam_weights(mask: &Mask, width: u32, height: u32) -> Vec<f32> {
    let mut prepared = mask.normalized();
    if prepared.dimensions() != (width, height) {
        prepared = prepared.resized(width, height);
    }
    gaussian_blur(
        prepared.as_slice(),
        width as usize,
        height as usize,
        1,
        SEAM_KERNEL,
        SEAM_SIGMA,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient(width: u32, height: u32) -> Frame {
        Frame::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) * 3 % 256) as u8])
        })
    }

    fn unit_gain() -> Compositor {
        Compositor::new(&CompositorConfig {
            intensity_multiplier: 1.0,
        })
    }

    #[test]
    fn non_positive_intensity_is_passthrough() {
        let compositor = Compositor::new(&CompositorConfig::default());
        let frame = gradient(32, 24);
        let mask = Mask::background(32, 24);

        for intensity in [0.0, -1.0, -250.0, f32::NAN] {
            assert_eq!(compositor.composite(frame.clone(), &mask, intensity), frame);
        }
    }

    #[test]
    fn kernels_are_odd_and_above_tier_minimum() {
        for effective in 0..=400 {
            let plan = BlurPlan::for_intensity(effective);
            let minimums: &[u32] = match plan {
                BlurPlan::Light { .. } => &[3],
                BlurPlan::Medium { .. } => &[5, 7],
                BlurPlan::Heavy { .. } => &[7, 7, 5],
            };
            for (kernel, minimum) in plan.kernels().into_iter().zip(minimums) {
                assert_eq!(kernel % 2, 1, "even kernel at {effective}");
                assert!(kernel >= *minimum, "kernel {kernel} below {minimum} at {effective}");
            }
        }
    }

    #[test]
    fn tiers_switch_at_thresholds() {
        assert!(matches!(BlurPlan::for_intensity(15), BlurPlan::Light { kernel: 17 }));
        assert!(matches!(
            BlurPlan::for_intensity(16),
            BlurPlan::Medium { first: 11, second: 13 }
        ));
        assert!(matches!(BlurPlan::for_intensity(25), BlurPlan::Medium { .. }));
        assert!(matches!(BlurPlan::for_intensity(26), BlurPlan::Heavy { .. }));
    }

    #[test]
    fn effective_intensity_applies_gain_and_clamps() {
        assert_eq!(effective_intensity(10.0, 1.8), 18);
        assert_eq!(effective_intensity(40.0, 1.8), 72);
        assert_eq!(effective_intensity(-5.0, 1.8), 0);
        assert_eq!(effective_intensity(1e9, 1.0), 100);
        // Gain below one is raised to one
        assert_eq!(effective_intensity(20.0, 0.5), 20);
    }

    #[test]
    fn light_tier_on_white_frame_stays_white() {
        let compositor = unit_gain();
        assert!(matches!(compositor.plan(10.0), BlurPlan::Light { .. }));

        let frame = Frame::from_pixel(100, 100, Rgb([255, 255, 255]));
        let output = compositor.composite(frame.clone(), &Mask::background(100, 100), 10.0);
        assert_eq!(output, frame);
    }

    #[test]
    fn heavy_tier_keeps_exact_dimensions() {
        let compositor = Compositor::new(&CompositorConfig::default());
        assert!(matches!(compositor.plan(40.0), BlurPlan::Heavy { .. }));

        for (w, h) in [(100, 100), (101, 77), (3, 2)] {
            let frame = gradient(w, h);
            let output = compositor.composite(frame, &Mask::background(w, h), 40.0);
            assert_eq!(output.dimensions(), (w, h));
        }

        let white = Frame::from_pixel(64, 48, Rgb([255, 255, 255]));
        let output = compositor.composite(white, &Mask::background(64, 48), 40.0);
        assert!(output.pixels().all(|p| p.0.iter().all(|&v| v >= 250)));
    }

    #[test]
    fn background_mask_yields_fully_blurred_frame() {
        let compositor = Compositor::new(&CompositorConfig::default());
        let frame = gradient(48, 32);

        for intensity in [5.0, 12.0, 30.0] {
            let expected = compositor.blurred_background(&frame, intensity);
            let output = compositor.composite(frame.clone(), &Mask::background(48, 32), intensity);
            assert_eq!(output, expected);
            assert_ne!(output, frame);
        }
    }

    #[test]
    fn foreground_mask_preserves_frame() {
        let compositor = Compositor::new(&CompositorConfig::default());
        let frame = gradient(40, 30);

        let unit = Mask::filled(40, 30, 1.0);
        assert_eq!(compositor.composite(frame.clone(), &unit, 20.0), frame);

        // Byte-scaled and low-resolution masks are normalized and upsampled
        let bytes = Mask::filled(40, 30, 255.0);
        assert_eq!(compositor.composite(frame.clone(), &bytes, 20.0), frame);

        let coarse = Mask::filled(10, 10, 1.0);
        assert_eq!(compositor.composite(frame.clone(), &coarse, 20.0), frame);
    }

    #[test]
    fn half_mask_keeps_foreground_side_sharp() {
        let compositor = Compositor::new(&CompositorConfig::default());
        let frame = gradient(64, 16);
        let data: Vec<f32> = (0..64 * 16)
            .map(|i| if i % 64 < 32 { 1.0 } else { 0.0 })
            .collect();
        let mask = Mask::from_raw(64, 16, data).unwrap();

        let output = compositor.composite(frame.clone(), &mask, 30.0);
        let blurred = compositor.blurred_background(&frame, 30.0);
        assert_eq!(output.get_pixel(2, 8), frame.get_pixel(2, 8));
        assert_eq!(output.get_pixel(60, 8), blurred.get_pixel(60, 8));
    }
}
