//! Mask smoothing, background blur compositing and noise reduction.

mod compositor;
mod denoise;
pub mod kernel;
mod smoother;

pub use compositor::{
    clamp_intensity, effective_intensity, BlurPlan, Compositor, CompositorConfig,
    DEFAULT_INTENSITY_MULTIPLIER, LIGHT_TIER_MAX, MAX_BLUR_INTENSITY, MEDIUM_TIER_MAX,
};
pub use denoise::{bilateral_filter, reduce_noise};
pub use smoother::{MaskHistory, MaskSmoother, SmoothingConfig, DEFAULT_TEMPORAL_WEIGHTS};
