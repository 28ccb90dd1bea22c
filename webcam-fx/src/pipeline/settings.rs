use crate::effects::clamp_intensity;
use crate::segmentation::Quality;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

pub const DEFAULT_BLUR_INTENSITY: f32 = 15.0;
pub const DEFAULT_BLUR_MODE: &str = "gaussian";

/// Settings the control layer may change while the pipeline runs
///
/// The loop takes a snapshot once per iteration, so a change lands on the
/// next frame at the latest.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSettings {
    pub blur_intensity: f32,
    pub blur_mode: String,
    pub quality: Quality,
    pub smoothing_hint: f32,
    pub edge_smoothing: bool,
    pub temporal_smoothing: bool,
    pub noise_reduction: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            blur_intensity: DEFAULT_BLUR_INTENSITY,
            blur_mode: DEFAULT_BLUR_MODE.to_string(),
            quality: Quality::Accurate,
            smoothing_hint: 0.5,
            edge_smoothing: true,
            temporal_smoothing: true,
            noise_reduction: false,
        }
    }
}

impl PipelineSettings {
    /// Clamp every numeric field into its valid range
    pub fn sanitized(mut self) -> Self {
        self.blur_intensity = clamp_intensity(self.blur_intensity);
        self.smoothing_hint = clamp_hint(self.smoothing_hint);
        self
    }
}

fn clamp_hint(hint: f32) -> f32 {
    if hint.is_nan() {
        0.0
    } else {
        hint.clamp(0.0, 1.0)
    }
}

/// Handle to the live settings shared between control layer and loop
#[derive(Debug, Clone, Default)]
pub struct SharedSettings(Arc<RwLock<PipelineSettings>>);

impl SharedSettings {
    pub fn new(initial: PipelineSettings) -> Self {
        Self(Arc::new(RwLock::new(initial.sanitized())))
    }

    pub fn snapshot(&self) -> PipelineSettings {
        self.0.read().clone()
    }

    /// Returns the intensity actually applied
    pub fn set_blur(&self, intensity: f32, mode: &str) -> f32 {
        let applied = clamp_intensity(intensity);
        let mut settings = self.0.write();
        settings.blur_intensity = applied;
        if !mode.trim().is_empty() {
            settings.blur_mode = mode.trim().to_string();
        }
        applied
    }

    /// Returns whether the quality preset changed
    pub fn set_quality(&self, quality: Quality, smoothing_hint: f32) -> bool {
        let mut settings = self.0.write();
        let changed = settings.quality != quality;
        settings.quality = quality;
        settings.smoothing_hint = clamp_hint(smoothing_hint);
        changed
    }

    pub fn set_smoothing(&self, edge: bool, temporal: bool) {
        let mut settings = self.0.write();
        settings.edge_smoothing = edge;
        settings.temporal_smoothing = temporal;
    }

    pub fn set_noise_reduction(&self, enabled: bool) {
        self.0.write().noise_reduction = enabled;
    }
}
