use super::kernel::{gaussian_blur, odd_at_least};
use crate::segmentation::Mask;
use std::collections::VecDeque;

/// Recency-weighted schedule, oldest first. Hand tuned; reacts within a frame
/// or two when someone enters or leaves the picture.
pub const DEFAULT_TEMPORAL_WEIGHTS: [f32; 3] = [0.1, 0.3, 0.6];

const EDGE_SIGMA: f32 = 1.0;
const MIN_EDGE_KERNEL: u32 = 3;

/// Mask smoothing settings
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothingConfig {
    /// Masks kept for temporal smoothing
    pub history_capacity: usize,
    /// Edge blur kernel; even values are bumped to the next odd, minimum 3
    pub edge_kernel_size: u32,
    /// Weights applied to the most recent masks, oldest first
    pub temporal_weights: Vec<f32>,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_TEMPORAL_WEIGHTS.len(),
            edge_kernel_size: MIN_EDGE_KERNEL,
            temporal_weights: DEFAULT_TEMPORAL_WEIGHTS.to_vec(),
        }
    }
}

/// Bounded FIFO of the most recent masks
#[derive(Debug, Clone)]
pub struct MaskHistory {
    capacity: usize,
    entries: VecDeque<Mask>,
}

impl MaskHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a mask, evicting the oldest beyond capacity
    ///
    /// A mask of different dimensions invalidates everything buffered.
    pub fn push(&mut self, mask: Mask) {
        if self
            .entries
            .back()
            .is_some_and(|last| last.dimensions() != mask.dimensions())
        {
            self.entries.clear();
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(mask);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Mask> {
        self.entries.iter()
    }

    pub fn newest(&self) -> Option<&Mask> {
        self.entries.back()
    }

    pub fn oldest(&self) -> Option<&Mask> {
        self.entries.front()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Temporal and edge smoothing of raw masks
pub struct MaskSmoother {
    config: SmoothingConfig,
    history: MaskHistory,
}

impl MaskSmoother {
    pub fn new(config: SmoothingConfig) -> Self {
        let history = MaskHistory::new(config.history_capacity);
        Self { config, history }
    }

    pub fn history(&self) -> &MaskHistory {
        &self.history
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Smooth a mask already at frame resolution
    pub fn smooth(&mut self, raw: Mask, temporal: bool, edge: bool) -> Mask {
        let _span = tracing::debug_span!("smooth_mask").entered();

        let mask = if temporal {
            self.temporal(raw)
        } else {
            raw
        };

        if edge {
            self.soften_edges(&mask)
        } else {
            mask
        }
    }

    /// Weighted moving average over the buffered masks
    ///
    /// Uses the trailing part of the weight schedule when fewer masks are
    /// buffered than there are weights, without renormalizing.
    fn temporal(&mut self, raw: Mask) -> Mask {
        self.history.push(raw.clone());
        if self.history.len() < 2 {
            return raw;
        }

        let weights = &self.config.temporal_weights;
        let used = self.history.len().min(weights.len());
        if used == 0 {
            return raw;
        }
        let weights = &weights[weights.len() - used..];
        let recent = self.history.iter().skip(self.history.len() - used);

        let mut blended = vec![0.0f32; raw.len()];
        for (entry, &weight) in recent.zip(weights) {
            for (acc, value) in blended.iter_mut().zip(entry.as_slice()) {
                *acc += value * weight;
            }
        }

        Mask::from_raw(raw.width(), raw.height(), blended).unwrap_or(raw)
    }

    fn soften_edges(&self, mask: &Mask) -> Mask {
        let ksize = odd_at_least(self.config.edge_kernel_size as i64, MIN_EDGE_KERNEL);
        let (width, height) = mask.dimensions();
        let blurred = gaussian_blur(
            mask.as_slice(),
            width as usize,
            height as usize,
            1,
            ksize,
            EDGE_SIGMA,
        );
        Mask::from_raw(width, height, blurred).unwrap_or_else(|| mask.clone())
    }
}
