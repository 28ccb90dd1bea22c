use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// FPS and grade are recomputed every this many frames
pub const STATS_INTERVAL: u64 = 30;

/// Coarse grade derived from the measured frame rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PerformanceGrade {
    A,
    B,
    C,
    D,
}

impl PerformanceGrade {
    pub fn from_fps(fps: f64) -> Self {
        if fps >= 25.0 {
            PerformanceGrade::A
        } else if fps >= 20.0 {
            PerformanceGrade::B
        } else if fps >= 15.0 {
            PerformanceGrade::C
        } else {
            PerformanceGrade::D
        }
    }
}

impl fmt::Display for PerformanceGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Pipeline statistics, written only by the processing loop
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStats {
    pub frames_processed: u64,
    pub last_iteration_latency_ms: f64,
    pub fps: f64,
    pub performance_grade: Option<PerformanceGrade>,
}

impl PipelineStats {
    /// Account for one emitted frame
    ///
    /// Returns true when FPS and grade were refreshed.
    pub fn record(&mut self, latency: Duration, target_fps: u32) -> bool {
        self.frames_processed += 1;
        self.last_iteration_latency_ms = latency.as_micros() as f64 / 1000.0;

        if self.frames_processed % STATS_INTERVAL != 0 {
            return false;
        }

        let target = target_fps.max(1) as f64;
        self.fps = if self.last_iteration_latency_ms > 0.0 {
            (1000.0 / self.last_iteration_latency_ms).min(target)
        } else {
            target
        };
        self.performance_grade = Some(PerformanceGrade::from_fps(self.fps));
        true
    }
}

/// Handle to the statistics shared with the control layer
#[derive(Debug, Clone, Default)]
pub struct SharedStats(Arc<RwLock<PipelineStats>>);

impl SharedStats {
    pub fn snapshot(&self) -> PipelineStats {
        self.0.read().clone()
    }

    pub fn reset(&self) {
        *self.0.write() = PipelineStats::default();
    }

    /// Record a frame and hand back the updated figures
    pub fn record(&self, latency: Duration, target_fps: u32) -> (PipelineStats, bool) {
        let mut stats = self.0.write();
        let refreshed = stats.record(latency, target_fps);
        (stats.clone(), refreshed)
    }
}
