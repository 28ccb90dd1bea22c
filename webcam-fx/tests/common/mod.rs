//! Test doubles standing in for the camera, the model and the loopback device.

#![allow(dead_code)]

use anyhow::{bail, Result};
use blurcam::capture::{CaptureSource, Frame};
use blurcam::config::EngineConfig;
use blurcam::output::OutputSink;
use blurcam::segmentation::{Mask, Quality, SegmentationModel};
use blurcam::{Backend, Engine};
use image::{Rgb, RgbImage};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const WIDTH: u32 = 32;
pub const HEIGHT: u32 = 24;

/// Which collaborator refuses to open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Nothing,
    Source,
    Model,
    Sink,
}

#[derive(Debug, Default)]
pub struct Counters {
    pub source_opens: AtomicUsize,
    pub source_releases: AtomicUsize,
    pub model_opens: AtomicUsize,
    pub model_releases: AtomicUsize,
    pub sink_opens: AtomicUsize,
    pub sink_releases: AtomicUsize,
    pub frames_emitted: AtomicUsize,
    pub fast_models: AtomicUsize,
    pub acquire_calls: AtomicUsize,
    pub source_failures: AtomicUsize,
    pub sink_failures: AtomicUsize,
    pub infer_calls: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        Self::get(&self.source_opens) + Self::get(&self.model_opens) + Self::get(&self.sink_opens)
    }

    pub fn releases(&self) -> usize {
        Self::get(&self.source_releases)
            + Self::get(&self.model_releases)
            + Self::get(&self.sink_releases)
    }
}

/// Misbehaviour injected into the mock collaborators
#[derive(Debug, Clone, Default)]
pub struct MockOptions {
    /// The first N acquires fail
    pub source_errors: usize,
    /// The first N emits fail
    pub sink_errors: usize,
    /// Every acquire blocks this long, like a stalled camera read
    pub acquire_delay: Option<Duration>,
    /// Infer call (1-based) that panics
    pub panic_on_infer: Option<usize>,
    /// Only one source may be open at a time
    pub exclusive: bool,
    /// The first N source opens block for `open_delay`
    pub slow_opens: usize,
    pub open_delay: Duration,
}

/// Backend whose collaborators only count what happens to them
pub struct MockBackend {
    pub counters: Arc<Counters>,
    pub fail_at: FailAt,
    options: MockOptions,
    device_held: Arc<AtomicBool>,
}

impl MockBackend {
    pub fn new(fail_at: FailAt) -> Self {
        Self::with_options(fail_at, MockOptions::default())
    }

    pub fn with_options(fail_at: FailAt, options: MockOptions) -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            fail_at,
            options,
            device_held: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Backend for MockBackend {
    fn open_source(&self) -> Result<Box<dyn CaptureSource>> {
        if self.fail_at == FailAt::Source {
            bail!("camera busy");
        }
        if self.options.exclusive && self.device_held.swap(true, Ordering::SeqCst) {
            bail!("device busy");
        }
        let opened_before = self.counters.source_opens.fetch_add(1, Ordering::SeqCst);
        if opened_before < self.options.slow_opens {
            std::thread::sleep(self.options.open_delay);
        }
        Ok(Box::new(MockSource {
            counters: Arc::clone(&self.counters),
            options: self.options.clone(),
            device_held: Arc::clone(&self.device_held),
            released: false,
            tick: 0,
        }))
    }

    fn open_model(&self, quality: Quality) -> Result<Box<dyn SegmentationModel>> {
        if self.fail_at == FailAt::Model {
            bail!("model file missing");
        }
        self.counters.model_opens.fetch_add(1, Ordering::SeqCst);
        if quality == Quality::Fast {
            self.counters.fast_models.fetch_add(1, Ordering::SeqCst);
        }
        Ok(Box::new(MockModel {
            counters: Arc::clone(&self.counters),
            quality,
            panic_on_infer: self.options.panic_on_infer,
            released: false,
        }))
    }

    fn open_sink(&self, source: (u32, u32)) -> Result<Box<dyn OutputSink>> {
        if self.fail_at == FailAt::Sink {
            bail!("loopback device missing");
        }
        self.counters.sink_opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSink {
            counters: Arc::clone(&self.counters),
            size: source,
            errors_left: self.options.sink_errors,
            released: false,
        }))
    }
}

struct MockSource {
    counters: Arc<Counters>,
    options: MockOptions,
    device_held: Arc<AtomicBool>,
    released: bool,
    tick: u32,
}

impl CaptureSource for MockSource {
    fn acquire(&mut self) -> Result<Option<Frame>> {
        let call = self.counters.acquire_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.options.acquire_delay {
            std::thread::sleep(delay);
        }
        if call < self.options.source_errors {
            self.counters.source_failures.fetch_add(1, Ordering::SeqCst);
            bail!("camera read failed");
        }

        self.tick = self.tick.wrapping_add(1);
        let shade = (self.tick % 200) as u8;
        Ok(Some(RgbImage::from_fn(WIDTH, HEIGHT, |x, _| {
            Rgb([shade, (x * 8) as u8, 128])
        })))
    }

    fn resolution(&self) -> (u32, u32) {
        (WIDTH, HEIGHT)
    }

    fn release(&mut self) -> Result<()> {
        if !self.released {
            self.released = true;
            self.device_held.store(false, Ordering::SeqCst);
            self.counters.source_releases.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

struct MockModel {
    counters: Arc<Counters>,
    quality: Quality,
    panic_on_infer: Option<usize>,
    released: bool,
}

impl SegmentationModel for MockModel {
    fn infer(&mut self, frame: &RgbImage) -> Result<Option<Mask>> {
        let call = self.counters.infer_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.panic_on_infer == Some(call) {
            panic!("inference blew up on call {call}");
        }

        // Left half is the person
        let (width, height) = (frame.width() / 4, frame.height() / 4);
        let data = (0..width * height)
            .map(|i| if i % width < width / 2 { 255.0 } else { 0.0 })
            .collect();
        Ok(Mask::from_raw(width, height, data))
    }

    fn quality(&self) -> Quality {
        self.quality
    }

    fn input_size(&self) -> (u32, u32) {
        (WIDTH / 4, HEIGHT / 4)
    }

    fn release(&mut self) -> Result<()> {
        if !self.released {
            self.released = true;
            self.counters.model_releases.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

struct MockSink {
    counters: Arc<Counters>,
    size: (u32, u32),
    errors_left: usize,
    released: bool,
}

impl OutputSink for MockSink {
    fn emit(&mut self, frame: &RgbImage) -> Result<()> {
        if self.errors_left > 0 {
            self.errors_left -= 1;
            self.counters.sink_failures.fetch_add(1, Ordering::SeqCst);
            bail!("loopback write failed");
        }
        assert_eq!(frame.dimensions(), self.size);
        self.counters.frames_emitted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        self.size
    }

    fn release(&mut self) -> Result<()> {
        if !self.released {
            self.released = true;
            self.counters.sink_releases.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Fast loop so tests do not wait on frame pacing
pub fn test_config() -> EngineConfig {
    EngineConfig {
        target_fps: 1000,
        ..EngineConfig::default()
    }
}

pub fn engine(fail_at: FailAt) -> (Engine, Arc<Counters>) {
    engine_with(fail_at, test_config(), MockOptions::default())
}

pub fn engine_with(
    fail_at: FailAt,
    config: EngineConfig,
    options: MockOptions,
) -> (Engine, Arc<Counters>) {
    let backend = MockBackend::with_options(fail_at, options);
    let counters = Arc::clone(&backend.counters);
    (Engine::new(config, Arc::new(backend)), counters)
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
