use super::{CaptureConfig, CaptureSource, Frame};
use anyhow::{bail, Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError};
use image::imageops;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Longest wait for the camera to open and start streaming
const OPEN_TIMEOUT: Duration = Duration::from_secs(10);
/// Longest wait for the capture thread to leave a read on release
const RELEASE_TIMEOUT: Duration = Duration::from_secs(1);
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Webcam read on its own thread
///
/// `Camera::frame` blocks until the driver delivers, possibly forever on a
/// stalled device. The capture thread owns the camera and keeps the newest
/// decoded frame in a slot; `acquire` takes whatever is there and never waits.
pub struct WebcamCapture {
    latest: Arc<Mutex<Option<Frame>>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    // Disconnects when the capture thread exits
    done: Receiver<()>,
    width: u32,
    height: u32,
}

impl WebcamCapture {
    pub fn new(config: &CaptureConfig) -> Result<Self> {
        tracing::info!(
            "Initializing webcam {} at {}x{}@{}",
            config.device_index,
            config.width,
            config.height,
            config.fps
        );

        let latest = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = bounded::<Result<(u32, u32)>>(1);
        let (done_tx, done_rx) = bounded::<()>(1);

        let thread = {
            let config = config.clone();
            let latest = Arc::clone(&latest);
            let running = Arc::clone(&running);

            thread::Builder::new()
                .name("blurcam-capture".to_string())
                .spawn(move || {
                    let _done = done_tx;
                    let mut camera = match open_camera(&config) {
                        Ok(camera) => camera,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };

                    let resolution = camera.resolution();
                    let _ = ready_tx.send(Ok((resolution.width(), resolution.height())));

                    capture_loop(&mut camera, config.mirror, &latest, &running);

                    if let Err(e) = camera.stop_stream() {
                        tracing::warn!("Failed to stop camera stream: {}", e);
                    }
                    tracing::info!("Webcam stream stopped");
                })
                .context("Failed to spawn capture thread")?
        };

        let (width, height) = match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(size)) => size,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(RecvTimeoutError::Timeout) => {
                // The thread stops the stream itself if the open ever completes
                running.store(false, Ordering::Release);
                bail!(
                    "Camera {} did not open within {:?}",
                    config.device_index,
                    OPEN_TIMEOUT
                );
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = thread.join();
                bail!("Capture thread exited while opening the camera");
            }
        };

        tracing::info!("Webcam initialized at {}x{}", width, height);

        Ok(Self {
            latest,
            running,
            thread: Some(thread),
            done: done_rx,
            width,
            height,
        })
    }
}

fn open_camera(config: &CaptureConfig) -> Result<Camera> {
    let index = CameraIndex::Index(config.device_index);
    let wanted = CameraFormat::new(
        Resolution::new(config.width, config.height),
        FrameFormat::MJPEG,
        config.fps,
    );
    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(wanted));

    let mut camera = Camera::new(index, requested).context("Failed to open camera")?;

    camera
        .open_stream()
        .context("Failed to open camera stream")?;

    Ok(camera)
}

fn read_frame(camera: &mut Camera, mirror: bool) -> Result<Option<Frame>> {
    let buffer = camera.frame().context("Failed to capture frame")?;

    let mut decoded = buffer
        .decode_image::<RgbFormat>()
        .context("Failed to decode frame")?;

    if decoded.width() == 0 || decoded.height() == 0 {
        return Ok(None);
    }

    if mirror {
        imageops::flip_horizontal_in_place(&mut decoded);
    }

    Ok(Some(decoded))
}

fn capture_loop(
    camera: &mut Camera,
    mirror: bool,
    latest: &Mutex<Option<Frame>>,
    running: &AtomicBool,
) {
    while running.load(Ordering::Acquire) {
        match read_frame(camera, mirror) {
            // Older unread frames are dropped
            Ok(Some(frame)) => *latest.lock() = Some(frame),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("{:#}", e);
                thread::sleep(READ_ERROR_BACKOFF);
            }
        }
    }
}

impl CaptureSource for WebcamCapture {
    fn acquire(&mut self) -> Result<Option<Frame>> {
        if let Some(frame) = self.latest.lock().take() {
            return Ok(Some(frame));
        }

        match self.done.try_recv() {
            Err(TryRecvError::Disconnected) if self.running.load(Ordering::Acquire) => {
                bail!("Capture thread exited unexpectedly")
            }
            _ => Ok(None),
        }
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn release(&mut self) -> Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        self.running.store(false, Ordering::Release);

        match self.done.recv_timeout(RELEASE_TIMEOUT) {
            Err(RecvTimeoutError::Timeout) => bail!(
                "Capture thread still blocked in a camera read after {:?}; \
                 it stops the stream once the read returns",
                RELEASE_TIMEOUT
            ),
            _ => {
                if thread.join().is_err() {
                    bail!("Capture thread panicked");
                }
                Ok(())
            }
        }
    }
}

impl Drop for WebcamCapture {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!("{:#}", e);
        }
    }
}
