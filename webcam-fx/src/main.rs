use anyhow::{Context, Result};
use blurcam::config::{
    CaptureConfig, CompositorConfig, EngineConfig, ModelConfig, OutputConfig, PipelineSettings,
    SmoothingConfig,
};
use blurcam::control::{self, Command};
use blurcam::segmentation::Quality;
use blurcam::Engine;
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = "/dev/video10")]
    output_device: PathBuf,

    /// Capture resolution width
    #[arg(long, default_value_t = 1280)]
    capture_width: u32,

    /// Capture resolution height
    #[arg(long, default_value_t = 720)]
    capture_height: u32,

    /// Output resolution width (defaults to the capture width)
    #[arg(long)]
    output_width: Option<u32>,

    /// Output resolution height (defaults to the capture height)
    #[arg(long)]
    output_height: Option<u32>,

    /// Target frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Path to the segmentation model (ONNX file)
    #[arg(long)]
    model: PathBuf,

    /// Lighter model used for the fast preset
    #[arg(long)]
    fast_model: Option<PathBuf>,

    /// Model input size for the accurate preset, WIDTHxHEIGHT
    #[arg(long, default_value = "512x288", value_parser = parse_size)]
    accurate_input: (u32, u32),

    /// Model input size for the fast preset, WIDTHxHEIGHT
    #[arg(long, default_value = "256x144", value_parser = parse_size)]
    fast_input: (u32, u32),

    /// ONNX Runtime intra-op threads
    #[arg(long, default_value_t = 4)]
    threads: usize,

    /// Initial blur strength, 0-100
    #[arg(short, long, default_value_t = 15.0)]
    blur: f32,

    /// Gain applied to the blur strength before picking a blur tier
    #[arg(long, default_value_t = blurcam::effects::DEFAULT_INTENSITY_MULTIPLIER)]
    intensity_multiplier: f32,

    /// Segmentation preset: fast or accurate
    #[arg(short, long, default_value = "accurate")]
    quality: Quality,

    /// Disable edge smoothing of the mask
    #[arg(long)]
    no_edge_smoothing: bool,

    /// Disable temporal smoothing of the mask
    #[arg(long)]
    no_temporal_smoothing: bool,

    /// Edge smoothing kernel size
    #[arg(long, default_value_t = 3)]
    edge_kernel_size: u32,

    /// Number of masks kept for temporal smoothing
    #[arg(long, default_value_t = 3)]
    history: usize,

    /// Run a bilateral filter over the output
    #[arg(long)]
    noise_reduction: bool,

    /// Do not flip the camera image horizontally
    #[arg(long)]
    no_mirror: bool,

    /// Wait for a `start` command instead of starting right away
    #[arg(long)]
    idle: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{value}'"))?;
    let width = width
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid width: {e}"))?;
    let height = height
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid height: {e}"))?;
    if width == 0 || height == 0 {
        return Err("size must be non-zero".to_string());
    }
    Ok((width, height))
}

impl Args {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            capture: CaptureConfig {
                device_index: self.input_device,
                width: self.capture_width,
                height: self.capture_height,
                fps: self.fps,
                mirror: !self.no_mirror,
            },
            model: ModelConfig {
                path: self.model.clone(),
                fast_path: self.fast_model.clone(),
                accurate_input: self.accurate_input,
                fast_input: self.fast_input,
                intra_threads: self.threads,
            },
            output: OutputConfig {
                device: self.output_device.clone(),
                width: self.output_width,
                height: self.output_height,
            },
            smoothing: SmoothingConfig {
                history_capacity: self.history,
                edge_kernel_size: self.edge_kernel_size,
                ..SmoothingConfig::default()
            },
            compositor: CompositorConfig {
                intensity_multiplier: self.intensity_multiplier,
            },
            target_fps: self.fps,
            settings: PipelineSettings {
                blur_intensity: self.blur,
                quality: self.quality,
                edge_smoothing: !self.no_edge_smoothing,
                temporal_smoothing: !self.no_temporal_smoothing,
                noise_reduction: self.noise_reduction,
                ..PipelineSettings::default()
            },
            ..EngineConfig::default()
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    // Replies go to stdout, logs to stderr
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    tracing::info!("blurcam starting");
    tracing::info!(
        "Capture: device {} at {}x{}",
        args.input_device,
        args.capture_width,
        args.capture_height
    );
    tracing::info!("Output: {}", args.output_device.display());
    tracing::info!("Target FPS: {}", args.fps);

    let engine = Arc::new(Engine::with_devices(args.engine_config()));

    let handler_engine = Arc::clone(&engine);
    ctrlc::set_handler(move || {
        tracing::info!("Interrupted, shutting down");
        if let Err(e) = handler_engine.stop() {
            tracing::warn!("{}", e);
        }
        process::exit(130);
    })
    .context("Failed to install Ctrl-C handler")?;

    if args.idle {
        tracing::info!("Idle until a start command arrives");
    } else {
        engine.start().context("Failed to start pipeline")?;
    }

    tracing::info!("{}", control::HELP);
    run_console(&engine)?;

    if let Err(e) = engine.stop() {
        tracing::warn!("{}", e);
    }
    tracing::info!("blurcam stopped");
    Ok(())
}

/// Read commands from stdin until `quit` or end of input
fn run_console(engine: &Engine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line.context("Failed to read command")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (reply, quit) = match line.parse::<Command>() {
            Ok(command) => (
                control::execute(engine, &command),
                command == Command::Quit,
            ),
            Err(message) => (control::parse_error(&message), false),
        };

        writeln!(stdout, "{reply}").context("Failed to write reply")?;
        stdout.flush().context("Failed to write reply")?;

        if quit {
            break;
        }
    }

    Ok(())
}
