//! Line-oriented control console: one command per line, one JSON reply per line.

use crate::engine::{Engine, StartOutcome, StopOutcome};
use crate::segmentation::Quality;
use serde_json::{json, Value};
use std::str::FromStr;

pub const HELP: &str = "commands: start | stop | restart | blur <strength> [mode] | \
quality <fast|accurate> [smoothing] | smoothing <edge on|off> <temporal on|off> | \
noise <on|off> | status | health | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Stop,
    Restart,
    Blur { strength: f32, mode: String },
    Quality { quality: Quality, smoothing: f32 },
    Smoothing { edge: bool, temporal: bool },
    Noise(bool),
    Status,
    Health,
    Help,
    Quit,
}

fn parse_switch(word: Option<&str>) -> Result<bool, String> {
    match word.map(str::to_ascii_lowercase).as_deref() {
        Some("on" | "true" | "1" | "yes") => Ok(true),
        Some("off" | "false" | "0" | "no") => Ok(false),
        Some(other) => Err(format!("expected on/off, got '{other}'")),
        None => Err("expected on/off".to_string()),
    }
}

fn parse_number(word: Option<&str>, what: &str) -> Result<f32, String> {
    let word = word.ok_or_else(|| format!("missing {what}"))?;
    word.parse::<f32>()
        .map_err(|_| format!("invalid {what} '{word}'"))
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words
            .next()
            .ok_or_else(|| "empty command".to_string())?
            .to_ascii_lowercase();

        let command = match name.as_str() {
            "start" => Command::Start,
            "stop" => Command::Stop,
            "restart" => Command::Restart,
            "blur" => Command::Blur {
                strength: parse_number(words.next(), "blur strength")?,
                mode: words.next().unwrap_or_default().to_string(),
            },
            "quality" | "ai" => {
                let quality = words
                    .next()
                    .ok_or_else(|| "missing quality".to_string())?
                    .parse::<Quality>()?;
                let smoothing = match words.next() {
                    Some(word) => parse_number(Some(word), "smoothing")?,
                    None => 0.5,
                };
                Command::Quality { quality, smoothing }
            }
            "smoothing" => Command::Smoothing {
                edge: parse_switch(words.next())?,
                temporal: parse_switch(words.next())?,
            },
            "noise" => Command::Noise(parse_switch(words.next())?),
            "status" => Command::Status,
            "health" => Command::Health,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(format!("unknown command '{other}'")),
        };

        Ok(command)
    }
}

fn start_reply(engine: &Engine) -> Value {
    match engine.start() {
        Ok(StartOutcome::Started) => json!({ "status": "success", "detail": "pipeline running" }),
        Ok(StartOutcome::AlreadyRunning) => {
            json!({ "status": "already_running", "detail": "pipeline already running" })
        }
        Err(e) => json!({ "status": "error", "detail": e.to_string() }),
    }
}

fn stop_reply(engine: &Engine) -> Value {
    match engine.stop() {
        Ok(StopOutcome::Stopped) => json!({ "status": "stopped" }),
        Ok(StopOutcome::AlreadyStopped) => json!({ "status": "already_stopped" }),
        Err(e) => json!({ "status": "error", "detail": e.to_string() }),
    }
}

/// Run a command against the engine and build its reply
pub fn execute(engine: &Engine, command: &Command) -> Value {
    match command {
        Command::Start => start_reply(engine),
        Command::Stop | Command::Quit => stop_reply(engine),
        Command::Restart => match engine.stop() {
            Ok(_) => start_reply(engine),
            Err(e) => json!({ "status": "error", "detail": e.to_string() }),
        },
        Command::Blur { strength, mode } => {
            let ack = engine.update_blur(*strength, mode);
            json!({ "success": true, "blurStrength": ack.blur_strength, "mode": ack.mode })
        }
        Command::Quality { quality, smoothing } => {
            let ack = engine.update_quality(*quality, *smoothing);
            json!({
                "success": true,
                "quality": ack.quality,
                "smoothingHint": ack.smoothing_hint,
                "modelReload": ack.model_reload,
            })
        }
        Command::Smoothing { edge, temporal } => {
            engine.update_smoothing(*edge, *temporal);
            json!({ "success": true, "edgeSmoothing": edge, "temporalSmoothing": temporal })
        }
        Command::Noise(enabled) => {
            engine.update_noise_reduction(*enabled);
            json!({ "success": true, "noiseReduction": enabled })
        }
        Command::Status => serde_json::to_value(engine.status())
            .unwrap_or_else(|e| json!({ "success": false, "error": e.to_string() })),
        Command::Health => json!({ "status": "healthy", "state": engine.state() }),
        Command::Help => json!({ "help": HELP }),
    }
}

/// Reply for a line that did not parse
pub fn parse_error(message: &str) -> Value {
    json!({ "success": false, "error": message, "help": HELP })
}
