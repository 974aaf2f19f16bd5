//! watchstopd - reactive stop controller daemon
//!
//! This daemon:
//! 1. Loads configuration (file, environment, then command-line flags)
//! 2. Loads the label table and the detection model
//! 3. Opens the camera (or a still-image replay directory)
//! 4. Commands the actuator to stop, then drives forward until the watched
//!    object class is in view
//! 5. Stops the actuator on SIGINT, SIGTERM or SIGHUP, on errors, and when a
//!    replay runs out

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use watchstop::actuate::open_actuator;
use watchstop::config::{parse_element_type, PilotConfig};
use watchstop::{ControlLoop, UnknownClassPolicy};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "WATCHSTOP_CONFIG")]
    config: Option<PathBuf>,
    /// Detection model path, or stub://<name> for a model that never detects.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Label file path.
    #[arg(long)]
    labels: Option<PathBuf>,
    /// Model input element type: uint8 or float32.
    #[arg(long)]
    input_type: Option<String>,
    /// Object class name that makes the vehicle stop.
    #[arg(long)]
    watched_class: Option<String>,
    /// Minimum detection score in [0, 1].
    #[arg(long)]
    threshold: Option<f32>,
    /// Forward speed in percent (1-100).
    #[arg(long)]
    speed: Option<u8>,
    /// Camera device path, or stub://<name> for synthetic frames.
    #[arg(long)]
    camera: Option<String>,
    /// Replay still images from this directory instead of the camera.
    #[arg(long)]
    replay: Option<PathBuf>,
    /// Restart the replay from the first image when it runs out.
    #[arg(long)]
    replay_loop: bool,
    /// Actuator target: "log" for a dry run, or a device path.
    #[arg(long)]
    actuator: Option<String>,
    /// Fail when the model reports a class id missing from the label file.
    #[arg(long)]
    strict_labels: bool,
}

impl Args {
    fn apply(self, cfg: &mut PilotConfig) -> Result<()> {
        if let Some(model) = self.model {
            cfg.model.path = model;
        }
        if let Some(labels) = self.labels {
            cfg.model.labels_path = labels;
        }
        if let Some(input_type) = self.input_type {
            cfg.model.input_type = parse_element_type(&input_type)?;
        }
        if let Some(class) = self.watched_class {
            cfg.control.watched_class = class;
        }
        if let Some(threshold) = self.threshold {
            cfg.control.threshold = threshold;
        }
        if let Some(speed) = self.speed {
            cfg.control.forward_speed = speed;
        }
        if let Some(camera) = self.camera {
            cfg.camera.device = camera;
        }
        if self.replay.is_some() {
            cfg.camera.replay_dir = self.replay;
        }
        if self.replay_loop {
            cfg.camera.replay_loop = true;
        }
        if let Some(actuator) = self.actuator {
            cfg.actuator = actuator;
        }
        if self.strict_labels {
            cfg.control.unknown_class = UnknownClassPolicy::Fatal;
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = PilotConfig::load_from(args.config.as_deref())?;
    args.apply(&mut cfg)?;
    cfg.validate()?;

    log::info!("watchstopd {} starting", env!("CARGO_PKG_VERSION"));
    log::info!(
        "model={}, labels={}, camera={}, actuator={}",
        cfg.model.path.display(),
        cfg.model.labels_path.display(),
        cfg.camera
            .replay_dir
            .as_ref()
            .map(|dir| dir.display().to_string())
            .unwrap_or_else(|| cfg.camera.device.clone()),
        cfg.actuator
    );

    let pipeline = cfg.model.open_pipeline()?;
    let source = cfg.camera.open_source(pipeline.input_size())?;
    let actuator = open_actuator(&cfg.actuator)
        .with_context(|| format!("failed to open actuator {}", cfg.actuator))?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("error setting signal handler")?;

    let mut control = ControlLoop::new(source, pipeline, cfg.control.clone());
    let summary = control.run(actuator, &shutdown)?;

    log::info!(
        "watchstopd stopped: {} cycles, {} stop commands, {} forward commands",
        summary.cycles,
        summary.stop_commands,
        summary.forward_commands
    );
    Ok(())
}
