//! recognize - detection-only mode
//!
//! Runs the detection pipeline on every frame and prints the recognized
//! objects as `[("label", score), ...]`, one line per frame. Nothing is
//! actuated.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use watchstop::config::PilotConfig;
use watchstop::{DetectionPipeline, FrameSourceError, InferenceEngine};

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
    /// Minimum detection score in [0, 1].
    #[arg(long)]
    threshold: Option<f32>,
    /// Camera device path, or stub://<name> for synthetic frames.
    #[arg(long)]
    camera: Option<String>,
    /// Replay still images from this directory instead of the camera.
    #[arg(long)]
    replay: Option<PathBuf>,
    /// Restart the replay from the first image when it runs out.
    #[arg(long)]
    replay_loop: bool,
    /// Stop after this many frames.
    #[arg(long)]
    frames: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = PilotConfig::load_from(args.config.as_deref())?;
    if let Some(model) = args.model {
        cfg.model.path = model;
    }
    if let Some(labels) = args.labels {
        cfg.model.labels_path = labels;
    }
    if let Some(threshold) = args.threshold {
        cfg.control.threshold = threshold;
    }
    if let Some(camera) = args.camera {
        cfg.camera.device = camera;
    }
    if args.replay.is_some() {
        cfg.camera.replay_dir = args.replay;
    }
    if args.replay_loop {
        cfg.camera.replay_loop = true;
    }
    cfg.validate()?;

    let mut pipeline = cfg.model.open_pipeline()?;
    let mut source = cfg.camera.open_source(pipeline.input_size())?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("error setting signal handler")?;

    let mut processed = 0u64;
    while !shutdown.load(Ordering::SeqCst) {
        if args.frames.is_some_and(|limit| processed >= limit) {
            break;
        }
        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(FrameSourceError::Exhausted) => break,
            Err(err) => return Err(err).context("frame capture failed"),
        };
        let detections = pipeline.run(&frame, cfg.control.threshold)?;
        println!("{}", render(&pipeline, &detections));
        processed += 1;
    }

    log::info!("recognized {} frames", processed);
    Ok(())
}

fn render<E: InferenceEngine>(
    pipeline: &DetectionPipeline<E>,
    detections: &[watchstop::Detection],
) -> String {
    let entries: Vec<String> = detections
        .iter()
        .map(|detection| match pipeline.label_for(detection) {
            Ok(label) => format!("({:?}, {:.3})", label, detection.score),
            Err(_) => format!("(\"class {}\", {:.3})", detection.class_id, detection.score),
        })
        .collect();
    format!("[{}]", entries.join(", "))
}
