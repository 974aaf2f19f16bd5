use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::control::{
    ControlPolicy, UnknownClassPolicy, DEFAULT_FORWARD_SPEED, DEFAULT_THRESHOLD,
    DEFAULT_WATCHED_CLASS,
};
use crate::detect::backends::open_engine;
use crate::detect::{DetectionPipeline, ElementType, InferenceEngine};
use crate::ingest::{CameraConfig, CameraSource, FrameSource, ReplayConfig, ReplaySource};
use crate::labels::LabelTable;

const DEFAULT_MODEL_PATH: &str = "/tmp/detect.onnx";
const DEFAULT_LABELS_PATH: &str = "/tmp/coco_labels.txt";
const DEFAULT_MODEL_INPUT: u32 = 300;
const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_ACTUATOR: &str = "log";

#[derive(Debug, Deserialize, Default)]
struct PilotConfigFile {
    model: Option<ModelConfigFile>,
    camera: Option<CameraConfigFile>,
    control: Option<ControlConfigFile>,
    actuator: Option<ActuatorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    path: Option<PathBuf>,
    labels: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    input_type: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    replay_dir: Option<PathBuf>,
    replay_loop: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct ControlConfigFile {
    watched_class: Option<String>,
    threshold: Option<f32>,
    forward_speed: Option<u8>,
    unknown_class: Option<UnknownClassPolicy>,
}

#[derive(Debug, Deserialize, Default)]
struct ActuatorConfigFile {
    target: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PilotConfig {
    pub model: ModelSettings,
    pub camera: CameraSettings,
    pub control: ControlPolicy,
    /// `log` for a dry run, otherwise a device or file path written with the
    /// line protocol.
    pub actuator: String,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub path: PathBuf,
    pub labels_path: PathBuf,
    pub input_width: u32,
    pub input_height: u32,
    pub input_type: ElementType,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub device: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    /// Replay still images from this directory instead of opening the camera.
    pub replay_dir: Option<PathBuf>,
    /// Restart the replay from the first image instead of ending the run.
    pub replay_loop: bool,
}

impl CameraSettings {
    /// Camera source configuration producing frames of `output_size`.
    pub fn camera_config(&self, output_size: (u32, u32)) -> CameraConfig {
        CameraConfig {
            device: self.device.clone(),
            target_fps: self.target_fps,
            width: self.width,
            height: self.height,
            output_size: Some(output_size),
        }
    }

    /// Build and connect the configured frame source.
    pub fn open_source(&self, output_size: (u32, u32)) -> Result<Box<dyn FrameSource>> {
        let mut source: Box<dyn FrameSource> = match &self.replay_dir {
            Some(dir) => Box::new(ReplaySource::new(ReplayConfig {
                dir: dir.clone(),
                looping: self.replay_loop,
                output_size: Some(output_size),
            })),
            None => Box::new(CameraSource::new(self.camera_config(output_size))?),
        };
        source
            .connect()
            .with_context(|| format!("failed to connect frame source {}", source.name()))?;
        Ok(source)
    }
}

impl ModelSettings {
    /// Load the label table and the engine and wire them into a pipeline.
    pub fn open_pipeline(&self) -> Result<DetectionPipeline<Box<dyn InferenceEngine>>> {
        let labels = LabelTable::load(&self.labels_path)?;
        let engine = open_engine(
            &self.path,
            self.input_width,
            self.input_height,
            self.input_type,
        )?;
        let pipeline = DetectionPipeline::new(engine, labels)
            .with_context(|| format!("model {} is not a usable detector", self.path.display()))?;
        Ok(pipeline)
    }
}

impl PilotConfig {
    /// Load from `$WATCHSTOP_CONFIG` (if set), then environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("WATCHSTOP_CONFIG")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Load from an explicit config file (JSON, or TOML by extension), then
    /// environment overrides.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        let file_cfg = match config_path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PilotConfigFile) -> Result<Self> {
        let model_file = file.model.unwrap_or_default();
        let input_type = match model_file.input_type.as_deref() {
            Some(raw) => parse_element_type(raw)?,
            None => ElementType::U8,
        };
        let model = ModelSettings {
            path: model_file
                .path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            labels_path: model_file
                .labels
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LABELS_PATH)),
            input_width: model_file.input_width.unwrap_or(DEFAULT_MODEL_INPUT),
            input_height: model_file.input_height.unwrap_or(DEFAULT_MODEL_INPUT),
            input_type,
        };

        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraSettings {
            device: camera_file
                .device
                .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
            target_fps: camera_file.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            width: camera_file.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: camera_file.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            replay_dir: camera_file.replay_dir,
            replay_loop: camera_file.replay_loop.unwrap_or(false),
        };

        let control_file = file.control.unwrap_or_default();
        let control = ControlPolicy {
            watched_class: control_file
                .watched_class
                .unwrap_or_else(|| DEFAULT_WATCHED_CLASS.to_string()),
            threshold: control_file.threshold.unwrap_or(DEFAULT_THRESHOLD),
            forward_speed: control_file.forward_speed.unwrap_or(DEFAULT_FORWARD_SPEED),
            unknown_class: control_file.unknown_class.unwrap_or_default(),
        };

        let actuator = file
            .actuator
            .and_then(|actuator| actuator.target)
            .unwrap_or_else(|| DEFAULT_ACTUATOR.to_string());

        Ok(Self {
            model,
            camera,
            control,
            actuator,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("WATCHSTOP_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.model.path = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("WATCHSTOP_LABELS_PATH") {
            if !path.trim().is_empty() {
                self.model.labels_path = PathBuf::from(path);
            }
        }
        if let Ok(class) = std::env::var("WATCHSTOP_WATCHED_CLASS") {
            if !class.trim().is_empty() {
                self.control.watched_class = class.trim().to_string();
            }
        }
        if let Ok(threshold) = std::env::var("WATCHSTOP_THRESHOLD") {
            self.control.threshold = threshold
                .trim()
                .parse()
                .map_err(|_| anyhow!("WATCHSTOP_THRESHOLD must be a number between 0 and 1"))?;
        }
        if let Ok(speed) = std::env::var("WATCHSTOP_FORWARD_SPEED") {
            self.control.forward_speed = speed.trim().parse().map_err(|_| {
                anyhow!("WATCHSTOP_FORWARD_SPEED must be an integer percentage")
            })?;
        }
        if let Ok(device) = std::env::var("WATCHSTOP_CAMERA_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        if let Ok(target) = std::env::var("WATCHSTOP_ACTUATOR") {
            if !target.trim().is_empty() {
                self.actuator = target;
            }
        }
        Ok(())
    }

    /// Check value ranges. Binaries call this again after applying CLI flags.
    pub fn validate(&mut self) -> Result<()> {
        self.control.watched_class = self.control.watched_class.trim().to_string();
        if self.control.watched_class.is_empty() {
            return Err(anyhow!("watched class must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.control.threshold) {
            return Err(anyhow!(
                "threshold must be within [0, 1], got {}",
                self.control.threshold
            ));
        }
        if !(1..=100).contains(&self.control.forward_speed) {
            return Err(anyhow!(
                "forward speed must be within 1..=100, got {}",
                self.control.forward_speed
            ));
        }
        if self.model.input_width == 0 || self.model.input_height == 0 {
            return Err(anyhow!("model input size must be non-zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera resolution must be non-zero"));
        }
        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera frame rate must be greater than zero"));
        }
        if self.actuator.trim().is_empty() {
            return Err(anyhow!("actuator target must not be empty"));
        }
        Ok(())
    }
}

/// Parse a model input type: `uint8`/`u8` or `float32`/`f32`.
pub fn parse_element_type(raw: &str) -> Result<ElementType> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "uint8" | "u8" => Ok(ElementType::U8),
        "float32" | "f32" => Ok(ElementType::F32),
        other => Err(anyhow!(
            "unsupported model input type '{}' (expected uint8 or float32)",
            other
        )),
    }
}

fn read_config_file(path: &Path) -> Result<PilotConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let mut cfg = PilotConfig::from_file(PilotConfigFile::default()).expect("defaults");
        cfg.validate().expect("valid defaults");
        assert_eq!(cfg.model.path, PathBuf::from(DEFAULT_MODEL_PATH));
        assert_eq!((cfg.model.input_width, cfg.model.input_height), (300, 300));
        assert_eq!(cfg.model.input_type, ElementType::U8);
        assert_eq!(cfg.camera.device, "/dev/video0");
        assert_eq!(cfg.control, ControlPolicy::default());
        assert_eq!(cfg.actuator, "log");
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut cfg = PilotConfig::from_file(PilotConfigFile::default()).expect("defaults");
        cfg.control.threshold = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = PilotConfig::from_file(PilotConfigFile::default()).expect("defaults");
        cfg.control.forward_speed = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = PilotConfig::from_file(PilotConfigFile::default()).expect("defaults");
        cfg.control.watched_class = "   ".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = PilotConfig::from_file(PilotConfigFile::default()).expect("defaults");
        cfg.camera.target_fps = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn element_type_names() {
        assert_eq!(parse_element_type("uint8").unwrap(), ElementType::U8);
        assert_eq!(parse_element_type("Float32").unwrap(), ElementType::F32);
        assert!(parse_element_type("int8").is_err());
    }

    #[test]
    fn toml_sections_parse() {
        let file: PilotConfigFile = toml::from_str(
            r#"
            [control]
            watched_class = "person"
            unknown_class = "fatal"

            [camera]
            replay_dir = "/data/scenes"
            replay_loop = true
            "#,
        )
        .expect("toml");
        let cfg = PilotConfig::from_file(file).expect("config");
        assert_eq!(cfg.control.watched_class, "person");
        assert_eq!(cfg.control.unknown_class, UnknownClassPolicy::Fatal);
        assert_eq!(cfg.camera.replay_dir, Some(PathBuf::from("/data/scenes")));
        assert!(cfg.camera.replay_loop);
    }
}
