//! Error taxonomy for the detection pipeline and control loop.
//!
//! Each collaborator gets its own error type so callers can decide which
//! failures are fatal. `PilotError` is what the control loop propagates.

use std::path::PathBuf;

use thiserror::Error;

/// The label file could not be read.
#[derive(Debug, Error)]
#[error("failed to read label file {}: {source}", path.display())]
pub struct LabelFileError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// The engine reported a class id that has no entry in the label table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("class id {0} has no label")]
pub struct UnknownClassError(pub u32);

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    #[error("unsupported input shape {shape:?} (expected [1, H, W, 3])")]
    InputShape { shape: Vec<usize> },

    #[error("model declares {actual} outputs, expected {expected}")]
    OutputArity { expected: usize, actual: usize },

    #[error("output tensor {index} is malformed: {reason}")]
    MalformedOutput { index: usize, reason: String },

    #[error("no tensor at index {0}")]
    MissingTensor(usize),

    #[error("frame size {width}x{height} does not match model input {expected_width}x{expected_height}")]
    FrameSize {
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },

    #[error("confidence threshold {0} is outside [0, 1]")]
    InvalidThreshold(f32),

    #[error("inference failed: {0}")]
    Invoke(String),
}

#[derive(Debug, Error)]
pub enum FrameSourceError {
    #[error("frame source {source_name} unavailable: {reason}")]
    Unavailable { source_name: String, reason: String },

    #[error("frame source not connected")]
    NotConnected,

    #[error("frame capture failed: {0}")]
    Capture(String),

    #[error("frame decode failed: {0}")]
    Decode(String),

    #[error("frame source exhausted")]
    Exhausted,
}

#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("actuator write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("actuator rejected command: {0}")]
    Rejected(String),
}

/// Anything that can end a control cycle.
#[derive(Debug, Error)]
pub enum PilotError {
    #[error(transparent)]
    Labels(#[from] LabelFileError),

    #[error(transparent)]
    UnknownClass(#[from] UnknownClassError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    FrameSource(#[from] FrameSourceError),

    #[error(transparent)]
    Actuator(#[from] ActuatorError),
}
