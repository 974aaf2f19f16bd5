//! watchstop
//!
//! Camera-driven reactive stop controller: every frame goes through an object
//! detector, and the vehicle is commanded to stop while a watched object class
//! is in view, and to drive forward otherwise.
//!
//! # Architecture
//!
//! One synchronous loop, one frame in flight:
//!
//! 1. **Sense**: a `FrameSource` blocks until the next RGB frame, already
//!    resized to the detector input.
//! 2. **Detect**: `DetectionPipeline` copies the frame into its input tensor,
//!    runs the `InferenceEngine` and decodes the four SSD outputs.
//! 3. **Decide**: `ControlLoop` maps class ids through the `LabelTable` and
//!    triggers on the watched class name.
//! 4. **Act**: `ActuatorSession` re-issues the command and guarantees a final
//!    stop however the loop ends.
//!
//! # Module Structure
//!
//! - `labels`: label file parsing (`LabelTable`)
//! - `frame`: owned RGB frames
//! - `ingest`: frame sources (camera, still-image replay)
//! - `detect`: inference engine trait, backends and the detection pipeline
//! - `actuate`: actuator trait, drivers and the stop-on-exit session
//! - `control`: the control loop and its policy
//! - `config`: daemon configuration (file + environment)
//! - `error`: typed library errors

pub mod actuate;
pub mod config;
pub mod control;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod labels;

pub use actuate::{ActuationState, Actuator, ActuatorSession, Command};
pub use control::{
    ControlLoop, ControlPolicy, CycleReport, LoopEnd, LoopSummary, UnknownClassPolicy,
};
pub use detect::{BoundingBox, Detection, DetectionBatch, DetectionPipeline, InferenceEngine};
pub use error::{
    ActuatorError, EngineError, FrameSourceError, LabelFileError, PilotError, UnknownClassError,
};
pub use frame::{Frame, FrameInfo};
pub use ingest::FrameSource;
pub use labels::LabelTable;
