//! Frame sources.
//!
//! - `CameraSource`: V4L2 camera (feature: ingest-v4l2) or a synthetic
//!   `stub://` camera for tests and bench runs
//! - `ReplaySource`: still images from a local directory, in name order
//!
//! Every source hands out frames already resized to the detector input size
//! when an output size is configured. Resizing happens here, once per frame,
//! so the detection pipeline only ever copies pixels into its input tensor.

pub mod camera;
mod normalize;
pub mod replay;

pub use camera::{CameraConfig, CameraSource};
pub use replay::{ReplayConfig, ReplaySource};

use crate::error::FrameSourceError;
use crate::frame::Frame;

/// A lazy, unbounded sequence of frames.
///
/// `next_frame` blocks until a frame is available. A source that fails to
/// connect can only be recovered by building a new one.
pub trait FrameSource {
    /// Human-readable identifier (device path, directory, ...).
    fn name(&self) -> &str;

    /// Acquire the underlying device. Must be called before `next_frame`.
    fn connect(&mut self) -> Result<(), FrameSourceError>;

    /// Block until the next frame is captured.
    fn next_frame(&mut self) -> Result<Frame, FrameSourceError>;

    fn is_healthy(&self) -> bool {
        true
    }

    fn frames_captured(&self) -> u64;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn connect(&mut self) -> Result<(), FrameSourceError> {
        (**self).connect()
    }

    fn next_frame(&mut self) -> Result<Frame, FrameSourceError> {
        (**self).next_frame()
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }

    fn frames_captured(&self) -> u64 {
        (**self).frames_captured()
    }
}
