//! Captured frames.
//!
//! - `Frame`: one RGB24 image as produced by a frame source, already at the
//!   size the detector expects.
//! - `FrameInfo`: the pixel-free part of a frame, cheap to copy into reports.

use std::time::Instant;

use crate::error::FrameSourceError;

/// One packed RGB24 frame (`width * height * 3` bytes, row-major).
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Per-source sequence number, starting at 1.
    pub sequence: u64,
    captured_at: Instant,
}

impl Frame {
    /// Wrap packed RGB24 pixels, validating the buffer length.
    pub fn from_rgb(
        data: Vec<u8>,
        width: u32,
        height: u32,
        sequence: u64,
    ) -> Result<Self, FrameSourceError> {
        let expected = rgb_len(width, height).ok_or_else(|| {
            FrameSourceError::Capture(format!("frame dimensions {}x{} overflow", width, height))
        })?;
        if data.len() != expected {
            return Err(FrameSourceError::Capture(format!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            sequence,
            captured_at: Instant::now(),
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Milliseconds since capture.
    pub fn age_ms(&self) -> u128 {
        self.captured_at.elapsed().as_millis()
    }

    pub fn info(&self) -> FrameInfo {
        FrameInfo {
            width: self.width,
            height: self.height,
            sequence: self.sequence,
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    pub sequence: u64,
}

pub(crate) fn rgb_len(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
}
