//! Still-image replay source.
//!
//! `ReplaySource` feeds `.jpg`, `.jpeg` and `.png` files from a local
//! directory through the same path as live frames, in file-name order. It is
//! meant for bench runs of a model against recorded scenes.

use std::path::{Path, PathBuf};

use super::normalize::{fit_rgb, RgbPixels};
use super::FrameSource;
use crate::error::FrameSourceError;
use crate::frame::Frame;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

#[derive(Clone, Debug)]
pub struct ReplayConfig {
    /// Directory holding the images.
    pub dir: PathBuf,
    /// Start over from the first image after the last one.
    pub looping: bool,
    /// Size frames are resized to before hand-off, usually the model input.
    pub output_size: Option<(u32, u32)>,
}

pub struct ReplaySource {
    config: ReplayConfig,
    name: String,
    files: Vec<PathBuf>,
    cursor: usize,
    frame_count: u64,
    connected: bool,
}

impl ReplaySource {
    pub fn new(config: ReplayConfig) -> Self {
        let name = config.dir.display().to_string();
        Self {
            config,
            name,
            files: Vec::new(),
            cursor: 0,
            frame_count: 0,
            connected: false,
        }
    }

    /// Images discovered by `connect`, in replay order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    fn unavailable(&self, reason: impl std::fmt::Display) -> FrameSourceError {
        FrameSourceError::Unavailable {
            source_name: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

impl FrameSource for ReplaySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&mut self) -> Result<(), FrameSourceError> {
        let entries = std::fs::read_dir(&self.config.dir)
            .map_err(|err| self.unavailable(format!("read directory: {}", err)))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|err| self.unavailable(format!("read directory entry: {}", err)))?
                .path();
            if path.is_file() && has_image_extension(&path) {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(self.unavailable("no .jpg/.jpeg/.png images found"));
        }

        log::info!(
            "ReplaySource: connected to {} ({} images, looping={})",
            self.name,
            files.len(),
            self.config.looping
        );
        self.files = files;
        self.cursor = 0;
        self.connected = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame, FrameSourceError> {
        if !self.connected {
            return Err(FrameSourceError::NotConnected);
        }
        if self.cursor >= self.files.len() {
            if !self.config.looping {
                return Err(FrameSourceError::Exhausted);
            }
            self.cursor = 0;
        }

        let path = &self.files[self.cursor];
        self.cursor += 1;

        let decoded = image::open(path)
            .map_err(|err| FrameSourceError::Decode(format!("{}: {}", path.display(), err)))?
            .to_rgb8();
        let (width, height) = decoded.dimensions();
        let mut pixels = RgbPixels {
            data: decoded.into_raw(),
            width,
            height,
        };
        if let Some((target_width, target_height)) = self.config.output_size {
            pixels = fit_rgb(pixels, target_width, target_height)?;
        }

        self.frame_count += 1;
        log::debug!("ReplaySource: frame {} from {}", self.frame_count, path.display());
        Frame::from_rgb(pixels.data, pixels.width, pixels.height, self.frame_count)
    }

    fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}
