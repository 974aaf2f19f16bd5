//! Camera frame source.
//!
//! `CameraSource` captures from a local V4L2 device node (e.g. /dev/video0)
//! when built with the `ingest-v4l2` feature, or synthesizes frames for
//! `stub://` device paths. Either way frames are normalized to RGB24 and
//! resized to the configured output size before being handed out.

use std::time::{Duration, Instant};

use super::normalize::{fit_rgb, RgbPixels};
use super::FrameSource;
use crate::error::FrameSourceError;
use crate::frame::Frame;

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0") or "stub://<name>".
    pub device: String,
    /// Capture frame rate. Zero leaves the device default and disables
    /// pacing of synthetic frames.
    pub target_fps: u32,
    /// Preferred capture width.
    pub width: u32,
    /// Preferred capture height.
    pub height: u32,
    /// Size frames are resized to before hand-off, usually the model input.
    pub output_size: Option<(u32, u32)>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 30,
            width: 640,
            height: 480,
            output_size: None,
        }
    }
}

pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "ingest-v4l2")]
    Device(v4l2::DeviceCamera),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self, FrameSourceError> {
        if config.width == 0 || config.height == 0 {
            return Err(FrameSourceError::Unavailable {
                source_name: config.device,
                reason: "capture size must be non-zero".to_string(),
            });
        }
        if config.device.starts_with("stub://") {
            return Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticCamera::new(config)),
            });
        }
        #[cfg(feature = "ingest-v4l2")]
        {
            Ok(Self {
                backend: CameraBackend::Device(v4l2::DeviceCamera::new(config)),
            })
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            Err(FrameSourceError::Unavailable {
                source_name: config.device,
                reason: "camera capture requires the ingest-v4l2 feature".to_string(),
            })
        }
    }
}

impl FrameSource for CameraSource {
    fn name(&self) -> &str {
        match &self.backend {
            CameraBackend::Synthetic(camera) => &camera.config.device,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.device(),
        }
    }

    fn connect(&mut self) -> Result<(), FrameSourceError> {
        match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.connect(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Frame, FrameSourceError> {
        match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.next_frame(),
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(_) => true,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.is_healthy(),
        }
    }

    fn frames_captured(&self) -> u64 {
        match &self.backend {
            CameraBackend::Synthetic(camera) => camera.frame_count,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.frame_count(),
        }
    }
}

fn into_frame(
    pixels: RgbPixels,
    output_size: Option<(u32, u32)>,
    sequence: u64,
) -> Result<Frame, FrameSourceError> {
    let pixels = match output_size {
        Some((width, height)) => fit_rgb(pixels, width, height)?,
        None => pixels,
    };
    Frame::from_rgb(pixels.data, pixels.width, pixels.height, sequence)
}

// ----------------------------------------------------------------------------
// Synthetic camera (stub://)
// ----------------------------------------------------------------------------

struct SyntheticCamera {
    config: CameraConfig,
    connected: bool,
    frame_count: u64,
    /// Changes every 50 frames to simulate the scene moving.
    scene_state: u8,
    last_frame_at: Option<Instant>,
}

impl SyntheticCamera {
    fn new(config: CameraConfig) -> Self {
        Self {
            config,
            connected: false,
            frame_count: 0,
            scene_state: 0,
            last_frame_at: None,
        }
    }

    fn connect(&mut self) -> Result<(), FrameSourceError> {
        self.connected = true;
        log::info!(
            "CameraSource: connected to {} (synthetic {}x{})",
            self.config.device,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame, FrameSourceError> {
        if !self.connected {
            return Err(FrameSourceError::NotConnected);
        }
        self.pace();
        self.frame_count += 1;

        let pixels = RgbPixels {
            data: self.generate_synthetic_pixels(),
            width: self.config.width,
            height: self.config.height,
        };
        into_frame(pixels, self.config.output_size, self.frame_count)
    }

    fn pace(&mut self) {
        if self.config.target_fps > 0 {
            let interval = Duration::from_secs(1) / self.config.target_fps;
            if let Some(last) = self.last_frame_at {
                let elapsed = last.elapsed();
                if elapsed < interval {
                    std::thread::sleep(interval - elapsed);
                }
            }
        }
        self.last_frame_at = Some(Instant::now());
    }

    fn generate_synthetic_pixels(&mut self) -> Vec<u8> {
        let pixel_count = (self.config.width as usize) * (self.config.height as usize) * 3;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }
}

// ----------------------------------------------------------------------------
// V4L2 device camera
// ----------------------------------------------------------------------------

#[cfg(feature = "ingest-v4l2")]
mod v4l2 {
    use std::time::{Duration, Instant};

    use ouroboros::self_referencing;

    use super::{into_frame, CameraConfig};
    use crate::error::FrameSourceError;
    use crate::frame::Frame;
    use crate::ingest::normalize::{normalize_to_rgb, PixelFormat};

    pub(super) struct DeviceCamera {
        config: CameraConfig,
        state: Option<DeviceState>,
        frame_count: u64,
        last_frame_at: Option<Instant>,
        last_error: Option<String>,
        active_width: u32,
        active_height: u32,
        format: PixelFormat,
    }

    #[self_referencing]
    struct DeviceState {
        device: v4l::Device,
        #[borrows(mut device)]
        #[covariant]
        stream: v4l::prelude::MmapStream<'this, v4l::Device>,
    }

    impl DeviceCamera {
        pub(super) fn new(config: CameraConfig) -> Self {
            Self {
                active_width: config.width,
                active_height: config.height,
                config,
                state: None,
                frame_count: 0,
                last_frame_at: None,
                last_error: None,
                format: PixelFormat::Rgb24,
            }
        }

        pub(super) fn device(&self) -> &str {
            &self.config.device
        }

        pub(super) fn frame_count(&self) -> u64 {
            self.frame_count
        }

        fn unavailable(&self, reason: impl std::fmt::Display) -> FrameSourceError {
            FrameSourceError::Unavailable {
                source_name: self.config.device.clone(),
                reason: reason.to_string(),
            }
        }

        pub(super) fn connect(&mut self) -> Result<(), FrameSourceError> {
            use v4l::buffer::Type;
            use v4l::video::Capture;

            let mut device = v4l::Device::with_path(&self.config.device)
                .map_err(|err| self.unavailable(format!("open device: {}", err)))?;
            let mut format = device
                .format()
                .map_err(|err| self.unavailable(format!("read format: {}", err)))?;
            format.width = self.config.width;
            format.height = self.config.height;
            format.fourcc = v4l::FourCC::new(b"RGB3");

            let format = match device.set_format(&format) {
                Ok(format) => format,
                Err(err) => {
                    log::warn!(
                        "CameraSource: failed to set format on {}: {}",
                        self.config.device,
                        err
                    );
                    device.format().map_err(|err| {
                        self.unavailable(format!("read format after set failure: {}", err))
                    })?
                }
            };

            self.format = match &format.fourcc.repr {
                b"RGB3" => PixelFormat::Rgb24,
                b"NV12" => PixelFormat::Nv12,
                b"MJPG" => PixelFormat::Mjpeg,
                other => {
                    return Err(self.unavailable(format!(
                        "unsupported pixel format {}",
                        String::from_utf8_lossy(other)
                    )))
                }
            };

            if self.config.target_fps > 0 {
                let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
                if let Err(err) = device.set_params(&params) {
                    log::warn!(
                        "CameraSource: failed to set fps on {}: {}",
                        self.config.device,
                        err
                    );
                }
            }

            self.active_width = format.width;
            self.active_height = format.height;
            self.last_error = None;

            let built = DeviceStateTryBuilder {
                device,
                stream_builder: |device| {
                    v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                },
            }
            .try_build();
            let state = match built {
                Ok(state) => state,
                Err(err) => {
                    self.last_error = Some(err.to_string());
                    return Err(self.unavailable(format!("create buffer stream: {}", err)));
                }
            };
            self.state = Some(state);

            log::info!(
                "CameraSource: connected to {} ({}x{} {:?})",
                self.config.device,
                self.active_width,
                self.active_height,
                self.format
            );
            Ok(())
        }

        pub(super) fn next_frame(&mut self) -> Result<Frame, FrameSourceError> {
            use v4l::io::traits::CaptureStream;

            let state = self.state.as_mut().ok_or(FrameSourceError::NotConnected)?;
            let captured = state.with_mut(|fields| {
                fields.stream.next().map(|(buf, meta)| {
                    let used = (meta.bytesused as usize).min(buf.len());
                    let used = if used == 0 { buf.len() } else { used };
                    buf[..used].to_vec()
                })
            });
            let bytes = captured.map_err(|err| {
                self.last_error = Some(err.to_string());
                FrameSourceError::Capture(err.to_string())
            })?;

            self.frame_count += 1;
            self.last_frame_at = Some(Instant::now());

            let pixels =
                normalize_to_rgb(&bytes, self.active_width, self.active_height, self.format)?;
            into_frame(pixels, self.config.output_size, self.frame_count)
        }

        pub(super) fn is_healthy(&self) -> bool {
            if self.last_error.is_some() {
                return false;
            }
            let Some(last_frame_at) = self.last_frame_at else {
                return true;
            };
            last_frame_at.elapsed() <= self.health_grace()
        }

        fn health_grace(&self) -> Duration {
            let base_ms = if self.config.target_fps == 0 {
                2_000
            } else {
                (1000 / self.config.target_fps).saturating_mul(6)
            };
            Duration::from_millis(base_ms.max(2_000) as u64)
        }
    }
}
