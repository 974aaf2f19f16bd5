use image::imageops::FilterType;
use image::{ImageFormat, RgbImage};

use crate::error::FrameSourceError;
use crate::frame::rgb_len;

#[cfg_attr(not(feature = "ingest-v4l2"), allow(dead_code))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    Nv12,
    Mjpeg,
}

/// Decoded RGB24 pixels with their actual dimensions.
pub(crate) struct RgbPixels {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[cfg_attr(not(feature = "ingest-v4l2"), allow(dead_code))]
pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<RgbPixels, FrameSourceError> {
    match format {
        PixelFormat::Rgb24 => {
            let expected = rgb_len(width, height).ok_or_else(|| {
                FrameSourceError::Decode("RGB frame dimensions overflow".to_string())
            })?;
            if pixels.len() != expected {
                return Err(FrameSourceError::Decode(format!(
                    "RGB frame length mismatch: expected {}, got {}",
                    expected,
                    pixels.len()
                )));
            }
            Ok(RgbPixels {
                data: pixels.to_vec(),
                width,
                height,
            })
        }
        PixelFormat::Nv12 => Ok(RgbPixels {
            data: nv12_to_rgb(pixels, width, height)?,
            width,
            height,
        }),
        PixelFormat::Mjpeg => {
            let decoded = image::load_from_memory_with_format(pixels, ImageFormat::Jpeg)
                .map_err(|err| FrameSourceError::Decode(format!("MJPG frame: {}", err)))?
                .to_rgb8();
            let (width, height) = decoded.dimensions();
            Ok(RgbPixels {
                data: decoded.into_raw(),
                width,
                height,
            })
        }
    }
}

#[cfg_attr(not(feature = "ingest-v4l2"), allow(dead_code))]
fn nv12_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameSourceError> {
    // Chroma is subsampled 2x2.
    if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
        return Err(FrameSourceError::Decode(format!(
            "NV12 frame must have even, non-zero dimensions, got {}x{}",
            width, height
        )));
    }
    let w = width as usize;
    let h = height as usize;
    let y_plane = w
        .checked_mul(h)
        .ok_or_else(|| FrameSourceError::Decode("NV12 frame dimensions overflow".to_string()))?;
    let expected = y_plane
        .checked_add(y_plane / 2)
        .ok_or_else(|| FrameSourceError::Decode("NV12 frame dimensions overflow".to_string()))?;
    if pixels.len() != expected {
        return Err(FrameSourceError::Decode(format!(
            "NV12 frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        )));
    }

    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let u = pixels[uv_index] as f32 - 128.0;
            let v = pixels[uv_index + 1] as f32 - 128.0;

            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;

            let offset = (j * w + i) * 3;
            rgb[offset] = clamp_to_u8(r);
            rgb[offset + 1] = clamp_to_u8(g);
            rgb[offset + 2] = clamp_to_u8(b);
        }
    }

    Ok(rgb)
}

#[cfg_attr(not(feature = "ingest-v4l2"), allow(dead_code))]
fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Resize packed RGB24 pixels to the detector input size.
///
/// Uses Lanczos3 so downscaled frames stay antialiased. Returns the input
/// unchanged when the size already matches.
pub(crate) fn fit_rgb(
    pixels: RgbPixels,
    target_width: u32,
    target_height: u32,
) -> Result<RgbPixels, FrameSourceError> {
    if pixels.width == target_width && pixels.height == target_height {
        return Ok(pixels);
    }
    let (width, height) = (pixels.width, pixels.height);
    let image = RgbImage::from_raw(width, height, pixels.data).ok_or_else(|| {
        FrameSourceError::Decode(format!("RGB buffer too small for {}x{}", width, height))
    })?;
    let resized = image::imageops::resize(&image, target_width, target_height, FilterType::Lanczos3);
    Ok(RgbPixels {
        data: resized.into_raw(),
        width: target_width,
        height: target_height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv12_conversion_produces_gray() -> Result<(), FrameSourceError> {
        let width = 2;
        let height = 2;
        let y_plane = vec![128u8; 4];
        let uv_plane = vec![128u8; 2];
        let nv12 = [y_plane, uv_plane].concat();

        let rgb = normalize_to_rgb(&nv12, width, height, PixelFormat::Nv12)?;
        assert_eq!(rgb.data, vec![128u8; 12]);

        Ok(())
    }

    #[test]
    fn nv12_rejects_odd_dimensions() {
        // 3x3 luma plus the 4 chroma bytes a truncated half-plane would carry.
        let nv12 = vec![128u8; 13];
        assert!(matches!(
            normalize_to_rgb(&nv12, 3, 3, PixelFormat::Nv12),
            Err(FrameSourceError::Decode(_))
        ));
        assert!(matches!(
            normalize_to_rgb(&[], 0, 2, PixelFormat::Nv12),
            Err(FrameSourceError::Decode(_))
        ));
    }

    #[test]
    fn rgb_pass_through_validates_length() -> Result<(), FrameSourceError> {
        let pixels = vec![1u8; 9];
        let rgb = normalize_to_rgb(&pixels, 1, 3, PixelFormat::Rgb24)?;
        assert_eq!(rgb.data, pixels);

        assert!(normalize_to_rgb(&pixels, 2, 3, PixelFormat::Rgb24).is_err());
        Ok(())
    }

    #[test]
    fn mjpeg_frames_decode_to_rgb() -> Result<(), FrameSourceError> {
        let source = RgbImage::from_pixel(4, 2, image::Rgb([200, 40, 40]));
        let mut jpeg = std::io::Cursor::new(Vec::new());
        source
            .write_to(&mut jpeg, ImageFormat::Jpeg)
            .expect("encode jpeg");

        let rgb = normalize_to_rgb(jpeg.get_ref(), 0, 0, PixelFormat::Mjpeg)?;
        assert_eq!((rgb.width, rgb.height), (4, 2));
        assert_eq!(rgb.data.len(), 4 * 2 * 3);
        Ok(())
    }

    #[test]
    fn fit_rgb_resizes_to_target() -> Result<(), FrameSourceError> {
        let pixels = RgbPixels {
            data: vec![90u8; 8 * 6 * 3],
            width: 8,
            height: 6,
        };
        let fitted = fit_rgb(pixels, 4, 4)?;
        assert_eq!((fitted.width, fitted.height), (4, 4));
        assert_eq!(fitted.data.len(), 4 * 4 * 3);
        // A flat image stays flat after resampling.
        assert!(fitted.data.iter().all(|&p| (89..=91).contains(&p)));
        Ok(())
    }
}
