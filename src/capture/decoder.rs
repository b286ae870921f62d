//! Raw sensor frame → display-ready RGB image

use std::time::Instant;

use image::{GrayImage, Luma};
use thiserror::Error;
use tracing::{instrument, trace};
use yuv::{
    yuv_nv12_to_rgb, yuv_nv21_to_rgb, yuyv422_to_rgb, YuvBiPlanarImage, YuvConversionMode,
    YuvPackedImage, YuvRange, YuvStandardMatrix,
};
use zune_jpeg::zune_core::{colorspace::ColorSpace, options::DecoderOptions};
use zune_jpeg::JpegDecoder;

use super::frame::{PixelFormat, RawFrame, StreamKind};
use crate::display::NormalizedImage;

/// Frames smaller than this carry no usable picture.
pub const DEFAULT_MIN_FRAME_BYTES: usize = 1024;

/// Reference bit depth of depth sensors.
pub const DEPTH_BASELINE_BITS: u8 = 10;
/// Reference bit depth of infrared sensors.
pub const INFRARED_BASELINE_BITS: u8 = 8;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("unsupported {format} frame on the {stream} stream")]
    Unsupported {
        stream: StreamKind,
        format: PixelFormat,
    },

    #[error("{format} buffer too small: got {actual}, expected {expected}")]
    BufferTooSmall {
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },

    #[error("invalid frame dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("MJPEG decode failed: {0}")]
    Jpeg(String),

    #[error("{format} colour conversion failed: {reason}")]
    Yuv { format: PixelFormat, reason: String },
}

/// Stateless converter from sensor encodings to [`NormalizedImage`].
#[derive(Debug, Clone, Copy)]
pub struct PixelDecoder {
    min_frame_bytes: usize,
}

impl Default for PixelDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_FRAME_BYTES)
    }
}

impl PixelDecoder {
    pub fn new(min_frame_bytes: usize) -> Self {
        Self { min_frame_bytes }
    }

    /// Decode one frame.
    ///
    /// `Ok(None)` means the buffer was too small to hold a picture and the
    /// frame is skipped without a fault.
    #[instrument(level = "trace", skip(self, frame), fields(stream = %frame.meta.stream, format = %frame.meta.format))]
    pub fn decode(&self, frame: &RawFrame) -> Result<Option<NormalizedImage>, DecodeError> {
        if frame.len() < self.min_frame_bytes {
            trace!(len = frame.len(), "frame below minimum size, skipped");
            return Ok(None);
        }

        let start = Instant::now();
        let meta = &frame.meta;
        let (width, height) = (meta.width, meta.height);
        if width == 0 || height == 0 {
            return Err(DecodeError::InvalidDimensions { width, height });
        }
        let data = &frame.data[..];

        let image = match (meta.stream, meta.format) {
            (StreamKind::Color, PixelFormat::Mjpeg) => mjpeg_to_rgb(data, width, height)?,
            (StreamKind::Color, PixelFormat::Nv12 | PixelFormat::Nv21) => {
                semi_planar_to_rgb(data, width, height, meta.format)?
            }
            (StreamKind::Color, PixelFormat::Yuyv) => yuyv_to_rgb(data, width, height)?,
            (StreamKind::Color, PixelFormat::Rgb24) => rgb_like_to_rgb(data, width, height, false)?,
            (StreamKind::Color, PixelFormat::Bgr24) => rgb_like_to_rgb(data, width, height, true)?,
            (StreamKind::Depth | StreamKind::Infrared, PixelFormat::Y16 | PixelFormat::Yuyv) => {
                let scale = depth_scale(meta.stream, meta.bit_depth);
                let gray = scale_y16(data, width, height, scale, meta.format)?;
                NormalizedImage::from_gray(&gray)
            }
            (stream, format) => return Err(DecodeError::Unsupported { stream, format }),
        };

        metrics::histogram!("decode_time_us").record(start.elapsed().as_micros() as f64);
        Ok(Some(image))
    }
}

/// Factor mapping a sensor's declared bit depth onto the 8-bit display range.
///
/// A declared depth of zero means the device did not report one; the
/// baseline is assumed.
pub fn depth_scale(stream: StreamKind, bit_depth: u8) -> f64 {
    let baseline = match stream {
        StreamKind::Infrared => INFRARED_BASELINE_BITS,
        _ => DEPTH_BASELINE_BITS,
    };
    let bits = if bit_depth == 0 { baseline } else { bit_depth };
    1.0 / 2f64.powi(i32::from(bits) - i32::from(baseline))
}

fn ensure_len(format: PixelFormat, data: &[u8], expected: usize) -> Result<(), DecodeError> {
    if data.len() < expected {
        return Err(DecodeError::BufferTooSmall {
            format,
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

fn mjpeg_to_rgb(
    data: &[u8],
    expected_width: u32,
    expected_height: u32,
) -> Result<NormalizedImage, DecodeError> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGB);
    let mut decoder = JpegDecoder::new_with_options(data, options);
    let rgb = decoder
        .decode()
        .map_err(|err| DecodeError::Jpeg(format!("{err:?}")))?;

    let (width, height) = decoder
        .dimensions()
        .ok_or_else(|| DecodeError::Jpeg("missing image dimensions".to_string()))?;
    let (width, height) = (width as u32, height as u32);
    if (width, height) != (expected_width, expected_height) {
        return Err(DecodeError::InvalidDimensions { width, height });
    }

    NormalizedImage::from_raw(width, height, rgb).ok_or_else(|| {
        DecodeError::Jpeg(format!("decoded buffer does not match {width}x{height} RGB"))
    })
}

fn semi_planar_to_rgb(
    data: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<NormalizedImage, DecodeError> {
    let y_plane_len = width as usize * height as usize;
    let uv_stride = width.div_ceil(2) * 2;
    let uv_plane_len = uv_stride as usize * height.div_ceil(2) as usize;
    ensure_len(format, data, y_plane_len + uv_plane_len)?;

    let image = YuvBiPlanarImage {
        y_plane: &data[..y_plane_len],
        y_stride: width,
        uv_plane: &data[y_plane_len..y_plane_len + uv_plane_len],
        uv_stride,
        width,
        height,
    };

    let mut rgb = vec![0u8; y_plane_len * 3];
    let converted = match format {
        PixelFormat::Nv21 => yuv_nv21_to_rgb(
            &image,
            &mut rgb,
            width * 3,
            YuvRange::Limited,
            YuvStandardMatrix::Bt601,
            YuvConversionMode::Balanced,
        ),
        _ => yuv_nv12_to_rgb(
            &image,
            &mut rgb,
            width * 3,
            YuvRange::Limited,
            YuvStandardMatrix::Bt601,
            YuvConversionMode::Balanced,
        ),
    };
    converted.map_err(|err| DecodeError::Yuv {
        format,
        reason: format!("{err:?}"),
    })?;

    NormalizedImage::from_raw(width, height, rgb)
        .ok_or(DecodeError::InvalidDimensions { width, height })
}

fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Result<NormalizedImage, DecodeError> {
    let pixel_count = width as usize * height as usize;
    ensure_len(PixelFormat::Yuyv, data, pixel_count * 2)?;

    let packed = YuvPackedImage {
        yuy: &data[..pixel_count * 2],
        yuy_stride: width * 2,
        width,
        height,
    };

    let mut rgb = vec![0u8; pixel_count * 3];
    yuyv422_to_rgb(
        &packed,
        &mut rgb,
        width * 3,
        YuvRange::Limited,
        YuvStandardMatrix::Bt601,
    )
    .map_err(|err| DecodeError::Yuv {
        format: PixelFormat::Yuyv,
        reason: format!("{err:?}"),
    })?;

    NormalizedImage::from_raw(width, height, rgb)
        .ok_or(DecodeError::InvalidDimensions { width, height })
}

fn rgb_like_to_rgb(
    data: &[u8],
    width: u32,
    height: u32,
    swap_rb: bool,
) -> Result<NormalizedImage, DecodeError> {
    let format = if swap_rb {
        PixelFormat::Bgr24
    } else {
        PixelFormat::Rgb24
    };
    let expected_len = width as usize * height as usize * 3;
    ensure_len(format, data, expected_len)?;

    let mut rgb = data[..expected_len].to_vec();
    if swap_rb {
        for px in rgb.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
    }

    NormalizedImage::from_raw(width, height, rgb)
        .ok_or(DecodeError::InvalidDimensions { width, height })
}

/// Scale little-endian 16-bit samples to 8 bits: round, then saturate.
fn scale_y16(
    data: &[u8],
    width: u32,
    height: u32,
    scale: f64,
    format: PixelFormat,
) -> Result<GrayImage, DecodeError> {
    let pixel_count = width as usize * height as usize;
    ensure_len(format, data, pixel_count * 2)?;

    let mut gray = GrayImage::new(width, height);
    for (dst, sample) in gray.pixels_mut().zip(data.chunks_exact(2)) {
        let raw = u16::from_le_bytes([sample[0], sample[1]]);
        let value = (f64::from(raw) * scale).round().clamp(0.0, 255.0) as u8;
        *dst = Luma([value]);
    }
    Ok(gray)
}
