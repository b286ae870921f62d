//! Paced test-pattern device producing colour/depth pairs

use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, RgbImage};
use tracing::{debug, info, instrument};

use super::decoder::depth_scale;
use super::device::{DeviceError, DeviceErrorKind, DeviceService};
use super::frame::{FrameMetadata, FramePair, PixelFormat, RawFrame, StreamKind};
use crate::DeviceConfig;

const JPEG_QUALITY: u8 = 85;

/// Display value of the near disc, inside the default tracker band.
const SUBJECT_DISPLAY: f64 = 60.0;
/// Background ramp in display values, beyond the default tracker band.
const BACKGROUND_NEAR: u8 = 160;
const BACKGROUND_FAR: u8 = 250;

/// Generates a drifting colour gradient and a depth ramp with a near disc
/// standing in for a person, at the configured frame rate.
pub struct SyntheticDevice {
    config: DeviceConfig,
    sequence: u64,
    period: Duration,
    started: Instant,
    next_frame: Instant,
}

impl SyntheticDevice {
    pub fn new(config: DeviceConfig) -> Result<Self, DeviceError> {
        info!("Initializing synthetic capture: {:?}", config);
        let args = format!(
            "{}x{}@{} color={} depth={}",
            config.width, config.height, config.fps, config.color_format, config.depth_format
        );

        if config.width == 0 || config.height == 0 || config.fps == 0 {
            return Err(DeviceError::new(
                "SyntheticDevice::new",
                args,
                "resolution and frame rate must be non-zero",
                DeviceErrorKind::InvalidValue,
            ));
        }
        let needs_even = matches!(
            config.color_format,
            PixelFormat::Yuyv | PixelFormat::Nv12 | PixelFormat::Nv21
        );
        if needs_even && (config.width % 2 != 0 || config.height % 2 != 0) {
            return Err(DeviceError::new(
                "SyntheticDevice::new",
                args,
                "YUV colour formats need even dimensions",
                DeviceErrorKind::InvalidValue,
            ));
        }
        if matches!(config.color_format, PixelFormat::Y16)
            || !matches!(config.depth_format, PixelFormat::Y16 | PixelFormat::Yuyv)
        {
            return Err(DeviceError::new(
                "SyntheticDevice::new",
                args,
                "stream profile not available",
                DeviceErrorKind::Unsupported,
            ));
        }
        if !(1..=16).contains(&config.depth_bit_depth) {
            return Err(DeviceError::new(
                "SyntheticDevice::new",
                args,
                "depth bit depth must be within 1..=16",
                DeviceErrorKind::InvalidValue,
            ));
        }

        let now = Instant::now();
        Ok(Self {
            period: Duration::from_secs(1) / config.fps,
            config,
            sequence: 0,
            started: now,
            next_frame: now,
        })
    }

    fn metadata(&self, stream: StreamKind, format: PixelFormat, bit_depth: u8) -> FrameMetadata {
        FrameMetadata {
            sequence: self.sequence,
            stream,
            format,
            width: self.config.width,
            height: self.config.height,
            bit_depth,
            device_timestamp: Some(self.started.elapsed()),
            system_timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default(),
        }
    }

    fn color_frame(&self) -> Result<RawFrame, DeviceError> {
        let (w, h) = (self.config.width, self.config.height);
        let shift = (self.sequence * 4 % u64::from(w)) as u32;
        let blue = (self.sequence * 4 % 256) as u8;
        let rgb = RgbImage::from_fn(w, h, |x, y| {
            image::Rgb([
                ((x + shift) % w * 255 / w) as u8,
                (y * 255 / h) as u8,
                blue,
            ])
        });

        let format = self.config.color_format;
        let data = match format {
            PixelFormat::Rgb24 => rgb.into_raw(),
            PixelFormat::Bgr24 => {
                let mut bgr = rgb.into_raw();
                for px in bgr.chunks_exact_mut(3) {
                    px.swap(0, 2);
                }
                bgr
            }
            PixelFormat::Yuyv => rgb_to_yuyv(&rgb),
            PixelFormat::Nv12 => rgb_to_semi_planar(&rgb, false),
            PixelFormat::Nv21 => rgb_to_semi_planar(&rgb, true),
            PixelFormat::Mjpeg => {
                let mut jpeg = Vec::new();
                JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
                    .encode(rgb.as_raw(), w, h, ExtendedColorType::Rgb8)
                    .map_err(|e| {
                        DeviceError::new(
                            "SyntheticDevice::color_frame",
                            format!("sequence={}", self.sequence),
                            e.to_string(),
                            DeviceErrorKind::Unknown,
                        )
                    })?;
                jpeg
            }
            PixelFormat::Y16 => {
                return Err(DeviceError::new(
                    "SyntheticDevice::color_frame",
                    format!("format={format}"),
                    "stream profile not available",
                    DeviceErrorKind::Unsupported,
                ))
            }
        };

        Ok(RawFrame::new(
            Bytes::from(data),
            self.metadata(StreamKind::Color, format, 8),
        ))
    }

    fn depth_frame(&self) -> RawFrame {
        let (w, h) = (self.config.width, self.config.height);
        let bits = self.config.depth_bit_depth;
        let max = f64::from((1u32 << bits) - 1);
        // Samples are chosen in display units so the decoded frame lands
        // where the depth tracker looks, whatever the declared bit depth.
        let scale = depth_scale(StreamKind::Depth, bits);
        let raw = |display: f64| (display / scale).round().min(max) as u16;
        let subject = raw(SUBJECT_DISPLAY);

        let radius = (w.min(h) / 4).max(1) as i64;
        let span = i64::from(w) + 2 * radius;
        let cx = (self.sequence as i64 * 3) % span - radius;
        let cy = i64::from(h) / 2;
        let ramp_step = f64::from(BACKGROUND_FAR - BACKGROUND_NEAR) / f64::from(w.max(2) - 1);

        let mut data = Vec::with_capacity((w * h * 2) as usize);
        for y in 0..i64::from(h) {
            for x in 0..i64::from(w) {
                let (dx, dy) = (x - cx, y - cy);
                let sample = if dx * dx + dy * dy <= radius * radius {
                    subject
                } else {
                    raw(f64::from(BACKGROUND_NEAR) + ramp_step * x as f64)
                };
                data.extend_from_slice(&sample.to_le_bytes());
            }
        }

        RawFrame::new(
            Bytes::from(data),
            self.metadata(StreamKind::Depth, self.config.depth_format, bits),
        )
    }
}

impl DeviceService for SyntheticDevice {
    #[instrument(level = "trace", skip(self))]
    fn blocking_acquire(&mut self, timeout: Duration) -> Result<Option<FramePair>, DeviceError> {
        let now = Instant::now();
        if self.next_frame > now + timeout {
            thread::sleep(timeout);
            return Ok(None);
        }
        thread::sleep(self.next_frame.saturating_duration_since(now));

        self.sequence += 1;
        let pair = FramePair::new(self.color_frame()?, self.depth_frame());

        self.next_frame += self.period;
        let now = Instant::now();
        if self.next_frame < now {
            debug!(sequence = self.sequence, "synthetic device behind schedule");
            self.next_frame = now + self.period;
        }
        Ok(Some(pair))
    }
}

fn rgb_to_yuv([r, g, b]: [u8; 3]) -> (u8, u8, u8) {
    let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
    let y = 16.0 + (65.481 * r + 128.553 * g + 24.966 * b) / 255.0;
    let u = 128.0 + (-37.797 * r - 74.203 * g + 112.0 * b) / 255.0;
    let v = 128.0 + (112.0 * r - 93.786 * g - 18.214 * b) / 255.0;
    (y.round() as u8, u.round() as u8, v.round() as u8)
}

fn rgb_to_yuyv(rgb: &RgbImage) -> Vec<u8> {
    let mut out = Vec::with_capacity(rgb.as_raw().len() / 3 * 2);
    for row in rgb.rows() {
        let row: Vec<[u8; 3]> = row.map(|p| p.0).collect();
        for pair in row.chunks_exact(2) {
            let (y0, u, v) = rgb_to_yuv(pair[0]);
            let (y1, _, _) = rgb_to_yuv(pair[1]);
            out.extend_from_slice(&[y0, u, y1, v]);
        }
    }
    out
}

fn rgb_to_semi_planar(rgb: &RgbImage, vu_order: bool) -> Vec<u8> {
    let (w, h) = rgb.dimensions();
    let mut y_plane = Vec::with_capacity((w * h) as usize);
    let mut uv_plane = Vec::with_capacity((w * h / 2) as usize);
    for y in 0..h {
        for x in 0..w {
            let (luma, u, v) = rgb_to_yuv(rgb.get_pixel(x, y).0);
            y_plane.push(luma);
            if y % 2 == 0 && x % 2 == 0 {
                if vu_order {
                    uv_plane.extend_from_slice(&[v, u]);
                } else {
                    uv_plane.extend_from_slice(&[u, v]);
                }
            }
        }
    }
    y_plane.extend(uv_plane);
    y_plane
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PixelDecoder;
    use crate::detect::{DepthBandTracker, ObjectTracker};
    use crate::Config;

    fn config(color_format: PixelFormat) -> DeviceConfig {
        DeviceConfig {
            width: 64,
            height: 48,
            fps: 200,
            color_format,
            depth_format: PixelFormat::Y16,
            depth_bit_depth: 12,
        }
    }

    #[test]
    fn produces_decodable_pairs_in_every_colour_format() {
        let decoder = PixelDecoder::default();
        for format in [
            PixelFormat::Rgb24,
            PixelFormat::Bgr24,
            PixelFormat::Yuyv,
            PixelFormat::Nv12,
            PixelFormat::Nv21,
            PixelFormat::Mjpeg,
        ] {
            let mut device = SyntheticDevice::new(config(format)).unwrap();
            let pair = device
                .blocking_acquire(Duration::from_millis(100))
                .unwrap()
                .expect("frame within timeout");

            assert_eq!(pair.color.meta.format, format);
            assert_eq!(pair.depth.meta.bit_depth, 12);
            let color = decoder.decode(&pair.color).unwrap();
            if let Some(color) = color {
                assert_eq!(color.dimensions(), (64, 48));
            }
            let depth = decoder.decode(&pair.depth).unwrap().unwrap();
            assert_eq!(depth.dimensions(), (64, 48));
        }
    }

    #[test]
    fn sequence_increases_per_pair() {
        let mut device = SyntheticDevice::new(config(PixelFormat::Rgb24)).unwrap();
        let first = device.blocking_acquire(Duration::from_millis(100)).unwrap().unwrap();
        let second = device.blocking_acquire(Duration::from_millis(100)).unwrap().unwrap();
        assert_eq!(first.sequence() + 1, second.sequence());
    }

    #[test]
    fn short_timeout_yields_nothing() {
        let mut cfg = config(PixelFormat::Rgb24);
        cfg.fps = 1;
        let mut device = SyntheticDevice::new(cfg).unwrap();
        assert!(device.blocking_acquire(Duration::from_millis(10)).unwrap().is_some());
        assert!(device.blocking_acquire(Duration::from_millis(10)).unwrap().is_none());
    }

    #[test]
    fn invalid_profiles_are_rejected() {
        let mut cfg = config(PixelFormat::Nv21);
        cfg.width = 63;
        assert_eq!(
            SyntheticDevice::new(cfg).err().map(|e| e.kind),
            Some(DeviceErrorKind::InvalidValue)
        );

        let cfg = config(PixelFormat::Y16);
        assert_eq!(
            SyntheticDevice::new(cfg).err().map(|e| e.kind),
            Some(DeviceErrorKind::Unsupported)
        );
    }

    #[test]
    fn default_depth_separates_subject_from_background() {
        let config = Config::default();
        let mut device = SyntheticDevice::new(config.device.clone()).unwrap();
        let pair = device
            .blocking_acquire(Duration::from_millis(500))
            .unwrap()
            .expect("frame within timeout");

        let depth = PixelDecoder::default().decode(&pair.depth).unwrap().unwrap();
        let mut tracker = DepthBandTracker::new(config.tracker.near, config.tracker.far);
        let mask = tracker.track(&depth, &[]);

        let total = (depth.width() * depth.height()) as usize;
        let set = mask.pixels().filter(|p| p.0[0] != 0).count();
        assert!(set > 0, "subject disc missing from mask");
        assert!(set < total, "background leaked into mask");

        let row: Vec<u8> = (0..depth.width()).map(|x| depth.pixel(x, 0)[0]).collect();
        assert_eq!(row[0], BACKGROUND_NEAR);
        assert_eq!(row[row.len() - 1], BACKGROUND_FAR);
        assert!(row.windows(2).all(|w| w[0] <= w[1]), "background is not a ramp");
    }

    #[test]
    fn low_bit_depths_keep_the_subject_in_band() {
        let mut cfg = config(PixelFormat::Rgb24);
        cfg.depth_bit_depth = 8;
        let mut device = SyntheticDevice::new(cfg).unwrap();
        let pair = device.blocking_acquire(Duration::from_millis(100)).unwrap().unwrap();

        let depth = PixelDecoder::default().decode(&pair.depth).unwrap().unwrap();
        let (w, h) = depth.dimensions();
        let subject: Vec<u8> = (0..w)
            .map(|x| depth.pixel(x, h / 2)[0])
            .filter(|&v| v < BACKGROUND_NEAR)
            .collect();
        assert!(!subject.is_empty());
        assert!(subject.iter().all(|&v| v == SUBJECT_DISPLAY as u8));
    }
}
