use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One undecoded sensor sample with zero-copy payload
#[derive(Clone)]
pub struct RawFrame {
    /// Immutable frame data - can be shared across threads without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// Capture timestamp for latency tracking
    pub timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub stream: StreamKind,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// Significant bits per sample as reported by the sensor
    pub bit_depth: u8,
    pub device_timestamp: Option<Duration>, // Hardware timestamp if available
    pub system_timestamp: Duration,
}

impl RawFrame {
    pub fn new(data: impl Into<Bytes>, meta: FrameMetadata) -> Self {
        Self {
            data: data.into(),
            meta: Arc::new(meta),
            timestamp: Instant::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Short label used by the diagnostic overlay, e.g. `Color-NV21`.
    pub fn label(&self) -> String {
        match self.meta.stream {
            StreamKind::Color => format!("Color-{}", self.meta.format.tag()),
            StreamKind::Depth => "Depth".to_string(),
            StreamKind::Infrared => "IR".to_string(),
        }
    }
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFrame")
            .field("len", &self.data.len())
            .field("meta", &self.meta)
            .finish()
    }
}

/// Sensor stream a frame came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    Color,
    Depth,
    Infrared,
}

impl StreamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Color => "color",
            StreamKind::Depth => "depth",
            StreamKind::Infrared => "infrared",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Yuyv,
    Mjpeg,
    Nv12,
    Nv21,
    Y16,
}

impl PixelFormat {
    pub fn tag(self) -> &'static str {
        match self {
            PixelFormat::Rgb24 => "RGB",
            PixelFormat::Bgr24 => "BGR",
            PixelFormat::Yuyv => "YUYV",
            PixelFormat::Mjpeg => "MJPG",
            PixelFormat::Nv12 => "NV12",
            PixelFormat::Nv21 => "NV21",
            PixelFormat::Y16 => "Y16",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Colour and depth frames captured at the same instant.
///
/// Both members are always present; partial framesets never become a pair.
#[derive(Debug, Clone)]
pub struct FramePair {
    pub color: RawFrame,
    pub depth: RawFrame,
}

impl FramePair {
    pub fn new(color: RawFrame, depth: RawFrame) -> Self {
        Self { color, depth }
    }

    /// Bundle whatever the device delivered, if it is complete.
    pub fn from_parts(color: Option<RawFrame>, depth: Option<RawFrame>) -> Option<Self> {
        Some(Self::new(color?, depth?))
    }

    pub fn sequence(&self) -> u64 {
        self.color.meta.sequence
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn meta(stream: StreamKind, format: PixelFormat, width: u32, height: u32) -> FrameMetadata {
        FrameMetadata {
            sequence: 0,
            stream,
            format,
            width,
            height,
            bit_depth: 8,
            device_timestamp: None,
            system_timestamp: Duration::ZERO,
        }
    }

    #[test]
    fn pair_requires_both_members() {
        let color = RawFrame::new(vec![0u8; 4], meta(StreamKind::Color, PixelFormat::Rgb24, 1, 1));
        let depth = RawFrame::new(vec![0u8; 4], meta(StreamKind::Depth, PixelFormat::Y16, 1, 1));

        assert!(FramePair::from_parts(Some(color.clone()), None).is_none());
        assert!(FramePair::from_parts(None, Some(depth.clone())).is_none());
        assert!(FramePair::from_parts(Some(color), Some(depth)).is_some());
    }

    #[test]
    fn labels_follow_stream_and_format() {
        let nv21 = RawFrame::new(Bytes::new(), meta(StreamKind::Color, PixelFormat::Nv21, 1, 1));
        let ir = RawFrame::new(Bytes::new(), meta(StreamKind::Infrared, PixelFormat::Y16, 1, 1));
        assert_eq!(nv21.label(), "Color-NV21");
        assert_eq!(ir.label(), "IR");
    }
}
