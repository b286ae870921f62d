pub mod capture;
pub mod detect;
pub mod display;
pub mod pipeline;
pub mod utils;

use std::path::Path;

use capture::decoder::DEFAULT_MIN_FRAME_BYTES;
use capture::frame::PixelFormat;
use serde::{Deserialize, Serialize};

pub use capture::{FramePair, PixelDecoder, RawFrame};
pub use display::{LayoutComposer, NormalizedImage};
pub use pipeline::{FrameMailbox, Orchestrator, QuitSignal};

/// Prefix for environment overrides, e.g. `DEPTHVIEW_PIPELINE__MAX_TICKS=300`.
pub const ENV_PREFIX: &str = "DEPTHVIEW";

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub device: DeviceConfig,
    pub display: DisplayConfig,
    pub pipeline: PipelineConfig,
    pub render: RenderConfig,
    pub tracker: TrackerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub color_format: PixelFormat,
    pub depth_format: PixelFormat,
    pub depth_bit_depth: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayBackend {
    /// SDL2 window (requires the `sdl-display` feature)
    Window,
    Headless,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub backend: DisplayBackend,
    pub title: String,
    /// Nominal canvas size used for grid placeholders and overlays
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub acquire_timeout_ms: u64,
    pub min_frame_bytes: usize,
    pub key_wait_ms: u64,
    pub pin_acquisition_core: Option<usize>,
    pub max_ticks: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    pub layout: String,
    pub overlay_alpha: f32,
    pub green_screen: [u8; 3],
    pub mark_faces: bool,
    pub show_info: bool,
}

/// Display-range band (0-255) kept by the built-in depth tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub near: u8,
    pub far: u8,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
            color_format: PixelFormat::Rgb24,
            depth_format: PixelFormat::Y16,
            depth_bit_depth: 12,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            backend: if cfg!(feature = "sdl-display") {
                DisplayBackend::Window
            } else {
                DisplayBackend::Headless
            },
            title: "Multiple-Person Background Removal".to_string(),
            // Colour, output and depth side by side
            width: 640 * 3,
            height: 480,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_ms: 100,
            min_frame_bytes: DEFAULT_MIN_FRAME_BYTES,
            key_wait_ms: 1,
            pin_acquisition_core: None,
            max_ticks: None,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            layout: "row".to_string(),
            overlay_alpha: display::layout::DEFAULT_OVERLAY_ALPHA,
            green_screen: detect::GREEN_SCREEN,
            mark_faces: true,
            show_info: false,
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { near: 20, far: 120 }
    }
}

impl Config {
    /// Defaults, then the optional TOML file, then `DEPTHVIEW_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}

/// Counters collected over one pipeline run
#[derive(Debug, Default, Clone)]
pub struct Metrics {
    pub ticks: u64,
    pub rendered: u64,
    pub stale_renders: u64,
    pub skipped: u64,
    pub mailbox: pipeline::MailboxStats,
    pub color_fps: f64,
    pub depth_fps: f64,
}
