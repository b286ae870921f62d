//! Acquisition thread + render loop around the frame mailbox

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, instrument, trace, warn};

use super::fps::StreamRates;
use super::mailbox::FrameMailbox;
use super::quit::QuitSignal;
use crate::capture::{
    DecodeError, DeviceError, DeviceService, FramePair, PixelDecoder, RawFrame, StreamKind,
};
use crate::detect::{green_screen, mark_points, FaceDetector, MaskMismatch, ObjectTracker};
use crate::display::{
    DisplaySink, KeyAction, KeySource, LayoutComposer, LayoutError, LayoutPolicy, NormalizedImage,
    RenderBundle,
};
use crate::{Config, Metrics};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("device failure\n{0}")]
    Device(#[from] DeviceError),

    #[error("failed to spawn acquisition thread")]
    Spawn(#[source] std::io::Error),

    #[error("acquisition thread panicked")]
    AcquisitionPanicked,
}

/// Why a render tick produced no output. Never fatal.
#[derive(Error, Debug)]
pub enum TickError {
    #[error("{0} frame carried no data")]
    NoData(StreamKind),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Mask(#[from] MaskMismatch),

    #[error(transparent)]
    Layout(#[from] LayoutError),
}

/// What one render tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A fresh pair was decoded, composed and shown
    Rendered,
    /// Nothing new; the previous canvas was shown again
    Stale,
    /// Nothing new and nothing shown yet
    Idle,
    /// A fresh pair could not be turned into a canvas
    Skipped,
}

#[derive(Debug, Clone)]
struct RenderSettings {
    title: String,
    layout: String,
    overlay_alpha: f32,
    green_screen: [u8; 3],
    mark_faces: bool,
    show_info: bool,
    key_wait: Duration,
    max_ticks: Option<u64>,
}

/// Owns the mailbox and quit signal shared by the acquisition thread and
/// the render loop, plus everything the render loop needs per tick.
pub struct Orchestrator<F, T> {
    mailbox: Arc<FrameMailbox>,
    quit: QuitSignal,
    decoder: PixelDecoder,
    composer: LayoutComposer,
    detector: F,
    tracker: T,
    rates: StreamRates,
    settings: RenderSettings,
    acquire_timeout: Duration,
    pin_core: Option<usize>,
    last_canvas: Option<NormalizedImage>,
    metrics: Metrics,
}

impl<F: FaceDetector, T: ObjectTracker> Orchestrator<F, T> {
    pub fn new(config: &Config, detector: F, tracker: T) -> Self {
        Self {
            mailbox: Arc::new(FrameMailbox::new()),
            quit: QuitSignal::new(),
            decoder: PixelDecoder::new(config.pipeline.min_frame_bytes),
            composer: LayoutComposer::new(config.display.width, config.display.height),
            detector,
            tracker,
            rates: StreamRates::default(),
            settings: RenderSettings {
                title: config.display.title.clone(),
                layout: config.render.layout.clone(),
                overlay_alpha: config.render.overlay_alpha,
                green_screen: config.render.green_screen,
                mark_faces: config.render.mark_faces,
                show_info: config.render.show_info,
                key_wait: Duration::from_millis(config.pipeline.key_wait_ms),
                max_ticks: config.pipeline.max_ticks,
            },
            acquire_timeout: Duration::from_millis(config.pipeline.acquire_timeout_ms),
            pin_core: config.pipeline.pin_acquisition_core,
            last_canvas: None,
            metrics: Metrics::default(),
        }
    }

    pub fn mailbox(&self) -> &Arc<FrameMailbox> {
        &self.mailbox
    }

    pub fn quit_signal(&self) -> QuitSignal {
        self.quit.clone()
    }

    pub fn show_info(&self) -> bool {
        self.settings.show_info
    }

    /// Run until quit is requested or the device fails.
    ///
    /// The device moves onto a dedicated acquisition thread; the calling
    /// thread becomes the render loop.
    pub fn run<D, U>(&mut self, device: D, ui: &mut U) -> Result<Metrics, PipelineError>
    where
        D: DeviceService + Send + 'static,
        U: DisplaySink + KeySource,
    {
        let producer = self.spawn_acquisition(device)?;
        info!("render loop started");

        while !self.quit.is_set() {
            self.render_tick(ui);
            let key = ui.poll_key(self.settings.key_wait);
            self.handle_key(key);

            if let Some(max) = self.settings.max_ticks {
                if self.metrics.ticks >= max {
                    info!(ticks = self.metrics.ticks, "tick limit reached");
                    self.quit.set();
                }
            }
        }

        self.quit.set();
        let acquisition = producer
            .join()
            .map_err(|_| PipelineError::AcquisitionPanicked)?;
        let metrics = self.summary();
        info!(
            ticks = metrics.ticks,
            rendered = metrics.rendered,
            skipped = metrics.skipped,
            dropped = metrics.mailbox.dropped,
            overwritten = metrics.mailbox.overwritten,
            "render loop stopped"
        );
        acquisition?;
        Ok(metrics)
    }

    /// Start the producer context on its own thread.
    pub fn spawn_acquisition<D>(
        &self,
        device: D,
    ) -> Result<JoinHandle<Result<(), DeviceError>>, PipelineError>
    where
        D: DeviceService + Send + 'static,
    {
        let mailbox = Arc::clone(&self.mailbox);
        let quit = self.quit.clone();
        let timeout = self.acquire_timeout;
        let pin_core = self.pin_core;

        thread::Builder::new()
            .name("acquisition".into())
            .spawn(move || {
                if let Some(id) = pin_core {
                    if core_affinity::set_for_current(core_affinity::CoreId { id }) {
                        debug!(core = id, "acquisition thread pinned");
                    } else {
                        warn!(core = id, "failed to pin acquisition thread");
                    }
                }
                run_acquisition(device, &mailbox, &quit, timeout)
            })
            .map_err(PipelineError::Spawn)
    }

    /// One consumer tick: drain the mailbox and show whatever results.
    pub fn render_tick(&mut self, sink: &mut impl DisplaySink) -> TickOutcome {
        self.metrics.ticks += 1;

        let Some(pair) = self.mailbox.take_if_present() else {
            return self.reshow_last(sink);
        };

        match self.process(&pair) {
            Ok(canvas) => {
                let title = self.window_title();
                sink.show(&title, &canvas);
                self.last_canvas = Some(canvas);
                self.metrics.rendered += 1;
                TickOutcome::Rendered
            }
            Err(TickError::NoData(stream)) => {
                trace!(%stream, sequence = pair.sequence(), "pair without data skipped");
                self.metrics.skipped += 1;
                TickOutcome::Skipped
            }
            Err(e) => {
                warn!(sequence = pair.sequence(), "render tick skipped: {}", e);
                self.metrics.skipped += 1;
                TickOutcome::Skipped
            }
        }
    }

    /// Nothing new arrived: show the previous canvas again as a Single layout.
    fn reshow_last(&mut self, sink: &mut impl DisplaySink) -> TickOutcome {
        let Some(last) = &self.last_canvas else {
            return TickOutcome::Idle;
        };
        let bundle = RenderBundle::new(vec![last.clone()], LayoutPolicy::Single);
        match self.composer.compose(&bundle) {
            Ok(canvas) => {
                sink.show(&self.settings.title, &canvas);
                self.metrics.stale_renders += 1;
                TickOutcome::Stale
            }
            Err(e) => {
                warn!("stale tick skipped: {}", e);
                self.metrics.skipped += 1;
                TickOutcome::Skipped
            }
        }
    }

    /// Apply one polled key code.
    pub fn handle_key(&mut self, key: Option<i32>) {
        match key.and_then(KeyAction::from_code) {
            Some(KeyAction::Quit) => {
                info!("quit requested");
                self.quit.set();
            }
            Some(KeyAction::ToggleInfo) => {
                self.settings.show_info = !self.settings.show_info;
                info!(show_info = self.settings.show_info, "diagnostic overlay toggled");
            }
            None => {}
        }
    }

    pub fn summary(&self) -> Metrics {
        Metrics {
            mailbox: self.mailbox.stats(),
            color_fps: self.rates.average(StreamKind::Color),
            depth_fps: self.rates.average(StreamKind::Depth),
            ..self.metrics.clone()
        }
    }

    #[instrument(level = "trace", skip_all, fields(sequence = pair.sequence()))]
    fn process(&mut self, pair: &FramePair) -> Result<NormalizedImage, TickError> {
        self.rates.record(pair.color.meta.stream, pair.color.timestamp);
        self.rates.record(pair.depth.meta.stream, pair.depth.timestamp);

        let mut color = self.decode(&pair.color)?;
        let depth = self.decode(&pair.depth)?;

        let faces = self.detector.detect(&color);
        let mask = self.tracker.track(&depth, &faces);
        let output = green_screen(&color, &mask, self.settings.green_screen)?;
        if self.settings.mark_faces {
            mark_points(&mut color, &faces);
        }
        if self.settings.show_info {
            self.report_info(pair);
        }

        let policy = LayoutPolicy::from_tag(&self.settings.layout, self.settings.overlay_alpha)?;
        let bundle = RenderBundle::new(vec![color, output, depth], policy);
        Ok(self.composer.compose(&bundle)?)
    }

    fn decode(&self, frame: &RawFrame) -> Result<NormalizedImage, TickError> {
        self.decoder
            .decode(frame)?
            .ok_or(TickError::NoData(frame.meta.stream))
    }

    fn window_title(&self) -> String {
        if self.settings.show_info {
            format!(
                "{} | color {:.1} fps | depth {:.1} fps",
                self.settings.title,
                self.rates.average(StreamKind::Color),
                self.rates.average(StreamKind::Depth),
            )
        } else {
            self.settings.title.clone()
        }
    }

    fn report_info(&self, pair: &FramePair) {
        for frame in [&pair.color, &pair.depth] {
            let meta = &frame.meta;
            info!(
                label = %frame.label(),
                timestamp_us = meta.device_timestamp.map(|t| t.as_micros() as u64),
                system_timestamp_ms = meta.system_timestamp.as_millis() as u64,
                fps = self.rates.average(meta.stream),
                "frame info"
            );
        }
    }
}

/// Producer loop: acquire pairs and offer them to the mailbox until quit.
///
/// A device error sets the quit signal and is returned to the joiner.
pub fn run_acquisition<D: DeviceService>(
    mut device: D,
    mailbox: &FrameMailbox,
    quit: &QuitSignal,
    timeout: Duration,
) -> Result<(), DeviceError> {
    info!("acquisition started");
    while !quit.is_set() {
        match device.blocking_acquire(timeout) {
            Ok(Some(pair)) => {
                let sequence = pair.sequence();
                if !mailbox.try_publish(pair) {
                    trace!(sequence, "pair dropped, render side busy");
                }
            }
            Ok(None) => continue,
            Err(e) => {
                error!(
                    name = %e.name,
                    args = %e.args,
                    message = %e.message,
                    kind = %e.kind,
                    "device failure"
                );
                quit.set();
                return Err(e);
            }
        }
    }
    info!("acquisition stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::tests::meta;
    use crate::capture::{DeviceErrorKind, PixelFormat};
    use crate::detect::{Mask, NoFaceDetector, Point2};
    use crate::display::ChannelSink;
    use image::Luma;

    const W: u32 = 32;
    const H: u32 = 32;

    /// Marks the left half of every depth image as foreground.
    struct LeftHalf;

    impl ObjectTracker for LeftHalf {
        fn track(&mut self, depth: &NormalizedImage, _faces: &[Point2]) -> Mask {
            Mask::from_fn(depth.width(), depth.height(), |x, _| {
                Luma([if x < depth.width() / 2 { 255 } else { 0 }])
            })
        }
    }

    fn pair(sequence: u64, color_rgb: [u8; 3], depth_sample: u16) -> FramePair {
        let mut cm = meta(StreamKind::Color, PixelFormat::Rgb24, W, H);
        cm.sequence = sequence;
        let color: Vec<u8> = std::iter::repeat(color_rgb).take((W * H) as usize).flatten().collect();

        let mut dm = meta(StreamKind::Depth, PixelFormat::Y16, W, H);
        dm.sequence = sequence;
        dm.bit_depth = 12;
        let depth: Vec<u8> = std::iter::repeat(depth_sample.to_le_bytes())
            .take((W * H) as usize)
            .flatten()
            .collect();

        FramePair::new(RawFrame::new(color, cm), RawFrame::new(depth, dm))
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.display.width = W * 3;
        config.display.height = H;
        config
    }

    #[test]
    fn fresh_pair_renders_color_output_depth_row() {
        let mut orch = Orchestrator::new(&config(), NoFaceDetector, LeftHalf);
        let (mut sink, rx) = ChannelSink::bounded(4);

        assert_eq!(orch.render_tick(&mut sink), TickOutcome::Idle);
        assert!(rx.try_recv().is_err());

        orch.mailbox().try_publish(pair(1, [200, 100, 50], 400));
        assert_eq!(orch.render_tick(&mut sink), TickOutcome::Rendered);

        let shown = rx.try_recv().unwrap();
        let canvas = shown.image;
        assert_eq!(canvas.dimensions(), (W * 3, H));
        assert_eq!(canvas.pixel(1, 1), [200, 100, 50]);
        assert_eq!(canvas.pixel(W + 1, 1), [200, 100, 50]);
        assert_eq!(canvas.pixel(W * 2 - 1, 1), [0, 177, 64]);
        assert_eq!(canvas.pixel(W * 2 + 3, 3), [100, 100, 100]);
    }

    #[test]
    fn empty_mailbox_reshows_last_canvas() {
        let mut orch = Orchestrator::new(&config(), NoFaceDetector, LeftHalf);
        let (mut sink, rx) = ChannelSink::bounded(4);

        orch.mailbox().try_publish(pair(1, [1, 2, 3], 40));
        assert_eq!(orch.render_tick(&mut sink), TickOutcome::Rendered);
        for _ in 0..3 {
            assert_eq!(orch.render_tick(&mut sink), TickOutcome::Stale);
        }

        let first = rx.try_recv().unwrap().image;
        for _ in 0..3 {
            let again = rx.try_recv().unwrap();
            assert_eq!(again.title, config().display.title);
            assert_eq!(again.image, first);
        }
        let summary = orch.summary();
        assert_eq!(summary.stale_renders, 3);
        assert_eq!(summary.rendered, 1);
        assert_eq!(summary.skipped, 0);
    }

    #[test]
    fn unknown_layout_skips_the_tick() {
        let mut cfg = config();
        cfg.render.layout = "diagonal".to_string();
        let mut orch = Orchestrator::new(&cfg, NoFaceDetector, LeftHalf);
        let (mut sink, rx) = ChannelSink::bounded(4);

        orch.mailbox().try_publish(pair(1, [1, 2, 3], 40));
        assert_eq!(orch.render_tick(&mut sink), TickOutcome::Skipped);
        assert!(rx.try_recv().is_err());
        assert!(orch.mailbox().is_empty());
    }

    #[test]
    fn undersized_frame_skips_without_fault() {
        let mut orch = Orchestrator::new(&config(), NoFaceDetector, LeftHalf);
        let (mut sink, _rx) = ChannelSink::bounded(4);

        let mut p = pair(1, [1, 2, 3], 40);
        p.depth = RawFrame::new(vec![0u8; 16], (*p.depth.meta).clone());
        orch.mailbox().try_publish(p);
        assert_eq!(orch.render_tick(&mut sink), TickOutcome::Skipped);
        assert_eq!(orch.summary().skipped, 1);
    }

    #[test]
    fn keys_toggle_info_and_quit() {
        let mut orch = Orchestrator::new(&config(), NoFaceDetector, LeftHalf);
        let quit = orch.quit_signal();

        orch.handle_key(Some('i' as i32));
        assert!(orch.show_info());
        orch.handle_key(Some('x' as i32));
        orch.handle_key(None);
        assert!(orch.show_info() && !quit.is_set());

        orch.handle_key(Some(27));
        assert!(quit.is_set());
    }

    struct FailAfter {
        remaining: u32,
    }

    impl DeviceService for FailAfter {
        fn blocking_acquire(&mut self, _timeout: Duration) -> Result<Option<FramePair>, DeviceError> {
            if self.remaining == 0 {
                return Err(DeviceError::new("waitForFrames", "100", "lost", DeviceErrorKind::Io));
            }
            self.remaining -= 1;
            Ok(Some(pair(u64::from(self.remaining), [0; 3], 0)))
        }
    }

    #[test]
    fn device_error_stops_acquisition_and_sets_quit() {
        let mailbox = FrameMailbox::new();
        let quit = QuitSignal::new();
        let result = run_acquisition(FailAfter { remaining: 3 }, &mailbox, &quit, Duration::ZERO);

        assert_eq!(result.unwrap_err().kind, DeviceErrorKind::Io);
        assert!(quit.is_set());
        assert_eq!(mailbox.take_if_present().unwrap().sequence(), 0);
    }
}
