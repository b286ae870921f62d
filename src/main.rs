//! depthview: colour/depth background removal viewer

use std::path::PathBuf;

use color_eyre::Result;
use tracing::{info, warn};

use depthview::capture::SyntheticDevice;
use depthview::detect::{DepthBandTracker, NoFaceDetector};
use depthview::display::{ChannelKeys, HeadlessSink};
use depthview::{utils, Config, DisplayBackend, Metrics, Orchestrator};

fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    utils::init_tracing();

    info!("depthview launching...");

    // Load configuration
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    info!("Configuration: {:?}", config);

    let device = SyntheticDevice::new(config.device.clone())?;
    let tracker = DepthBandTracker::new(config.tracker.near, config.tracker.far);
    let mut orchestrator = Orchestrator::new(&config, NoFaceDetector, tracker);
    if let Err(err) = orchestrator.quit_signal().set_on_ctrl_c() {
        warn!("Failed to install Ctrl+C handler: {err}");
    }

    let metrics = match config.display.backend {
        DisplayBackend::Window => run_windowed(&config, &mut orchestrator, device)?,
        DisplayBackend::Headless => {
            let (_keys_tx, keys) = ChannelKeys::unbounded();
            let mut ui = (HeadlessSink::new(), keys);
            orchestrator.run(device, &mut ui)?
        }
    };

    info!(
        "depthview shutting down: {} rendered / {} ticks, color {:.1} fps, depth {:.1} fps",
        metrics.rendered, metrics.ticks, metrics.color_fps, metrics.depth_fps
    );
    Ok(())
}

#[cfg(feature = "sdl-display")]
fn run_windowed(
    config: &Config,
    orchestrator: &mut Orchestrator<NoFaceDetector, DepthBandTracker>,
    device: SyntheticDevice,
) -> Result<Metrics> {
    use color_eyre::eyre::eyre;
    use depthview::display::Sdl2Display;

    let sdl_context = sdl2::init().map_err(|e| eyre!(e))?;
    let mut window = Sdl2Display::new(
        &sdl_context,
        &config.display.title,
        config.display.width,
        config.display.height,
    )?;
    Ok(orchestrator.run(device, &mut window)?)
}

#[cfg(not(feature = "sdl-display"))]
fn run_windowed(
    _config: &Config,
    _orchestrator: &mut Orchestrator<NoFaceDetector, DepthBandTracker>,
    _device: SyntheticDevice,
) -> Result<Metrics> {
    color_eyre::eyre::bail!("the Window display backend needs the `sdl-display` feature")
}
