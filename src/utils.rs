use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Escape quits the viewer.
pub const KEY_ESC: i32 = 27;
/// `i` / `I` toggle the diagnostic overlay.
pub const KEY_INFO_LOWER: i32 = b'i' as i32;
pub const KEY_INFO_UPPER: i32 = b'I' as i32;

const DEFAULT_FILTER: &str = "depthview=info";

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the built-in filter.
pub fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_timer(fmt::time::uptime());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
