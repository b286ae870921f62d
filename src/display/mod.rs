pub mod normalized;
pub mod layout;
pub mod sink;

#[cfg(feature = "sdl-display")]
pub mod sdl;

pub use normalized::NormalizedImage;
pub use layout::{LayoutComposer, LayoutError, LayoutPolicy, RenderBundle};
pub use sink::{ChannelKeys, ChannelSink, DisplaySink, HeadlessSink, KeyAction, KeySource};

#[cfg(feature = "sdl-display")]
pub use sdl::Sdl2Display;
