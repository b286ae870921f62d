//! SDL2 Window Display Module
//! Shows composed canvases in an SDL2 window and turns keyboard events into
//! key codes for the render loop.

use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use sdl2::event::Event;
use sdl2::keyboard::Keycode;
use sdl2::pixels::PixelFormatEnum;
use sdl2::render::{Canvas, TextureCreator};
use sdl2::video::{Window, WindowContext};
use sdl2::EventPump;
use tracing::{info, warn};

use super::normalized::NormalizedImage;
use super::sink::{DisplaySink, KeySource};
use crate::utils::{KEY_ESC, KEY_INFO_LOWER};

/// SDL2 Window Display
/// Handles window creation, event polling, and frame rendering with vsync.
pub struct Sdl2Display {
    canvas: Canvas<Window>,
    texture_creator: TextureCreator<WindowContext>,
    event_pump: EventPump,
    title: String,
}

impl Sdl2Display {
    pub fn new(sdl_context: &sdl2::Sdl, title: &str, width: u32, height: u32) -> Result<Self> {
        let video_subsystem = sdl_context.video().map_err(|e| eyre!(e))?;

        let window_builder = video_subsystem
            .window(title, width, height)
            .position_centered()
            .resizable()
            .build()?;

        let canvas = window_builder.into_canvas().present_vsync().build()?;
        let texture_creator = canvas.texture_creator();
        let event_pump = sdl_context.event_pump().map_err(|e| eyre!(e))?;

        info!(width, height, "SDL2 window created");
        Ok(Self {
            canvas,
            texture_creator,
            event_pump,
            title: title.to_string(),
        })
    }

    fn render(&mut self, image: &NormalizedImage) -> Result<()> {
        let (width, height) = image.dimensions();
        let mut texture = self
            .texture_creator
            .create_texture_streaming(PixelFormatEnum::RGB24, width, height)
            .map_err(|e| eyre!(e))?;

        texture
            .update(None, image.as_bytes(), (width * 3) as usize)
            .map_err(|e| eyre!(e))?;

        self.canvas.clear();
        self.canvas
            .copy(&texture, None, None)
            .map_err(|e| eyre!(e))?;

        self.canvas.present();
        Ok(())
    }
}

impl DisplaySink for Sdl2Display {
    fn show(&mut self, title: &str, image: &NormalizedImage) {
        if title != self.title {
            if let Err(e) = self.canvas.window_mut().set_title(title) {
                warn!("Failed to set window title: {}", e);
            }
            self.title = title.to_string();
        }
        if let Err(e) = self.render(image) {
            warn!("Render error: {}", e);
        }
    }
}

impl KeySource for Sdl2Display {
    fn poll_key(&mut self, wait: Duration) -> Option<i32> {
        let timeout = u32::try_from(wait.as_millis()).unwrap_or(u32::MAX);
        let event = if timeout == 0 {
            self.event_pump.poll_event()
        } else {
            self.event_pump.wait_event_timeout(timeout)
        }?;

        match event {
            Event::Quit { .. } => {
                info!("Quit event received");
                Some(KEY_ESC)
            }
            Event::KeyDown {
                keycode: Some(key), ..
            } => {
                if key == Keycode::Escape {
                    Some(KEY_ESC)
                } else if key == Keycode::I {
                    Some(KEY_INFO_LOWER)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}
