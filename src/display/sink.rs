//! Where composed frames go, and where key presses come from

use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use tracing::trace;

use super::normalized::NormalizedImage;
use crate::utils::{KEY_ESC, KEY_INFO_LOWER, KEY_INFO_UPPER};

/// Presents a composed canvas. Must not stall the render tick.
pub trait DisplaySink {
    fn show(&mut self, title: &str, image: &NormalizedImage);
}

/// Polled keyboard input, one key code per tick.
pub trait KeySource {
    /// Wait up to `wait` for a key; `None` when nothing was pressed.
    fn poll_key(&mut self, wait: Duration) -> Option<i32>;
}

/// What a key press asks the render loop to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Quit,
    ToggleInfo,
}

impl KeyAction {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            KEY_ESC => Some(Self::Quit),
            KEY_INFO_LOWER | KEY_INFO_UPPER => Some(Self::ToggleInfo),
            _ => None,
        }
    }
}

/// A separate sink and key source driven as one front end.
impl<S: DisplaySink, K: KeySource> DisplaySink for (S, K) {
    fn show(&mut self, title: &str, image: &NormalizedImage) {
        self.0.show(title, image);
    }
}

impl<S: DisplaySink, K: KeySource> KeySource for (S, K) {
    fn poll_key(&mut self, wait: Duration) -> Option<i32> {
        self.1.poll_key(wait)
    }
}

/// Sink for runs without a window; counts and trace-logs frames.
#[derive(Debug, Default)]
pub struct HeadlessSink {
    shown: u64,
}

impl HeadlessSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> u64 {
        self.shown
    }
}

impl DisplaySink for HeadlessSink {
    fn show(&mut self, title: &str, image: &NormalizedImage) {
        self.shown += 1;
        trace!(title, width = image.width(), height = image.height(), frame = self.shown, "frame shown");
    }
}

/// A frame handed to a [`ChannelSink`] consumer.
#[derive(Debug, Clone)]
pub struct ShownFrame {
    pub title: String,
    pub image: NormalizedImage,
}

/// Forwards frames over a bounded channel, dropping them when it is full.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<ShownFrame>,
}

impl ChannelSink {
    pub fn bounded(capacity: usize) -> (Self, Receiver<ShownFrame>) {
        let (tx, rx) = flume::bounded(capacity);
        (Self { tx }, rx)
    }
}

impl DisplaySink for ChannelSink {
    fn show(&mut self, title: &str, image: &NormalizedImage) {
        let frame = ShownFrame {
            title: title.to_string(),
            image: image.clone(),
        };
        match self.tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => trace!("display channel full, frame dropped"),
            Err(TrySendError::Disconnected(_)) => trace!("display channel closed"),
        }
    }
}

/// Key codes fed through a channel.
#[derive(Debug, Clone)]
pub struct ChannelKeys {
    rx: Receiver<i32>,
}

impl ChannelKeys {
    pub fn unbounded() -> (Sender<i32>, Self) {
        let (tx, rx) = flume::unbounded();
        (tx, Self { rx })
    }
}

impl KeySource for ChannelKeys {
    fn poll_key(&mut self, wait: Duration) -> Option<i32> {
        if wait.is_zero() {
            return match self.rx.try_recv() {
                Ok(key) => Some(key),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
            };
        }
        match self.rx.recv_timeout(wait) {
            Ok(key) => Some(key),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                // Nobody will ever press a key; keep the tick cadence anyway.
                std::thread::sleep(wait);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_codes_map_to_actions() {
        assert_eq!(KeyAction::from_code(27), Some(KeyAction::Quit));
        assert_eq!(KeyAction::from_code('i' as i32), Some(KeyAction::ToggleInfo));
        assert_eq!(KeyAction::from_code('I' as i32), Some(KeyAction::ToggleInfo));
        assert_eq!(KeyAction::from_code('q' as i32), None);
        assert_eq!(KeyAction::from_code(-1), None);
    }

    #[test]
    fn channel_sink_drops_when_full() {
        let (mut sink, rx) = ChannelSink::bounded(1);
        let img = NormalizedImage::black(2, 2);
        sink.show("a", &img);
        sink.show("b", &img);

        assert_eq!(rx.try_recv().unwrap().title, "a");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn channel_keys_deliver_in_order() {
        let (tx, mut keys) = ChannelKeys::unbounded();
        tx.send('i' as i32).unwrap();
        tx.send(27).unwrap();

        assert_eq!(keys.poll_key(Duration::ZERO), Some('i' as i32));
        assert_eq!(keys.poll_key(Duration::from_millis(1)), Some(27));
        assert_eq!(keys.poll_key(Duration::ZERO), None);
    }
}
