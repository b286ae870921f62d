use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

/// Process-wide stop flag shared by the acquisition and render contexts.
///
/// Once set it stays set.
#[derive(Debug, Clone, Default)]
pub struct QuitSignal {
    flag: Arc<AtomicBool>,
}

impl QuitSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Set this signal on Ctrl+C. Only one handler may exist per process.
    pub fn set_on_ctrl_c(&self) -> Result<(), ctrlc::Error> {
        let quit = self.clone();
        ctrlc::set_handler(move || {
            info!("interrupt received, shutting down");
            quit.set();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_observe_the_same_flag() {
        let quit = QuitSignal::new();
        let observer = quit.clone();
        assert!(!observer.is_set());

        quit.set();
        assert!(observer.is_set());
        quit.set();
        assert!(observer.is_set());
    }
}
