/// Record indicator (the REC LED)
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

/// Shows whether the sequencer is recording. It holds no state of its own
/// beyond the last value it was given.
pub trait RecordIndicator: Send + Sync {
    fn set(&self, recording: bool);
}

/// Reports the record state in the log.
#[derive(Debug, Default)]
pub struct LogIndicator;

impl RecordIndicator for LogIndicator {
    fn set(&self, recording: bool) {
        info!("REC {}", if recording { "on" } else { "off" });
    }
}

/// Keeps the last value for a front-end to poll.
#[derive(Debug, Default)]
pub struct SharedIndicator {
    lit: AtomicBool,
}

impl SharedIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_lit(&self) -> bool {
        self.lit.load(Ordering::Acquire)
    }
}

impl RecordIndicator for SharedIndicator {
    fn set(&self, recording: bool) {
        self.lit.store(recording, Ordering::Release);
    }
}
