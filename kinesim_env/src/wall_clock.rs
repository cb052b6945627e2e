//! Production implementation of TimeSource using the system clock.

use crate::TimeSource;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Production time source backed by `Instant`.
pub struct WallClock {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl WallClock {
    /// Creates a new WallClock.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Creates an Arc-wrapped clock for sharing across threads.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for WallClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}
