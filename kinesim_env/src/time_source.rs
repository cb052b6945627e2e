//! Time source trait used by the simulation clock.

use std::time::Duration;

/// The central interface for reading time.
///
/// The simulation clock measures elapsed simulated time and kinetics `dt`
/// through this trait so the same code runs against the real clock and
/// against a hand-advanced clock in tests.
///
/// # Implementations
///
/// - **Production**: `WallClock` - wraps `std::time::Instant`
/// - **Tests**: `ManualClock` - virtual time advanced explicitly
pub trait TimeSource: Send + Sync + 'static {
    /// Returns the current monotonic time since the source was created.
    fn now(&self) -> Duration;
}
