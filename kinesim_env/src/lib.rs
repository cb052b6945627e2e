//! kinesim Environment Abstraction Layer
//!
//! This crate isolates the parts of the runtime that touch the outside world:
//! - Time (`now()`) through [`TimeSource`]
//! - Outbound notifications to a front-end through [`NotificationSink`]
//!
//! Production code uses [`WallClock`] and [`BroadcastSink`]. Tests swap in
//! [`ManualClock`] to drive simulated time by hand and [`NullSink`] when no
//! consumer is attached.
//!
//! # Example
//!
//! ```ignore
//! use kinesim_env::{TimeSource, WallClock, BroadcastSink};
//!
//! let clock = WallClock::shared();
//! let (sink, mut rx) = BroadcastSink::new(256);
//! ```

mod time_source;
mod notify;
mod types;
mod error;
mod wall_clock;
mod manual_clock;

pub use time_source::TimeSource;
pub use notify::{NotificationSink, BroadcastSink, NullSink};
pub use types::{Notification, ScenarioEventKind, SessionId};
pub use error::EnvError;
pub use wall_clock::WallClock;
pub use manual_clock::ManualClock;
