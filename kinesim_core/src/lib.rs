//! kinesim Core - Real-Time Platform Kinematics Runtime
//!
//! This library drives a set of simulated platforms on a fixed cadence:
//! 1. **Update loop**: a dedicated thread advancing every entity each tick
//! 2. **Entity registry**: lifecycle, dead reckoning and terrain following
//! 3. **Front doors**: a text command dispatcher and a JSON message translator
//! 4. **Terrain**: bilinear elevation over tiles and patches, with a sled archive

pub mod archive;
pub mod clock;
pub mod commands;
pub mod config;
pub mod element;
pub mod elevation;
pub mod entity;
pub mod error;
pub mod kinematics;
pub mod messages;
pub mod raster;
pub mod registry;
pub mod runtime;

// Re-export key types for convenience
pub use clock::{ClockState, ClockTiming, SimClock};
pub use commands::{Command, CommandDispatcher, CommandResponse};
pub use config::RuntimeConfig;
pub use elevation::{ElevationPatch, ElevationStore, GeoBounds, TileCode, INVALID_ELEVATION};
pub use entity::Entity;
pub use error::{CoreError, CoreResult};
pub use kinematics::{Attitude, Course, CourseDelta, GeoPosition, KinematicState};
pub use messages::InboundMessage;
pub use registry::EntityRegistry;
pub use runtime::RuntimeContext;
