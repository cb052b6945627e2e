//! kinesim runtime host.
//!
//! Front doors onto a [`kinesim_core::RuntimeContext`]: the operator console
//! and the JSON message server.

pub mod console;
pub mod server;

pub use console::run_console;
pub use server::MessageServer;
