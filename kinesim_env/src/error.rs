//! Error types for the kinesim environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// No consumer is attached to the notification channel
    #[error("Notification sink closed: {0}")]
    SinkClosed(String),
}

impl EnvError {
    /// Creates a sink-closed error.
    pub fn closed(msg: impl Into<String>) -> Self {
        Self::SinkClosed(msg.into())
    }
}
