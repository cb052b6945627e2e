//! Outbound notification sink abstraction.

use crate::error::EnvError;
use crate::types::Notification;
use tokio::sync::broadcast;

/// Fire-and-forget channel to the presentation layer.
///
/// # Implementations
///
/// - **Production**: `BroadcastSink` - fans out to every connected front-end
/// - **Headless / tests**: `NullSink` - drops everything
///
/// # Contract
///
/// `notify` must never block. A full or unconsumed channel is reported as an
/// error that callers log and otherwise ignore; the update loop never waits
/// on delivery.
pub trait NotificationSink: Send + Sync + 'static {
    /// Queues a notification for delivery.
    ///
    /// # Returns
    /// * `Ok(())` - Notification queued
    /// * `Err(EnvError::SinkClosed)` - Nobody is listening
    fn notify(&self, notification: Notification) -> Result<(), EnvError>;
}

/// Sink backed by a `tokio::sync::broadcast` channel.
///
/// Slow receivers lag and lose the oldest notifications instead of applying
/// back-pressure to the sender.
#[derive(Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastSink {
    /// Creates a sink with the given per-receiver buffer capacity, returning
    /// the sink and a first receiver.
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<Notification>) {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Attaches another consumer (one per connected front-end).
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Number of attached consumers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl NotificationSink for BroadcastSink {
    fn notify(&self, notification: Notification) -> Result<(), EnvError> {
        let kind = notification.kind();
        self.tx
            .send(notification)
            .map(|_| ())
            .map_err(|_| EnvError::closed(format!("no receivers for {}", kind)))
    }
}

/// Sink that discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _notification: Notification) -> Result<(), EnvError> {
        Ok(())
    }
}
