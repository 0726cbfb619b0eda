//! Event emitter trait for settings change notifications.
//!
//! This module defines the abstraction for emitting settings events.
//! Implementations handle transport details (channels, hooks, logging, ...).

use tokio::sync::broadcast;

use crate::events::SettingsEvent;

/// Trait for emitting settings events.
///
/// # Implementations
///
/// - `NoopEmitter` - For contexts that don't need events
/// - `BroadcastEmitter` - Fans events out to `tokio` broadcast receivers
#[cfg_attr(test, mockall::automock)]
pub trait SettingsEventEmitter: Send + Sync {
    /// Emit a settings event.
    ///
    /// This method should not block.
    fn emit(&self, event: SettingsEvent);

    /// Clone this emitter into a boxed trait object.
    fn clone_box(&self) -> Box<dyn SettingsEventEmitter>;
}

/// A no-op event emitter.
#[derive(Debug, Clone, Default)]
pub struct NoopEmitter;

impl NoopEmitter {
    pub const fn new() -> Self {
        Self
    }
}

impl SettingsEventEmitter for NoopEmitter {
    fn emit(&self, _event: SettingsEvent) {
        // Intentionally do nothing
    }

    fn clone_box(&self) -> Box<dyn SettingsEventEmitter> {
        Box::new(self.clone())
    }
}

/// Emitter backed by a `tokio` broadcast channel.
///
/// Events emitted while nobody is subscribed are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastEmitter {
    tx: broadcast::Sender<SettingsEvent>,
}

impl BroadcastEmitter {
    /// Create an emitter buffering up to `capacity` events per receiver.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<SettingsEvent> {
        self.tx.subscribe()
    }
}

impl SettingsEventEmitter for BroadcastEmitter {
    fn emit(&self, event: SettingsEvent) {
        // Err only means there are no receivers right now
        let _ = self.tx.send(event);
    }

    fn clone_box(&self) -> Box<dyn SettingsEventEmitter> {
        Box::new(self.clone())
    }
}
