//! Asynchronous receiver event types.
//!
//! Events are emitted by a connection through a [`tokio::sync::broadcast`]
//! channel. Each connection owns (or is handed) its own sender, so two
//! receivers never share a dispatcher by accident.

use tokio::sync::broadcast;

use crate::types::CommandValue;

/// Default capacity of an event channel created by a connection.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// An event emitted by a receiver connection.
///
/// Events are delivered on a best-effort basis through a bounded broadcast
/// channel; slow consumers may miss events under heavy load.
#[derive(Debug, Clone, PartialEq)]
pub enum AvrEvent {
    /// A line from the receiver changed tracked state.
    StateUpdated {
        /// Attribute that changed (`volume`, `zone2_source`).
        attribute: String,
        /// New value, or `None` when the receiver sent no value.
        value: Option<CommandValue>,
        /// The raw line that carried the change.
        message: String,
    },

    /// Successfully connected to the receiver.
    Connected,

    /// Connection to the receiver was lost or closed.
    Disconnected,

    /// Attempting to reconnect after a connection loss.
    Reconnecting {
        /// The reconnection attempt number (1-based).
        attempt: u32,
    },
}

/// Create a fresh event channel with the default capacity.
pub fn channel() -> broadcast::Sender<AvrEvent> {
    let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    tx
}
