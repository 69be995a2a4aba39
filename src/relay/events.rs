//! Relay lifecycle events.

use std::time::Duration;

/// Events emitted by a [`StreamRelay`](super::StreamRelay) on its broadcast
/// channel. Payloads are owned and cloneable so any number of observers can
/// subscribe.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// Upstream connected; frames are flowing.
    Connected,
    /// Upstream lost; the next attempt runs after `delay`.
    Reconnecting {
        /// Consecutive failed attempts so far.
        attempts: u32,
        delay: Duration,
        reason: String,
    },
    /// The reconnect budget is spent; the relay stays down until restarted.
    Error(String),
    /// The relay was torn down.
    Closed,
    /// A viewer attached.
    ClientConnected(String),
    /// A viewer detached.
    ClientDisconnected(String),
}
