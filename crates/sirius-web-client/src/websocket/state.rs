//! WebSocket connection state and lifecycle signals.

use crate::signal::Signal;

/// Current state of the shared subscription socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket is open.
    #[default]
    Disconnected,
    /// Opening the socket and waiting for `connection_ack`.
    Connecting,
    /// Acknowledged and carrying subscriptions.
    Connected,
    /// Connection lost while subscriptions were active; waiting to retry.
    Reconnecting,
}

/// Signals emitted by the subscription socket.
///
/// # Example
///
/// ```ignore
/// client.connection_events().connected.connect(|_| {
///     tracing::info!("subscription socket opened");
/// });
/// ```
#[derive(Debug, Default)]
pub struct ConnectionEvents {
    /// Emitted when a connection attempt starts.
    pub connecting: Signal<()>,
    /// Emitted once the server acknowledged the connection.
    pub connected: Signal<()>,
    /// Emitted when an open socket is closed or lost.
    pub disconnected: Signal<()>,
    /// Emitted before each reconnection attempt, with the 1-based attempt number.
    pub reconnecting: Signal<u32>,
}
