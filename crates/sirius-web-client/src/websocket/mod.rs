//! WebSocket connection state and reconnection policy.
//!
//! The subscription socket itself lives in [`crate::graphql`]; this module
//! holds the pieces that describe it from the outside.

mod reconnect;
mod state;

pub use reconnect::ReconnectConfig;
pub use state::{ConnectionEvents, ConnectionState};
