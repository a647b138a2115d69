//! GraphQL client for Sirius Web servers.
//!
//! The client speaks to two endpoints of one server:
//!
//! - **HTTP** (`{origin}/api/graphql`): queries and mutations, each a single
//!   `POST` carrying a static `Authorization: Basic ...` header
//! - **WebSocket** (`{origin}/subscriptions`): subscriptions, multiplexed over
//!   one socket that opens on the first subscription and closes after the last
//!
//! Which endpoint an operation uses is decided by its document alone: an
//! operation whose main definition is a `subscription` goes over the socket,
//! everything else over HTTP.
//!
//! # Quick start
//!
//! ```ignore
//! use sirius_web_client::{ClientSettings, GraphQLClient, GraphQLRequest};
//!
//! // Reads SIRIUS_HTTP_ORIGIN, SIRIUS_USERNAME, SIRIUS_PASSWORD, ...
//! let configuration = ClientSettings::from_env().into_configuration()?;
//! let client = GraphQLClient::from_configuration(configuration)?;
//!
//! let viewer = client.query(GraphQLRequest::new("{ viewer { id } }")).await?;
//! ```
//!
//! # Subscription socket events
//!
//! ```ignore
//! client.connection_events().connected.connect(|_| {
//!     tracing::info!("subscription socket is up");
//! });
//! ```
//!
//! # Logging
//!
//! The crate logs through `tracing` under the targets
//! `sirius_web_client::http`, `::graphql`, `::subscription` and `::config`.
//! It never installs a subscriber.

pub mod config;
pub mod credentials;
pub mod error;
pub mod graphql;
pub mod http;
pub mod signal;
pub mod websocket;

pub use config::ClientSettings;
pub use credentials::CredentialHeader;
pub use error::{ClientError, Result};
pub use graphql::{
    ClientConfiguration, DefaultOptions, Execution, FetchPolicy, GraphQLClient, GraphQLError,
    GraphQLRequest, GraphQLResponse, OperationType, QueryWatcher, SubscriptionStream, Transport,
    WebSocketProtocol, create_client,
};
pub use signal::{ConnectionId, Signal};
pub use websocket::{ConnectionEvents, ConnectionState, ReconnectConfig};
