//! GraphQL operations against a Sirius Web server.
//!
//! - Queries and mutations: one authenticated HTTP POST each
//! - Subscriptions: multiplexed over one shared, lazily opened WebSocket
//!   that reconnects and resubscribes on its own
//! - Routing by the document's main definition, not by which method was called
//! - Optional in-memory response cache, bypassed by default
//!
//! # Example
//!
//! ```ignore
//! use sirius_web_client::graphql::{GraphQLRequest, create_client};
//! use sirius_web_client::CredentialHeader;
//!
//! let client = create_client(
//!     "https://sirius.example.com/api/graphql",
//!     "wss://sirius.example.com/subscriptions",
//!     CredentialHeader::basic("system", "012345678910"),
//! )?;
//!
//! let request = GraphQLRequest::new(r#"
//!     query Project($id: ID!) {
//!         viewer { project(projectId: $id) { name } }
//!     }
//! "#)
//! .variable("id", "a4f1...");
//! let viewer: serde_json::Value = client.query(request).await?.field("viewer")?;
//! ```
//!
//! # Subscriptions
//!
//! ```ignore
//! let mut events = client.subscribe(GraphQLRequest::new(
//!     "subscription Events($input: ProjectEventInput!) { projectEvent(input: $input) { __typename } }",
//! ))?;
//!
//! while let Some(event) = events.next().await {
//!     match event {
//!         Ok(response) => println!("{:?}", response.data),
//!         Err(e) => eprintln!("subscription failed: {e}"),
//!     }
//! }
//! ```

mod cache;
mod client;
pub mod document;
mod protocol;
mod request;
mod response;
mod subscription;
mod watch;

pub use cache::{DefaultOptions, FetchPolicy, ResponseCache};
pub use client::{
    ClientConfiguration, Execution, GraphQLClient, HTTP_PATH, WS_PATH, create_client,
};
pub use document::{MainDefinition, Transport, main_definition, select_transport};
pub use protocol::WebSocketProtocol;
pub use request::{GraphQLRequest, OperationType};
pub use response::{GraphQLError, GraphQLLocation, GraphQLResponse, PathSegment};
pub use subscription::SubscriptionStream;
pub use watch::QueryWatcher;
