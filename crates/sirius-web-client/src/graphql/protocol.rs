//! GraphQL-over-WebSocket wire messages.
//!
//! Two subprotocols are spoken:
//!
//! - `graphql-ws`: the subscriptions-transport-ws protocol
//!   (`start`/`data`/`stop`, `ka` keep-alives). Default.
//! - `graphql-transport-ws`: the graphql-ws protocol
//!   (`subscribe`/`next`/`complete`, `ping`/`pong`).
//!   See <https://github.com/enisdenjo/graphql-ws/blob/master/PROTOCOL.md>.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::request::GraphQLRequest;

/// GraphQL-over-WebSocket subprotocol used by the subscription socket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WebSocketProtocol {
    /// subscriptions-transport-ws, negotiated as `graphql-ws`.
    #[default]
    SubscriptionsTransportWs,
    /// graphql-ws, negotiated as `graphql-transport-ws`.
    GraphqlTransportWs,
}

impl WebSocketProtocol {
    /// Value of the `Sec-WebSocket-Protocol` handshake header.
    pub fn subprotocol(&self) -> &'static str {
        match self {
            Self::SubscriptionsTransportWs => "graphql-ws",
            Self::GraphqlTransportWs => "graphql-transport-ws",
        }
    }

    pub(crate) fn init(&self, payload: Option<Value>) -> ClientMessage {
        ClientMessage::ConnectionInit { payload }
    }

    pub(crate) fn subscribe(&self, id: String, payload: SubscribePayload) -> ClientMessage {
        match self {
            Self::SubscriptionsTransportWs => ClientMessage::Start { id, payload },
            Self::GraphqlTransportWs => ClientMessage::Subscribe { id, payload },
        }
    }

    pub(crate) fn stop(&self, id: String) -> ClientMessage {
        match self {
            Self::SubscriptionsTransportWs => ClientMessage::Stop { id },
            Self::GraphqlTransportWs => ClientMessage::Complete { id },
        }
    }

    /// Message sent before a clean close, if the protocol defines one.
    pub(crate) fn terminate(&self) -> Option<ClientMessage> {
        match self {
            Self::SubscriptionsTransportWs => Some(ClientMessage::ConnectionTerminate),
            Self::GraphqlTransportWs => None,
        }
    }

    /// Whether the client is expected to send keep-alive pings.
    pub(crate) fn client_pings(&self) -> bool {
        matches!(self, Self::GraphqlTransportWs)
    }
}

impl std::fmt::Display for WebSocketProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.subprotocol())
    }
}

/// Payload of a `subscribe`/`start` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct SubscribePayload {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
    #[serde(rename = "operationName", skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl From<GraphQLRequest> for SubscribePayload {
    fn from(request: GraphQLRequest) -> Self {
        Self {
            query: request.query,
            variables: request.variables,
            operation_name: request.operation_name,
            extensions: request.extensions,
        }
    }
}

/// Client -> server messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ClientMessage {
    ConnectionInit {
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Start {
        id: String,
        payload: SubscribePayload,
    },
    Subscribe {
        id: String,
        payload: SubscribePayload,
    },
    Stop {
        id: String,
    },
    Complete {
        id: String,
    },
    Ping {
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Pong {
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    ConnectionTerminate,
}

/// Server -> client messages of both protocols.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ServerMessage {
    ConnectionAck {
        #[serde(default)]
        payload: Option<Value>,
    },
    ConnectionError {
        #[serde(default)]
        payload: Option<Value>,
    },
    Ka,
    Ping {
        #[serde(default)]
        payload: Option<Value>,
    },
    Pong {
        #[serde(default)]
        payload: Option<Value>,
    },
    /// The payload is decoded separately so that a malformed result still
    /// reaches its subscription.
    Next {
        id: String,
        #[serde(default)]
        payload: Value,
    },
    Data {
        id: String,
        #[serde(default)]
        payload: Value,
    },
    Error {
        id: String,
        #[serde(default)]
        payload: Value,
    },
    Complete {
        id: String,
    },
}
