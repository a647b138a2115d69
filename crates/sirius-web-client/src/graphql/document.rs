//! Operation document analysis.
//!
//! Routing looks only at the *main definition* of a document: the first
//! operation definition, or the first fragment definition when the document
//! has no operations. Syntax errors do not make classification fail; the
//! parser's partially recovered document is inspected instead, so every
//! document maps to exactly one [`Transport`].

use apollo_compiler::ast;

use super::request::{GraphQLRequest, OperationType};

/// The root definition of a GraphQL document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MainDefinition {
    /// An executable operation.
    Operation {
        /// Query, mutation or subscription.
        operation_type: OperationType,
        /// The operation name, if the operation is named.
        name: Option<String>,
    },
    /// A fragment definition (the document has no operation).
    Fragment {
        /// The fragment name.
        name: String,
    },
    /// The document has neither operations nor fragments.
    None,
}

impl MainDefinition {
    /// Check whether this is a subscription operation.
    pub fn is_subscription(&self) -> bool {
        matches!(
            self,
            Self::Operation {
                operation_type: OperationType::Subscription,
                ..
            }
        )
    }
}

/// Transport selected for an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transport {
    /// One stateless HTTP POST per operation.
    Http,
    /// The shared, persistent subscription socket.
    WebSocket,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::WebSocket => write!(f, "websocket"),
        }
    }
}

impl From<ast::OperationType> for OperationType {
    fn from(operation_type: ast::OperationType) -> Self {
        match operation_type {
            ast::OperationType::Query => Self::Query,
            ast::OperationType::Mutation => Self::Mutation,
            ast::OperationType::Subscription => Self::Subscription,
        }
    }
}

/// Find the main definition of a GraphQL document.
pub fn main_definition(document: &str) -> MainDefinition {
    let parsed = match ast::Document::parse(document, "operation.graphql") {
        Ok(parsed) => parsed,
        Err(with_errors) => {
            tracing::trace!(
                target: "sirius_web_client::graphql",
                errors = %with_errors.errors,
                "classifying partially parsed document"
            );
            with_errors.partial
        }
    };

    let mut fragment = None;
    for definition in &parsed.definitions {
        match definition {
            ast::Definition::OperationDefinition(operation) => {
                return MainDefinition::Operation {
                    operation_type: operation.operation_type.into(),
                    name: operation.name.as_ref().map(|name| name.to_string()),
                };
            }
            ast::Definition::FragmentDefinition(definition) if fragment.is_none() => {
                fragment = Some(definition.name.to_string());
            }
            _ => {}
        }
    }

    fragment.map_or(MainDefinition::None, |name| MainDefinition::Fragment { name })
}

/// Operation type of a document; fragments and empty documents count as queries.
pub fn operation_type(document: &str) -> OperationType {
    match main_definition(document) {
        MainDefinition::Operation { operation_type, .. } => operation_type,
        MainDefinition::Fragment { .. } | MainDefinition::None => OperationType::Query,
    }
}

/// Pick the transport for a request: subscriptions go over the socket,
/// everything else over HTTP.
pub fn select_transport(request: &GraphQLRequest) -> Transport {
    if main_definition(&request.query).is_subscription() {
        Transport::WebSocket
    } else {
        Transport::Http
    }
}
