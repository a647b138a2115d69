//! GraphQL request envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::document;

/// A GraphQL operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// A query operation (read-only).
    #[default]
    Query,
    /// A mutation operation (modifies data).
    Mutation,
    /// A subscription operation (stream of events).
    Subscription,
}

/// A GraphQL request: the standard `{query, variables, operationName}` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLRequest {
    /// The GraphQL document.
    pub query: String,

    /// Optional variables for the operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,

    /// Optional operation name (for documents with multiple operations).
    #[serde(skip_serializing_if = "Option::is_none", rename = "operationName")]
    pub operation_name: Option<String>,

    /// Extensions (implementation-specific metadata).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,

    #[serde(skip)]
    operation_type: OperationType,
}

impl GraphQLRequest {
    fn with_type(query: String, operation_type: OperationType) -> Self {
        Self {
            query,
            variables: None,
            operation_name: None,
            extensions: None,
            operation_type,
        }
    }

    /// Create a request, inferring the operation type from the document.
    ///
    /// ```
    /// use sirius_web_client::graphql::{GraphQLRequest, OperationType};
    ///
    /// let request = GraphQLRequest::new("subscription { projectEvent { id } }");
    /// assert_eq!(request.operation_type(), OperationType::Subscription);
    /// ```
    pub fn new(query: impl Into<String>) -> Self {
        let query = query.into();
        let operation_type = document::operation_type(&query);
        Self::with_type(query, operation_type)
    }

    /// Create a query request.
    pub fn query(query: impl Into<String>) -> Self {
        Self::with_type(query.into(), OperationType::Query)
    }

    /// Create a mutation request.
    pub fn mutation(query: impl Into<String>) -> Self {
        Self::with_type(query.into(), OperationType::Mutation)
    }

    /// Create a subscription request.
    pub fn subscription(query: impl Into<String>) -> Self {
        Self::with_type(query.into(), OperationType::Subscription)
    }

    /// Set a single variable value.
    ///
    /// Values that fail to serialize are skipped.
    pub fn variable(mut self, name: impl Into<String>, value: impl Serialize) -> Self {
        let variables = self
            .variables
            .get_or_insert_with(|| Value::Object(Default::default()));
        if let Value::Object(map) = variables
            && let Ok(value) = serde_json::to_value(value)
        {
            map.insert(name.into(), value);
        }
        self
    }

    /// Replace all variables with a serializable value.
    pub fn variables(mut self, variables: impl Serialize) -> Self {
        self.variables = serde_json::to_value(variables).ok();
        self
    }

    /// Set the operation name.
    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Set extensions (implementation-specific metadata).
    pub fn extensions(mut self, extensions: impl Serialize) -> Self {
        self.extensions = serde_json::to_value(extensions).ok();
        self
    }

    /// The operation type this request was built as.
    ///
    /// Transport routing does not rely on this; it re-reads the document.
    pub fn operation_type(&self) -> OperationType {
        self.operation_type
    }

    /// Check if this request was built as a subscription.
    pub fn is_subscription(&self) -> bool {
        self.operation_type == OperationType::Subscription
    }

    /// Stable key identifying this request for the response cache.
    pub(crate) fn cache_key(&self) -> String {
        serde_json::json!([self.query, self.variables, self.operation_name]).to_string()
    }
}
