//! GraphQL response types.

use std::fmt;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::{ClientError, Result};

/// A GraphQL error returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    /// The error message.
    pub message: String,

    /// Locations in the document where the error occurred.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<GraphQLLocation>,

    /// Path to the field that caused the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,

    /// Additional error metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphQLError {
    /// Create an error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: None,
            extensions: None,
        }
    }

    /// Parse an error payload that may be a single error or a list of errors.
    pub(crate) fn list_from_value(payload: Value) -> Vec<Self> {
        match payload {
            Value::Array(_) => serde_json::from_value(payload).unwrap_or_else(|e| {
                vec![Self::new(format!("unreadable error payload: {e}"))]
            }),
            Value::Null => vec![Self::new("unknown subscription error")],
            other => match serde_json::from_value::<Self>(other.clone()) {
                Ok(error) => vec![error],
                Err(_) => vec![Self::new(other.to_string())],
            },
        }
    }
}

impl fmt::Display for GraphQLError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref path) = self.path {
            write!(f, " (at ")?;
            for (i, segment) in path.iter().enumerate() {
                if i > 0 {
                    write!(f, ".")?;
                }
                match segment {
                    PathSegment::Field(name) => write!(f, "{name}")?,
                    PathSegment::Index(idx) => write!(f, "[{idx}]")?,
                }
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl std::error::Error for GraphQLError {}

/// A location in a GraphQL document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphQLLocation {
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed).
    pub column: u32,
}

/// A segment in an error path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// A field name.
    Field(String),
    /// An array index.
    Index(usize),
}

/// A GraphQL response from the server.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphQLResponse {
    /// The data returned by the operation.
    #[serde(default)]
    pub data: Option<Value>,

    /// Errors that occurred during execution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,

    /// Additional response metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphQLResponse {
    /// Check if the response contains errors.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Check if the response was successful (has data and no errors).
    pub fn is_success(&self) -> bool {
        self.data.is_some() && self.errors.is_empty()
    }

    /// Parse the data as a specific type.
    ///
    /// Returns [`ClientError::GraphQL`] if the response has errors.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T> {
        if self.has_errors() {
            return Err(ClientError::GraphQL(self.errors.clone()));
        }

        match &self.data {
            Some(data) => serde_json::from_value(data.clone()).map_err(|e| {
                ClientError::Json(format!("Failed to deserialize GraphQL response: {e}"))
            }),
            None => Err(ClientError::Protocol("No data in GraphQL response".into())),
        }
    }

    /// Parse a single top-level field from the data.
    ///
    /// ```ignore
    /// // { "data": { "project": { "id": "1", "name": "Flow" } } }
    /// let project: Project = response.field("project")?;
    /// ```
    pub fn field<T: DeserializeOwned>(&self, field: &str) -> Result<T> {
        if self.has_errors() {
            return Err(ClientError::GraphQL(self.errors.clone()));
        }

        match &self.data {
            Some(Value::Object(data)) => {
                let field_value = data.get(field).ok_or_else(|| {
                    ClientError::Protocol(format!("Field '{field}' not found in response"))
                })?;
                serde_json::from_value(field_value.clone()).map_err(|e| {
                    ClientError::Json(format!("Failed to deserialize field '{field}': {e}"))
                })
            }
            Some(_) => Err(ClientError::Protocol("Response data is not an object".into())),
            None => Err(ClientError::Protocol("No data in GraphQL response".into())),
        }
    }

    /// Convert errors to a Result.
    pub fn into_result(self) -> Result<Self> {
        if self.has_errors() {
            Err(ClientError::GraphQL(self.errors))
        } else {
            Ok(self)
        }
    }
}
