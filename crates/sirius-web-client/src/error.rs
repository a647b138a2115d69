//! Error types for the GraphQL client.

use std::path::PathBuf;

use crate::graphql::GraphQLError;

/// Errors surfaced by client operations.
///
/// Transport failures are mapped into this taxonomy and handed to the caller
/// of the operation that hit them. Nothing is retried or masked.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP request error: {0}")]
    Request(String),

    /// An operation was passed to the wrong entry point; nothing was sent.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Invalid URL provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Request or handshake timed out.
    #[error("Request timed out")]
    Timeout,

    /// Connection refused or failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Invalid header name or value.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// HTTP error status (4xx or 5xx), including authentication rejections.
    #[error("HTTP {status}{}", .message.as_ref().map(|m| format!(": {m}")).unwrap_or_default())]
    HttpStatus {
        /// The HTTP status code.
        status: u16,
        /// Optional error message from the response body.
        message: Option<String>,
    },

    /// Errors reported by the GraphQL server.
    #[error("GraphQL error: {}", join_messages(.0))]
    GraphQL(Vec<GraphQLError>),

    /// WebSocket transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// GraphQL-over-WebSocket protocol violation.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid or incomplete client settings.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failed to read a settings file.
    #[error("Failed to read '{}': {message}", .path.display())]
    Io {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying I/O error message.
        message: String,
    },
}

impl ClientError {
    /// Create an I/O error for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Check whether the server rejected the credentials (HTTP 401 or 403).
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::HttpStatus { status: 401 | 403, .. })
    }
}

fn join_messages(errors: &[GraphQLError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else if err.is_decode() {
            Self::Json(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<toml::de::Error> for ClientError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::Io(e) => Self::Connection(e.to_string()),
            WsError::Url(e) => Self::InvalidUrl(e.to_string()),
            other => Self::WebSocket(other.to_string()),
        }
    }
}

impl From<http::header::InvalidHeaderName> for ClientError {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for ClientError {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

/// A specialized Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
