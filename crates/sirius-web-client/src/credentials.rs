//! Static `Authorization` header attached to HTTP operations.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::HeaderValue;

use crate::error::Result;

/// An opaque, pre-encoded `Authorization` header value.
///
/// The value is fixed for the lifetime of the client that carries it.
/// `Debug` output never shows the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialHeader(String);

impl CredentialHeader {
    /// Wrap an already encoded header value, e.g. `"Basic c3lzdGVtOi4uLg=="`.
    pub fn from_raw(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Build an HTTP Basic credential from a username and password.
    ///
    /// ```
    /// use sirius_web_client::CredentialHeader;
    ///
    /// let header = CredentialHeader::basic("user", "pass");
    /// assert_eq!(header.as_str(), "Basic dXNlcjpwYXNz");
    /// ```
    pub fn basic(username: &str, password: &str) -> Self {
        let encoded = STANDARD.encode(format!("{username}:{password}"));
        Self(format!("Basic {encoded}"))
    }

    /// The header value as sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert into a header value, marked sensitive so it is not logged by `http`.
    pub(crate) fn to_header_value(&self) -> Result<HeaderValue> {
        let mut value = HeaderValue::from_str(&self.0)?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for CredentialHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = self.0.split_whitespace().next().unwrap_or_default();
        f.debug_tuple("CredentialHeader")
            .field(&format_args!("{scheme} <redacted>"))
            .finish()
    }
}
