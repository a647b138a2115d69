//! HTTP response wrapper.

use serde::de::DeserializeOwned;

use crate::error::{ClientError, Result};

/// Response of an [`HttpRequestBuilder`](super::HttpRequestBuilder).
pub struct HttpResponse {
    inner: reqwest::Response,
}

impl HttpResponse {
    pub(crate) fn from_reqwest(response: reqwest::Response) -> Self {
        Self { inner: response }
    }

    /// The HTTP status code.
    pub fn status(&self) -> u16 {
        self.inner.status().as_u16()
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        self.inner.status().is_success()
    }

    /// Parse the response body as JSON.
    ///
    /// The body is read fully first so that a malformed payload is reported
    /// as [`ClientError::Json`] rather than a transport error.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        let bytes = self.inner.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Return the response if its status is 2xx, otherwise an
    /// [`ClientError::HttpStatus`] carrying the body text.
    pub async fn error_for_status_with_body(self) -> Result<Self> {
        let status = self.status();
        if self.is_success() {
            Ok(self)
        } else {
            let message = self.inner.text().await.ok().filter(|body| !body.is_empty());
            Err(ClientError::HttpStatus { status, message })
        }
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status())
            .field("url", &self.inner.url().as_str())
            .finish()
    }
}
