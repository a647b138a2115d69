//! JSON `POST` builder.

use http::header::{HeaderName, HeaderValue};
use serde::Serialize;

use super::response::HttpResponse;
use crate::error::Result;

/// A `POST` being assembled; nothing is sent until [`send`](Self::send).
#[derive(Debug)]
pub struct HttpRequestBuilder {
    inner: reqwest::RequestBuilder,
}

impl HttpRequestBuilder {
    pub(crate) fn new(inner: reqwest::RequestBuilder) -> Self {
        Self { inner }
    }

    /// Add a header.
    pub fn header(self, name: HeaderName, value: HeaderValue) -> Self {
        Self {
            inner: self.inner.header(name, value),
        }
    }

    /// Serialize `body` as the JSON request body.
    ///
    /// Serialization happens here so that a failure is reported as
    /// [`ClientError::Json`](crate::ClientError::Json) before anything is sent.
    pub fn json<T: Serialize>(self, body: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(body)?;
        Ok(Self {
            inner: self.inner.body(bytes),
        })
    }

    /// Send the request and wait for the response head.
    pub async fn send(self) -> Result<HttpResponse> {
        let response = self.inner.send().await?;
        Ok(HttpResponse::from_reqwest(response))
    }
}
