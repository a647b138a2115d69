//! Pooled HTTP client.

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use super::request::HttpRequestBuilder;
use crate::error::Result;

/// Timeouts and user agent applied to every request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpClientConfig {
    /// Whole-request timeout; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// `User-Agent` header value.
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("SiriusWebClient/{} (Rust)", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Builder for [`HttpClient`].
#[derive(Debug, Default)]
pub struct HttpClientBuilder {
    config: HttpClientConfig,
}

impl HttpClientBuilder {
    /// Start from [`HttpClientConfig::default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the whole-request timeout; `None` disables it.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the user agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Build the client. Nothing is connected yet.
    pub fn build(self) -> Result<HttpClient> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.config.connect_timeout)
            .user_agent(self.config.user_agent.as_str());
        if let Some(timeout) = self.config.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(HttpClient {
            client: builder.build()?,
            config: Arc::new(self.config),
        })
    }
}

/// Cheaply cloneable; clones share one connection pool.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    config: Arc<HttpClientConfig>,
}

impl HttpClient {
    /// Create a builder.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// The settings this client was built with.
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Start a `POST` to `url`.
    pub fn post(&self, url: &Url) -> HttpRequestBuilder {
        HttpRequestBuilder::new(self.client.post(url.clone()))
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .finish()
    }
}
