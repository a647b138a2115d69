//! HTTP plumbing for queries and mutations.
//!
//! A pooled `reqwest` client carrying the timeouts and user agent of the
//! GraphQL HTTP link, a JSON `POST` builder, and a response wrapper that maps
//! rejected statuses and unreadable bodies into [`ClientError`](crate::ClientError).
//!
//! ```ignore
//! use sirius_web_client::http::HttpClient;
//!
//! let client = HttpClient::builder()
//!     .timeout(Some(Duration::from_secs(60)))
//!     .build()?;
//!
//! let response: GraphQLResponse = client
//!     .post(&endpoint)
//!     .json(&GraphQLRequest::new("{ viewer { id } }"))?
//!     .send()
//!     .await?
//!     .error_for_status_with_body()
//!     .await?
//!     .json()
//!     .await?;
//! ```

mod client;
mod request;
mod response;

pub use client::{HttpClient, HttpClientBuilder, HttpClientConfig};
pub use request::HttpRequestBuilder;
pub use response::HttpResponse;
