//! In-memory response cache and fetch policies.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Deserialize;

use super::request::GraphQLRequest;
use super::response::GraphQLResponse;

/// How an operation interacts with the response cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchPolicy {
    /// Serve a cached response when present; otherwise fetch and store.
    CacheFirst,
    /// Always fetch; store the result.
    NetworkOnly,
    /// Always fetch; never read or write the cache.
    #[default]
    NoCache,
}

impl FetchPolicy {
    pub(crate) fn reads_cache(self) -> bool {
        matches!(self, Self::CacheFirst)
    }

    pub(crate) fn writes_cache(self) -> bool {
        !matches!(self, Self::NoCache)
    }
}

/// Fetch policy per operation category.
///
/// The default bypasses the cache for every category, so each execution
/// goes to the network.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DefaultOptions {
    /// Policy for [`watch_query`](crate::GraphQLClient::watch_query) fetches.
    pub watch_query: FetchPolicy,
    /// Policy for [`query`](crate::GraphQLClient::query).
    pub query: FetchPolicy,
    /// Policy for [`mutate`](crate::GraphQLClient::mutate). Mutations never read
    /// the cache, whatever this says.
    pub mutate: FetchPolicy,
}

/// Responses keyed by `(query, variables, operationName)`.
///
/// Only error-free responses are stored. There is no invalidation besides
/// [`clear`](Self::clear).
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: Mutex<HashMap<String, GraphQLResponse>>,
}

impl ResponseCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the cached response for a request.
    pub fn get(&self, request: &GraphQLRequest) -> Option<GraphQLResponse> {
        self.entries.lock().get(&request.cache_key()).cloned()
    }

    pub(crate) fn store(&self, request: &GraphQLRequest, response: &GraphQLResponse) {
        if response.has_errors() {
            return;
        }
        self.entries
            .lock()
            .insert(request.cache_key(), response.clone());
    }

    /// Number of cached responses.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every cached response.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
