//! Long-lived query handles.

use tokio::sync::watch;

use super::client::GraphQLClient;
use super::request::GraphQLRequest;
use super::response::GraphQLResponse;
use crate::error::Result;

/// A query that can be refetched and observed.
///
/// Every fetch follows the client's `watch_query` fetch policy. The latest
/// successful response is published on a `tokio::sync::watch` channel; any
/// number of observers can follow it with [`observe`](Self::observe).
///
/// ```ignore
/// let watcher = client.watch_query(GraphQLRequest::new("{ projects { id } }"))?;
/// let mut updates = watcher.observe();
/// watcher.refetch().await?;
/// updates.changed().await?;
/// ```
#[derive(Debug)]
pub struct QueryWatcher {
    client: GraphQLClient,
    request: GraphQLRequest,
    latest: watch::Sender<Option<GraphQLResponse>>,
}

impl QueryWatcher {
    pub(crate) fn new(client: GraphQLClient, request: GraphQLRequest) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            client,
            request,
            latest,
        }
    }

    /// The watched request.
    pub fn request(&self) -> &GraphQLRequest {
        &self.request
    }

    /// The current result of the query.
    ///
    /// Fetches unless the `watch_query` policy reads the cache and a response
    /// was already published. Use [`current`](Self::current) to read the last
    /// response without fetching.
    pub async fn result(&self) -> Result<GraphQLResponse> {
        if self.client.default_options().watch_query.reads_cache()
            && let Some(response) = self.current()
        {
            return Ok(response);
        }
        self.refetch().await
    }

    /// Execute the query again and publish the response to observers.
    ///
    /// Errors go to the caller only; observers keep the previous response.
    pub async fn refetch(&self) -> Result<GraphQLResponse> {
        let policy = self.client.default_options().watch_query;
        let response = self
            .client
            .query_with_policy(self.request.clone(), policy)
            .await?;
        self.latest.send_replace(Some(response.clone()));
        Ok(response)
    }

    /// Follow the responses published by this watcher.
    ///
    /// The receiver starts at the current value, `None` until the first fetch.
    pub fn observe(&self) -> watch::Receiver<Option<GraphQLResponse>> {
        self.latest.subscribe()
    }

    /// The last published response, without fetching.
    pub fn current(&self) -> Option<GraphQLResponse> {
        self.latest.borrow().clone()
    }
}
