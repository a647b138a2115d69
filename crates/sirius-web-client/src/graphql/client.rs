//! Client configuration, HTTP link, and the routing client handle.

use std::sync::Arc;
use std::time::Duration;

use http::HeaderValue;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use super::cache::{DefaultOptions, FetchPolicy, ResponseCache};
use super::document::{self, Transport};
use super::protocol::WebSocketProtocol;
use super::request::{GraphQLRequest, OperationType};
use super::response::GraphQLResponse;
use super::subscription::{SubscriptionLink, SubscriptionLinkConfig, SubscriptionStream};
use super::watch::QueryWatcher;
use crate::credentials::CredentialHeader;
use crate::error::{ClientError, Result};
use crate::http::HttpClient;
use crate::websocket::{ConnectionEvents, ConnectionState, ReconnectConfig};

/// Path of the GraphQL HTTP endpoint below the HTTP origin.
pub const HTTP_PATH: &str = "/api/graphql";

/// Path of the subscription endpoint below the WebSocket origin.
pub const WS_PATH: &str = "/subscriptions";

/// Everything needed to build a [`GraphQLClient`].
///
/// Built once at startup. Endpoint syntax is checked here; reachability is
/// not.
#[derive(Clone, Debug)]
pub struct ClientConfiguration {
    http_endpoint: Url,
    ws_endpoint: Url,
    credential_header: CredentialHeader,
    default_options: DefaultOptions,
    protocol: WebSocketProtocol,
    reconnect: Option<ReconnectConfig>,
    request_timeout: Option<Duration>,
    connect_timeout: Duration,
    keep_alive: Option<Duration>,
    keep_alive_timeout: Option<Duration>,
    connection_init_payload: Option<Value>,
    user_agent: Option<String>,
}

impl ClientConfiguration {
    /// Create a configuration from two full endpoint URLs.
    ///
    /// The HTTP endpoint must use `http`/`https`, the subscription endpoint
    /// `ws`/`wss`.
    pub fn new(
        http_endpoint: &str,
        ws_endpoint: &str,
        credential_header: CredentialHeader,
    ) -> Result<Self> {
        let http_endpoint = parse_endpoint(http_endpoint, &["http", "https"])?;
        let ws_endpoint = parse_endpoint(ws_endpoint, &["ws", "wss"])?;

        Ok(Self {
            http_endpoint,
            ws_endpoint,
            credential_header,
            default_options: DefaultOptions::default(),
            protocol: WebSocketProtocol::default(),
            reconnect: Some(ReconnectConfig::default()),
            request_timeout: Some(Duration::from_secs(30)),
            connect_timeout: Duration::from_secs(10),
            keep_alive: Some(Duration::from_secs(30)),
            keep_alive_timeout: Some(Duration::from_secs(60)),
            connection_init_payload: None,
            user_agent: None,
        })
    }

    /// Create a configuration from server origins.
    ///
    /// ```
    /// use sirius_web_client::{ClientConfiguration, CredentialHeader};
    ///
    /// let config = ClientConfiguration::from_origins(
    ///     "https://api.example.com",
    ///     "wss://api.example.com/",
    ///     CredentialHeader::basic("system", "012345678910"),
    /// )
    /// .unwrap();
    /// assert_eq!(config.http_endpoint().as_str(), "https://api.example.com/api/graphql");
    /// assert_eq!(config.ws_endpoint().as_str(), "wss://api.example.com/subscriptions");
    /// ```
    pub fn from_origins(
        http_origin: &str,
        ws_origin: &str,
        credential_header: CredentialHeader,
    ) -> Result<Self> {
        Self::new(
            &format!("{}{HTTP_PATH}", http_origin.trim_end_matches('/')),
            &format!("{}{WS_PATH}", ws_origin.trim_end_matches('/')),
            credential_header,
        )
    }

    /// Set the fetch policy per operation category.
    pub fn with_default_options(mut self, options: DefaultOptions) -> Self {
        self.default_options = options;
        self
    }

    /// Set the GraphQL-over-WebSocket subprotocol.
    pub fn with_protocol(mut self, protocol: WebSocketProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set the reconnection policy; `None` fails subscriptions on the first drop.
    pub fn with_reconnect(mut self, reconnect: Option<ReconnectConfig>) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the HTTP request timeout; `None` disables it.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the connect timeout, used for HTTP connects and the socket handshake.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the client ping interval (`graphql-transport-ws` only).
    pub fn with_keep_alive(mut self, interval: Option<Duration>) -> Self {
        self.keep_alive = interval;
        self
    }

    /// Set how long the socket may stay silent after the server started
    /// sending `ka` messages (`graphql-ws` only). On expiry the socket is
    /// treated as lost and reconnected. `None` disables the check.
    pub fn with_keep_alive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.keep_alive_timeout = timeout;
        self
    }

    /// Set the `connection_init` payload sent when the socket opens.
    pub fn with_connection_init_payload(mut self, payload: impl Serialize) -> Self {
        self.connection_init_payload = serde_json::to_value(payload).ok();
        self
    }

    /// Override the HTTP user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// URL for queries and mutations.
    pub fn http_endpoint(&self) -> &Url {
        &self.http_endpoint
    }

    /// URL for subscriptions.
    pub fn ws_endpoint(&self) -> &Url {
        &self.ws_endpoint
    }

    /// The `Authorization` value sent with every HTTP operation.
    pub fn credential_header(&self) -> &CredentialHeader {
        &self.credential_header
    }

    /// Fetch policy per operation category.
    pub fn default_options(&self) -> DefaultOptions {
        self.default_options
    }

    /// The WebSocket subprotocol.
    pub fn protocol(&self) -> WebSocketProtocol {
        self.protocol
    }

    /// The reconnection policy.
    pub fn reconnect(&self) -> Option<&ReconnectConfig> {
        self.reconnect.as_ref()
    }
}

fn parse_endpoint(endpoint: &str, schemes: &[&str]) -> Result<Url> {
    let url = Url::parse(endpoint)?;
    if !schemes.contains(&url.scheme()) {
        return Err(ClientError::InvalidUrl(format!(
            "{endpoint}: expected scheme {}",
            schemes.join(" or ")
        )));
    }
    Ok(url)
}

/// Stateless link: one authenticated POST per operation.
#[derive(Clone, Debug)]
struct HttpLink {
    client: HttpClient,
    endpoint: Url,
    authorization: HeaderValue,
}

impl HttpLink {
    async fn execute(&self, request: &GraphQLRequest) -> Result<GraphQLResponse> {
        tracing::debug!(
            target: "sirius_web_client::http",
            endpoint = %self.endpoint,
            operation = request.operation_name.as_deref().unwrap_or("<anonymous>"),
            "POST GraphQL operation"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .header(AUTHORIZATION, self.authorization.clone())
            .json(request)?
            .send()
            .await?;

        let response = match response.error_for_status_with_body().await {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(
                    target: "sirius_web_client::http",
                    endpoint = %self.endpoint,
                    error = %error,
                    "GraphQL request rejected"
                );
                return Err(error);
            }
        };

        response.json().await
    }
}

/// Result of [`GraphQLClient::execute`].
#[derive(Debug)]
pub enum Execution {
    /// A query or mutation answered over HTTP.
    Response(GraphQLResponse),
    /// A subscription running on the shared socket.
    Stream(SubscriptionStream),
}

impl Execution {
    /// The HTTP response, if this was a query or mutation.
    pub fn into_response(self) -> Option<GraphQLResponse> {
        match self {
            Self::Response(response) => Some(response),
            Self::Stream(_) => None,
        }
    }

    /// The subscription stream, if this was a subscription.
    pub fn into_stream(self) -> Option<SubscriptionStream> {
        match self {
            Self::Stream(stream) => Some(stream),
            Self::Response(_) => None,
        }
    }
}

struct ClientInner {
    configuration: ClientConfiguration,
    http: HttpLink,
    subscriptions: SubscriptionLink,
    cache: ResponseCache,
}

/// GraphQL client for a Sirius Web server.
///
/// Queries and mutations go over HTTP; subscriptions share one lazily opened
/// WebSocket. The handle is cheap to clone and clones share the socket, the
/// HTTP connection pool and the response cache.
///
/// ```ignore
/// let client = create_client(
///     "https://api.example.com/api/graphql",
///     "wss://api.example.com/subscriptions",
///     CredentialHeader::basic("system", "012345678910"),
/// )?;
///
/// let response = client.query(GraphQLRequest::new("{ viewer { id } }")).await?;
/// let mut events = client.subscribe(GraphQLRequest::new(
///     "subscription { projectEvent(input: {projectId: \"p\"}) { __typename } }",
/// ))?;
/// while let Some(event) = events.next().await {
///     println!("{:?}", event?);
/// }
/// ```
#[derive(Clone)]
pub struct GraphQLClient {
    inner: Arc<ClientInner>,
}

impl GraphQLClient {
    /// Build a client. No connection is opened.
    pub fn from_configuration(configuration: ClientConfiguration) -> Result<Self> {
        let mut builder = HttpClient::builder()
            .connect_timeout(configuration.connect_timeout)
            .timeout(configuration.request_timeout);
        if let Some(user_agent) = &configuration.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let http = HttpLink {
            client: builder.build()?,
            endpoint: configuration.http_endpoint.clone(),
            authorization: configuration.credential_header.to_header_value()?,
        };

        let subscriptions = SubscriptionLink::new(SubscriptionLinkConfig {
            url: configuration.ws_endpoint.clone(),
            protocol: configuration.protocol,
            init_payload: configuration.connection_init_payload.clone(),
            connect_timeout: configuration.connect_timeout,
            keep_alive: configuration.keep_alive,
            keep_alive_timeout: configuration.keep_alive_timeout,
            reconnect: configuration.reconnect.clone(),
        });

        tracing::debug!(
            target: "sirius_web_client::graphql",
            http_endpoint = %configuration.http_endpoint,
            ws_endpoint = %configuration.ws_endpoint,
            protocol = %configuration.protocol,
            "GraphQL client created"
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                configuration,
                http,
                subscriptions,
                cache: ResponseCache::new(),
            }),
        })
    }

    /// The configuration this client was built from.
    pub fn configuration(&self) -> &ClientConfiguration {
        &self.inner.configuration
    }

    /// URL for queries and mutations.
    pub fn http_endpoint(&self) -> &Url {
        &self.inner.configuration.http_endpoint
    }

    /// URL for subscriptions.
    pub fn ws_endpoint(&self) -> &Url {
        self.inner.subscriptions.url()
    }

    /// Fetch policy per operation category.
    pub fn default_options(&self) -> DefaultOptions {
        self.inner.configuration.default_options
    }

    /// Run any operation, routed by its document.
    ///
    /// Subscriptions start a stream on the shared socket. Mutations use the
    /// `mutate` policy; queries and fragment-only documents the `query` policy.
    pub async fn execute(&self, request: GraphQLRequest) -> Result<Execution> {
        let transport = document::select_transport(&request);
        tracing::trace!(target: "sirius_web_client::graphql", %transport, "routing operation");

        match transport {
            Transport::WebSocket => self.inner.subscriptions.subscribe(request).map(Execution::Stream),
            Transport::Http => {
                let response = if document::operation_type(&request.query) == OperationType::Mutation {
                    self.send_mutation(request).await?
                } else {
                    self.fetch(request, self.default_options().query).await?
                };
                Ok(Execution::Response(response))
            }
        }
    }

    /// Run a query with the default `query` policy.
    pub async fn query(&self, request: GraphQLRequest) -> Result<GraphQLResponse> {
        self.query_with_policy(request, self.default_options().query)
            .await
    }

    /// Run a query with an explicit fetch policy.
    pub async fn query_with_policy(
        &self,
        request: GraphQLRequest,
        policy: FetchPolicy,
    ) -> Result<GraphQLResponse> {
        reject_subscription(&request, "query")?;
        self.fetch(request, policy).await
    }

    /// Run a mutation. Mutations never read the cache.
    pub async fn mutate(&self, request: GraphQLRequest) -> Result<GraphQLResponse> {
        reject_subscription(&request, "mutate")?;
        self.send_mutation(request).await
    }

    /// Create a long-lived handle for a query. Nothing is fetched yet.
    pub fn watch_query(&self, request: GraphQLRequest) -> Result<QueryWatcher> {
        reject_subscription(&request, "watch_query")?;
        Ok(QueryWatcher::new(self.clone(), request))
    }

    /// Start a subscription, opening the shared socket if needed.
    ///
    /// Must be called within a tokio runtime.
    pub fn subscribe(&self, request: GraphQLRequest) -> Result<SubscriptionStream> {
        if document::select_transport(&request) != Transport::WebSocket {
            return Err(ClientError::InvalidOperation(
                "subscribe() requires a subscription document".into(),
            ));
        }
        self.inner.subscriptions.subscribe(request)
    }

    /// State of the shared subscription socket.
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.subscriptions.connection_state()
    }

    /// Lifecycle signals of the shared subscription socket.
    pub fn connection_events(&self) -> &ConnectionEvents {
        self.inner.subscriptions.events()
    }

    /// Number of subscriptions currently holding the socket open.
    pub fn active_subscriptions(&self) -> usize {
        self.inner.subscriptions.active_subscriptions()
    }

    /// The response cache used by `CacheFirst` and `NetworkOnly`.
    pub fn cache(&self) -> &ResponseCache {
        &self.inner.cache
    }

    async fn fetch(&self, request: GraphQLRequest, policy: FetchPolicy) -> Result<GraphQLResponse> {
        if policy.reads_cache()
            && let Some(cached) = self.inner.cache.get(&request)
        {
            tracing::debug!(target: "sirius_web_client::graphql", "served from cache");
            return Ok(cached);
        }

        let response = self.inner.http.execute(&request).await?;
        if policy.writes_cache() {
            self.inner.cache.store(&request, &response);
        }
        Ok(response)
    }

    async fn send_mutation(&self, request: GraphQLRequest) -> Result<GraphQLResponse> {
        let response = self.inner.http.execute(&request).await?;
        if self.default_options().mutate.writes_cache() {
            self.inner.cache.store(&request, &response);
        }
        Ok(response)
    }
}

impl std::fmt::Debug for GraphQLClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphQLClient")
            .field("http_endpoint", &self.inner.configuration.http_endpoint.as_str())
            .field("subscriptions", &self.inner.subscriptions)
            .finish()
    }
}

fn reject_subscription(request: &GraphQLRequest, method: &str) -> Result<()> {
    if document::select_transport(request) == Transport::WebSocket {
        return Err(ClientError::InvalidOperation(format!(
            "{method}() cannot run a subscription document; use subscribe()"
        )));
    }
    Ok(())
}

/// Build a client from two endpoint URLs and a pre-encoded credential.
///
/// Endpoint syntax is validated; nothing is connected. The subscription
/// socket opens on the first subscription.
pub fn create_client(
    http_endpoint: &str,
    ws_endpoint: &str,
    credential_header: CredentialHeader,
) -> Result<GraphQLClient> {
    GraphQLClient::from_configuration(ClientConfiguration::new(
        http_endpoint,
        ws_endpoint,
        credential_header,
    )?)
}
