//! Shared subscription socket.
//!
//! All subscriptions of a client are multiplexed over one WebSocket. The
//! socket is opened by the first subscription, kept while any subscription is
//! active, and closed when the last one ends. A later subscription opens a
//! fresh socket.
//!
//! One background task owns the socket. Callers talk to it through an
//! unbounded command channel; the task routes server messages to each
//! subscription's own channel by id. Dropping the command sender tells the
//! task to close the socket.

use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, header::SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use super::protocol::{ClientMessage, ServerMessage, SubscribePayload, WebSocketProtocol};
use super::request::GraphQLRequest;
use super::response::{GraphQLError, GraphQLResponse};
use crate::error::{ClientError, Result};
use crate::websocket::{ConnectionEvents, ConnectionState, ReconnectConfig};

const TARGET: &str = "sirius_web_client::subscription";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SocketSink = SplitSink<Socket, Message>;
type SocketStream = SplitStream<Socket>;
type EventSender = mpsc::UnboundedSender<Result<GraphQLResponse>>;

/// Settings of the subscription socket.
#[derive(Debug, Clone)]
pub(crate) struct SubscriptionLinkConfig {
    pub url: Url,
    pub protocol: WebSocketProtocol,
    pub init_payload: Option<Value>,
    /// Bounds both the TCP/WebSocket handshake and the wait for `connection_ack`.
    pub connect_timeout: Duration,
    /// Client ping interval; only used by `graphql-transport-ws`.
    pub keep_alive: Option<Duration>,
    /// Longest silence tolerated once the server has sent a `ka`; only used
    /// by `graphql-ws`.
    pub keep_alive_timeout: Option<Duration>,
    /// `None` disables reconnection: a lost socket fails every subscription.
    pub reconnect: Option<ReconnectConfig>,
}

enum Command {
    Subscribe { id: String, payload: SubscribePayload },
    Stop { id: String },
}

struct ActiveSubscription {
    payload: SubscribePayload,
    sender: EventSender,
}

#[derive(Default)]
struct LinkState {
    connection: ConnectionState,
    subscriptions: HashMap<String, ActiveSubscription>,
    /// Present while a socket task is alive.
    commands: Option<mpsc::UnboundedSender<Command>>,
    /// The current socket has been acknowledged.
    ready: bool,
    /// Bumped whenever a socket task is started or retired; stale tasks
    /// compare against it before touching the state.
    generation: u64,
}

impl LinkState {
    /// Detach the running task; it closes its socket once it notices.
    fn retire(&mut self) {
        self.commands = None;
        self.ready = false;
        self.connection = ConnectionState::Disconnected;
        self.generation += 1;
    }
}

struct LinkShared {
    config: SubscriptionLinkConfig,
    state: Mutex<LinkState>,
    next_id: AtomicU64,
    events: ConnectionEvents,
}

/// Handle to the shared subscription socket. Clones share one socket.
#[derive(Clone)]
pub(crate) struct SubscriptionLink {
    shared: Arc<LinkShared>,
}

impl std::fmt::Debug for SubscriptionLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("SubscriptionLink")
            .field("url", &self.shared.config.url.as_str())
            .field("protocol", &self.shared.config.protocol)
            .field("connection", &state.connection)
            .field("subscriptions", &state.subscriptions.len())
            .finish()
    }
}

impl SubscriptionLink {
    pub(crate) fn new(config: SubscriptionLinkConfig) -> Self {
        Self {
            shared: Arc::new(LinkShared {
                config,
                state: Mutex::new(LinkState::default()),
                next_id: AtomicU64::new(1),
                events: ConnectionEvents::default(),
            }),
        }
    }

    pub(crate) fn url(&self) -> &Url {
        &self.shared.config.url
    }

    pub(crate) fn connection_state(&self) -> ConnectionState {
        self.shared.state.lock().connection
    }

    pub(crate) fn events(&self) -> &ConnectionEvents {
        &self.shared.events
    }

    /// Number of subscriptions currently holding the socket open.
    pub(crate) fn active_subscriptions(&self) -> usize {
        self.shared.state.lock().subscriptions.len()
    }

    /// Register a subscription, opening the socket if none is running.
    ///
    /// Must be called within a tokio runtime.
    pub(crate) fn subscribe(&self, request: GraphQLRequest) -> Result<SubscriptionStream> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ClientError::WebSocket(format!("no async runtime: {e}")))?;

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let payload = SubscribePayload::from(request);
        let (sender, receiver) = mpsc::unbounded_channel();

        let started = {
            let mut state = self.shared.state.lock();
            state.subscriptions.insert(
                id.clone(),
                ActiveSubscription {
                    payload: payload.clone(),
                    sender,
                },
            );

            match &state.commands {
                Some(commands) => {
                    // Before the ack the task subscribes everything in the map itself.
                    if state.ready {
                        let _ = commands.send(Command::Subscribe {
                            id: id.clone(),
                            payload,
                        });
                    }
                    false
                }
                None => {
                    let (commands, command_rx) = mpsc::unbounded_channel();
                    state.commands = Some(commands);
                    state.ready = false;
                    state.connection = ConnectionState::Connecting;
                    state.generation += 1;
                    runtime.spawn(run(self.shared.clone(), command_rx, state.generation));
                    true
                }
            }
        };

        tracing::debug!(target: TARGET, id = %id, "subscription started");
        if started {
            self.shared.events.connecting.emit(());
        }

        Ok(SubscriptionStream {
            receiver,
            id,
            link: Some(self.clone()),
        })
    }

    /// Drop a subscription; closes the socket if it was the last one.
    fn release(&self, id: &str) {
        let mut state = self.shared.state.lock();
        if state.subscriptions.remove(id).is_none() {
            return;
        }
        tracing::debug!(target: TARGET, id = %id, "subscription released");

        if state.ready
            && let Some(commands) = &state.commands
        {
            let _ = commands.send(Command::Stop { id: id.to_owned() });
        }
        if state.subscriptions.is_empty() {
            state.retire();
        }
    }

    fn deliver(&self, id: &str, event: Result<GraphQLResponse>) {
        let state = self.shared.state.lock();
        match state.subscriptions.get(id) {
            Some(subscription) => {
                let _ = subscription.sender.send(event);
            }
            None => tracing::trace!(target: TARGET, id = %id, "event for unknown subscription"),
        }
    }

    /// Server-side end of a subscription, with an optional final event.
    fn finish(&self, id: &str, generation: u64, last: Option<Result<GraphQLResponse>>) {
        let mut state = self.shared.state.lock();
        let Some(subscription) = state.subscriptions.remove(id) else {
            return;
        };
        if let Some(event) = last {
            let _ = subscription.sender.send(event);
        }
        if state.subscriptions.is_empty() && state.generation == generation {
            state.retire();
        }
    }

    /// Mark the socket acknowledged and snapshot what must be (re)subscribed.
    fn mark_ready(&self, generation: u64) -> Option<Vec<(String, SubscribePayload)>> {
        let mut state = self.shared.state.lock();
        if state.generation != generation {
            return None;
        }
        state.ready = true;
        state.connection = ConnectionState::Connected;
        Some(
            state
                .subscriptions
                .iter()
                .map(|(id, subscription)| (id.clone(), subscription.payload.clone()))
                .collect(),
        )
    }

    /// Returns `false` if the task should stop instead of reconnecting.
    fn mark_lost(&self, generation: u64) -> bool {
        let mut state = self.shared.state.lock();
        if state.generation != generation {
            return false;
        }
        state.ready = false;
        if state.subscriptions.is_empty() {
            state.retire();
            return false;
        }
        state.connection = ConnectionState::Reconnecting;
        true
    }

    /// Give up on the socket: every active subscription receives `error`.
    fn fail_all(&self, generation: u64, error: ClientError) {
        let failed: Vec<EventSender> = {
            let mut state = self.shared.state.lock();
            if state.generation != generation {
                return;
            }
            let failed = state.subscriptions.drain().map(|(_, s)| s.sender).collect();
            state.retire();
            failed
        };

        tracing::warn!(
            target: TARGET,
            subscriptions = failed.len(),
            error = %error,
            "subscription socket gave up"
        );
        for sender in failed {
            let _ = sender.send(Err(error.clone()));
        }
    }
}

enum SessionEnd {
    /// Every subscription ended; the socket was closed on purpose.
    Released,
    /// The socket dropped or misbehaved.
    Lost(ClientError),
}

/// Socket task: connect, serve, reconnect, until released or out of attempts.
async fn run(
    shared: Arc<LinkShared>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    generation: u64,
) {
    let link = SubscriptionLink { shared };
    let config = &link.shared.config;
    let mut attempt: u32 = 0;

    loop {
        let error = match open(config).await {
            Ok((sink, stream)) => {
                let Some(snapshot) = link.mark_ready(generation) else {
                    tracing::debug!(target: TARGET, "socket no longer needed after handshake");
                    close(sink, config.protocol).await;
                    return;
                };
                attempt = 0;
                tracing::info!(
                    target: TARGET,
                    url = %config.url,
                    protocol = %config.protocol,
                    resubscribed = snapshot.len(),
                    "subscription socket connected"
                );
                link.shared.events.connected.emit(());

                let end = serve(&link, sink, stream, &mut commands, generation, snapshot).await;
                link.shared.events.disconnected.emit(());
                match end {
                    SessionEnd::Released => {
                        tracing::info!(target: TARGET, "subscription socket closed");
                        return;
                    }
                    SessionEnd::Lost(error) => error,
                }
            }
            Err(error) => error,
        };

        if !link.mark_lost(generation) {
            return;
        }
        let Some(reconnect) = &config.reconnect else {
            link.fail_all(generation, error);
            return;
        };
        if !reconnect.allows_attempt(attempt) {
            link.fail_all(generation, error);
            return;
        }

        let delay = reconnect.delay_for_attempt(attempt);
        attempt += 1;
        tracing::warn!(
            target: TARGET,
            error = %error,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "subscription socket lost, reconnecting"
        );
        link.shared.events.reconnecting.emit(attempt);

        // Pending commands are stale: the next ack resubscribes from the map.
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                command = commands.recv() => {
                    if command.is_none() {
                        tracing::debug!(target: TARGET, "released while reconnecting");
                        return;
                    }
                }
            }
        }
    }
}

/// Open the socket and complete the `connection_init`/`connection_ack` exchange.
async fn open(config: &SubscriptionLinkConfig) -> Result<(SocketSink, SocketStream)> {
    let mut request = config.url.as_str().into_client_request()?;
    request.headers_mut().insert(
        SEC_WEBSOCKET_PROTOCOL,
        HeaderValue::from_static(config.protocol.subprotocol()),
    );

    tracing::debug!(target: TARGET, url = %config.url, "opening subscription socket");
    let (socket, _) = tokio::time::timeout(
        config.connect_timeout,
        tokio_tungstenite::connect_async(request),
    )
    .await
    .map_err(|_| ClientError::Timeout)??;

    let (mut sink, mut stream) = socket.split();
    send(&mut sink, &config.protocol.init(config.init_payload.clone())).await?;

    tokio::time::timeout(config.connect_timeout, await_ack(&mut sink, &mut stream))
        .await
        .map_err(|_| ClientError::Timeout)??;

    Ok((sink, stream))
}

async fn await_ack(sink: &mut SocketSink, stream: &mut SocketStream) -> Result<()> {
    while let Some(frame) = stream.next().await {
        let text = match frame? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        match serde_json::from_str::<ServerMessage>(text.as_str()) {
            Ok(ServerMessage::ConnectionAck { .. }) => return Ok(()),
            Ok(ServerMessage::ConnectionError { payload }) => {
                return Err(ClientError::Protocol(format!(
                    "connection rejected: {}",
                    payload.unwrap_or(Value::Null)
                )));
            }
            Ok(ServerMessage::Ping { payload }) => {
                send(sink, &ClientMessage::Pong { payload }).await?;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(target: TARGET, error = %e, "unreadable message during handshake");
            }
        }
    }
    Err(ClientError::Connection(
        "socket closed before connection_ack".into(),
    ))
}

/// Drive an acknowledged socket until it is released or lost.
async fn serve(
    link: &SubscriptionLink,
    mut sink: SocketSink,
    mut stream: SocketStream,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    generation: u64,
    snapshot: Vec<(String, SubscribePayload)>,
) -> SessionEnd {
    let protocol = link.shared.config.protocol;
    // Ids subscribed on this socket; guards against a queued command
    // duplicating the snapshot.
    let mut sent = HashSet::new();

    for (id, payload) in snapshot {
        sent.insert(id.clone());
        if let Err(e) = send(&mut sink, &protocol.subscribe(id, payload)).await {
            return SessionEnd::Lost(e);
        }
    }

    let mut keep_alive = link
        .shared
        .config
        .keep_alive
        .filter(|_| protocol.client_pings())
        .map(|period| tokio::time::interval_at(tokio::time::Instant::now() + period, period));

    // Armed by the first `ka`; servers that never send one are not timed out.
    let ka_timeout = link
        .shared
        .config
        .keep_alive_timeout
        .filter(|_| !protocol.client_pings());
    let mut liveness: Option<Pin<Box<tokio::time::Sleep>>> = None;

    loop {
        tokio::select! {
            command = commands.recv() => {
                let message = match command {
                    Some(Command::Subscribe { id, payload }) => {
                        if !sent.insert(id.clone()) {
                            continue;
                        }
                        protocol.subscribe(id, payload)
                    }
                    Some(Command::Stop { id }) => {
                        if !sent.remove(&id) {
                            continue;
                        }
                        protocol.stop(id)
                    }
                    None => {
                        close(sink, protocol).await;
                        return SessionEnd::Released;
                    }
                };
                if let Err(e) = send(&mut sink, &message).await {
                    return SessionEnd::Lost(e);
                }
            }
            frame = stream.next() => {
                if let (Some(deadline), Some(timeout)) = (liveness.as_mut(), ka_timeout) {
                    deadline.as_mut().reset(tokio::time::Instant::now() + timeout);
                }
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(frame))) => {
                        let message = match frame.filter(|f| !f.reason.is_empty()) {
                            Some(f) => format!("socket closed by server: {}", f.reason.as_str()),
                            None => "socket closed by server".to_owned(),
                        };
                        return SessionEnd::Lost(ClientError::Connection(message));
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return SessionEnd::Lost(e.into()),
                    None => {
                        return SessionEnd::Lost(ClientError::Connection(
                            "socket closed by server".into(),
                        ));
                    }
                };

                let message = match serde_json::from_str::<ServerMessage>(text.as_str()) {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::warn!(target: TARGET, error = %e, "ignoring unreadable message");
                        continue;
                    }
                };

                match message {
                    ServerMessage::Next { id, payload } | ServerMessage::Data { id, payload } => {
                        let event = serde_json::from_value::<GraphQLResponse>(payload);
                        if let Err(e) = &event {
                            tracing::warn!(target: TARGET, id = %id, error = %e, "malformed subscription payload");
                        }
                        link.deliver(&id, event.map_err(ClientError::from));
                    }
                    ServerMessage::Error { id, payload } => {
                        sent.remove(&id);
                        let errors = GraphQLError::list_from_value(payload);
                        link.finish(&id, generation, Some(Err(ClientError::GraphQL(errors))));
                    }
                    ServerMessage::Complete { id } => {
                        sent.remove(&id);
                        link.finish(&id, generation, None);
                    }
                    ServerMessage::Ping { payload } => {
                        if let Err(e) = send(&mut sink, &ClientMessage::Pong { payload }).await {
                            return SessionEnd::Lost(e);
                        }
                    }
                    ServerMessage::ConnectionError { payload } => {
                        return SessionEnd::Lost(ClientError::Protocol(format!(
                            "connection error: {}",
                            payload.unwrap_or(Value::Null)
                        )));
                    }
                    ServerMessage::Ka => {
                        if liveness.is_none()
                            && let Some(timeout) = ka_timeout
                        {
                            liveness = Some(Box::pin(tokio::time::sleep(timeout)));
                        }
                    }
                    ServerMessage::Pong { .. } | ServerMessage::ConnectionAck { .. } => {}
                }
            }
            _ = async {
                match liveness.as_mut() {
                    Some(deadline) => deadline.as_mut().await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                tracing::warn!(target: TARGET, "no keep-alive from server");
                return SessionEnd::Lost(ClientError::Connection(
                    "server keep-alive timed out".into(),
                ));
            }
            _ = async {
                match keep_alive.as_mut() {
                    Some(interval) => {
                        interval.tick().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            } => {
                if let Err(e) = send(&mut sink, &ClientMessage::Ping { payload: None }).await {
                    return SessionEnd::Lost(e);
                }
            }
        }
    }
}

async fn send(sink: &mut SocketSink, message: &ClientMessage) -> Result<()> {
    let text = serde_json::to_string(message)?;
    sink.send(Message::Text(text.into())).await?;
    Ok(())
}

async fn close(mut sink: SocketSink, protocol: WebSocketProtocol) {
    if let Some(terminate) = protocol.terminate() {
        let _ = send(&mut sink, &terminate).await;
    }
    let _ = sink.close().await;
}

/// Events of one subscription.
///
/// Yields `Ok` for each `next`/`data` payload. A server `error` is yielded
/// as a final `Err`; the stream ends after server `complete` or after the
/// socket gives up reconnecting. Dropping the stream unsubscribes.
pub struct SubscriptionStream {
    receiver: mpsc::UnboundedReceiver<Result<GraphQLResponse>>,
    id: String,
    link: Option<SubscriptionLink>,
}

impl SubscriptionStream {
    /// Receive the next event, or `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<Result<GraphQLResponse>> {
        self.receiver.recv().await
    }

    /// Stop the subscription and release its hold on the socket.
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    /// The id used for this subscription on the socket.
    pub fn id(&self) -> &str {
        &self.id
    }

    fn detach(&mut self) {
        if let Some(link) = self.link.take() {
            link.release(&self.id);
        }
    }
}

impl Stream for SubscriptionStream {
    type Item = Result<GraphQLResponse>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for SubscriptionStream {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for SubscriptionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionStream")
            .field("id", &self.id)
            .field("active", &self.link.is_some())
            .finish()
    }
}
