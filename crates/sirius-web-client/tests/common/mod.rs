//! In-process GraphQL-over-WebSocket server for integration tests.
//!
//! Speaks both subprotocols just enough for the client: acks
//! `connection_init`, answers every `start`/`subscribe` with one event whose
//! payload echoes the subscription id, and answers pings. Documents that
//! mention `completeImmediately` are completed after the event, those that
//! mention `failImmediately` get an `error` instead, and those that mention
//! `malformedPayload` first get an event whose payload is not a GraphQL
//! response.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{HeaderValue, header::SEC_WEBSOCKET_PROTOCOL};

/// What the client asked for during the HTTP upgrade.
#[derive(Clone, Debug)]
pub struct Handshake {
    pub path: String,
    pub protocol: Option<String>,
}

#[derive(Default)]
struct ServerState {
    connections: AtomicUsize,
    closed: AtomicUsize,
    handshakes: Mutex<Vec<Handshake>>,
    subscribed: Mutex<Vec<String>>,
    stopped: Mutex<Vec<String>>,
    terminated: AtomicUsize,
}

pub struct MockSubscriptionServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    kill: broadcast::Sender<()>,
    mute: broadcast::Sender<()>,
}

impl MockSubscriptionServer {
    pub async fn start() -> Self {
        Self::start_with_keep_alive(None).await
    }

    /// Like [`start`](Self::start), sending `ka` on every socket each `interval`.
    pub async fn start_with_keep_alive(interval: Option<Duration>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(ServerState::default());
        let (kill, _) = broadcast::channel(8);
        let (mute, _) = broadcast::channel(8);

        let accept_state = state.clone();
        let accept_kill = kill.clone();
        let accept_mute = mute.clone();
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                tokio::spawn(serve(
                    tcp,
                    accept_state.clone(),
                    accept_kill.subscribe(),
                    accept_mute.subscribe(),
                    interval,
                ));
            }
        });

        Self {
            addr,
            state,
            kill,
            mute,
        }
    }

    /// `ws://127.0.0.1:<port>`
    pub fn origin(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Sockets that completed the WebSocket handshake.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Sockets that have been closed, by either side.
    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn handshakes(&self) -> Vec<Handshake> {
        self.state.handshakes.lock().clone()
    }

    /// Ids received in `start`/`subscribe`, in arrival order.
    pub fn subscribed(&self) -> Vec<String> {
        self.state.subscribed.lock().clone()
    }

    /// Ids received in `stop`/`complete`.
    pub fn stopped(&self) -> Vec<String> {
        self.state.stopped.lock().clone()
    }

    pub fn terminated(&self) -> usize {
        self.state.terminated.load(Ordering::SeqCst)
    }

    /// Drop every open socket without a closing handshake.
    pub fn drop_connections(&self) {
        let _ = self.kill.send(());
    }

    /// Stop writing to every open socket while keeping it open, like a peer
    /// that vanished without closing. Later sockets are unaffected.
    pub fn mute_connections(&self) {
        let _ = self.mute.send(());
    }
}

async fn serve(
    tcp: TcpStream,
    state: Arc<ServerState>,
    mut kill: broadcast::Receiver<()>,
    mut mute: broadcast::Receiver<()>,
    keep_alive: Option<Duration>,
) {
    let handshake_state = state.clone();
    let callback = move |request: &Request,
                          mut response: Response|
          -> Result<Response, ErrorResponse> {
        let protocol = request
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        if let Some(value) = protocol.as_deref().and_then(|p| HeaderValue::from_str(p).ok()) {
            response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
        }
        handshake_state.handshakes.lock().push(Handshake {
            path: request.uri().path().to_owned(),
            protocol,
        });
        Ok(response)
    };

    let Ok(mut socket) = tokio_tungstenite::accept_hdr_async(tcp, callback).await else {
        return;
    };
    state.connections.fetch_add(1, Ordering::SeqCst);

    let mut ka = keep_alive.map(tokio::time::interval);
    let mut muted = false;

    loop {
        tokio::select! {
            _ = kill.recv() => break,
            Ok(_) = mute.recv() => muted = true,
            _ = async {
                match ka.as_mut() {
                    Some(interval) => {
                        interval.tick().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            } => {
                if !muted && socket.send(Message::Text(json!({"type": "ka"}).to_string().into())).await.is_err() {
                    break;
                }
            }
            frame = socket.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };
                if muted {
                    continue;
                }
                let message: Value = serde_json::from_str(text.as_str()).unwrap_or_default();
                let mut delivered = true;
                for reply in respond(&state, &message) {
                    if socket.send(Message::Text(reply.to_string().into())).await.is_err() {
                        delivered = false;
                        break;
                    }
                }
                if !delivered {
                    break;
                }
            }
        }
    }

    state.closed.fetch_add(1, Ordering::SeqCst);
}

fn respond(state: &ServerState, message: &Value) -> Vec<Value> {
    let id = message["id"].as_str().unwrap_or_default().to_owned();
    match message["type"].as_str() {
        Some("connection_init") => vec![json!({"type": "connection_ack"})],
        Some(kind @ ("start" | "subscribe")) => {
            state.subscribed.lock().push(id.clone());
            let query = message["payload"]["query"].as_str().unwrap_or_default();
            let legacy = kind == "start";

            if query.contains("failImmediately") {
                return vec![json!({
                    "type": "error",
                    "id": id,
                    "payload": [{"message": "subscription refused"}]
                })];
            }

            if query.contains("malformedPayload") {
                let malformed = json!({
                    "type": if legacy { "data" } else { "next" },
                    "id": id,
                    "payload": {"data": null, "errors": "boom"}
                });
                let event = json!({
                    "type": if legacy { "data" } else { "next" },
                    "id": id,
                    "payload": {"data": {"event": {"id": id}}}
                });
                return vec![malformed, event];
            }

            let event = json!({
                "type": if legacy { "data" } else { "next" },
                "id": id,
                "payload": {"data": {"event": {"id": id}}}
            });
            if query.contains("completeImmediately") {
                vec![event, json!({"type": "complete", "id": id})]
            } else {
                vec![event]
            }
        }
        Some("stop" | "complete") => {
            state.stopped.lock().push(id);
            Vec::new()
        }
        Some("ping") => vec![json!({"type": "pong"})],
        Some("connection_terminate") => {
            state.terminated.fetch_add(1, Ordering::SeqCst);
            Vec::new()
        }
        _ => Vec::new(),
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn eventually(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
