//! Subscription socket tests against an in-process GraphQL WebSocket server.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use common::{MockSubscriptionServer, eventually};
use futures_util::StreamExt;
use sirius_web_client::{
    ClientConfiguration, ClientError, ConnectionState, CredentialHeader, Execution, GraphQLClient,
    GraphQLRequest, GraphQLResponse, ReconnectConfig, SubscriptionStream, WebSocketProtocol,
};

const WAIT: Duration = Duration::from_secs(5);

fn configuration(ws_origin: &str) -> ClientConfiguration {
    ClientConfiguration::from_origins(
        "http://127.0.0.1:9",
        ws_origin,
        CredentialHeader::basic("system", "012345678910"),
    )
    .unwrap()
    .with_connect_timeout(Duration::from_secs(2))
    .with_reconnect(Some(
        ReconnectConfig::new()
            .initial_delay(Duration::from_millis(50))
            .max_delay(Duration::from_millis(200)),
    ))
}

fn client(server: &MockSubscriptionServer) -> GraphQLClient {
    GraphQLClient::from_configuration(configuration(&server.origin())).unwrap()
}

fn subscription(field: &str) -> GraphQLRequest {
    GraphQLRequest::new(format!("subscription Events {{ {field} {{ id }} }}"))
}

async fn next_event(stream: &mut SubscriptionStream) -> Option<sirius_web_client::Result<GraphQLResponse>> {
    tokio::time::timeout(WAIT, stream.next())
        .await
        .expect("timed out waiting for a subscription event")
}

fn event_id(response: &GraphQLResponse) -> String {
    response.data.as_ref().unwrap()["event"]["id"]
        .as_str()
        .unwrap()
        .to_owned()
}

#[tokio::test]
async fn test_no_socket_until_first_subscription() {
    let server = MockSubscriptionServer::start().await;
    let client = client(&server);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.connections(), 0);
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);

    let mut stream = client.subscribe(subscription("projectEvent")).unwrap();
    let event = next_event(&mut stream).await.unwrap().unwrap();
    assert_eq!(event_id(&event), stream.id());

    assert_eq!(server.connections(), 1);
    assert_eq!(client.connection_state(), ConnectionState::Connected);

    let handshake = &server.handshakes()[0];
    assert_eq!(handshake.path, "/subscriptions");
    assert_eq!(handshake.protocol.as_deref(), Some("graphql-ws"));
}

#[tokio::test]
async fn test_concurrent_subscriptions_share_one_socket() {
    let server = MockSubscriptionServer::start().await;
    let client = client(&server);

    let mut first = client.subscribe(subscription("projectEvent")).unwrap();
    let mut second = client.subscribe(subscription("representationEvent")).unwrap();
    assert_ne!(first.id(), second.id());

    let a = next_event(&mut first).await.unwrap().unwrap();
    let b = next_event(&mut second).await.unwrap().unwrap();
    assert_eq!(event_id(&a), first.id());
    assert_eq!(event_id(&b), second.id());

    assert_eq!(server.connections(), 1);
    assert_eq!(server.subscribed().len(), 2);
    assert_eq!(client.active_subscriptions(), 2);
}

#[tokio::test]
async fn test_socket_closes_after_last_subscription_and_reopens() {
    let server = MockSubscriptionServer::start().await;
    let client = client(&server);

    let mut first = client.subscribe(subscription("projectEvent")).unwrap();
    let mut second = client.subscribe(subscription("representationEvent")).unwrap();
    next_event(&mut first).await.unwrap().unwrap();
    next_event(&mut second).await.unwrap().unwrap();

    let first_id = first.id().to_owned();
    first.unsubscribe();
    assert!(eventually(WAIT, || server.stopped() == vec![first_id.clone()]).await);
    assert_eq!(server.closed(), 0, "socket must stay open for the remaining subscription");

    drop(second);
    assert!(eventually(WAIT, || server.closed() == 1).await);
    assert_eq!(server.stopped().len(), 2);
    assert_eq!(server.terminated(), 1);
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);

    let mut third = client.subscribe(subscription("projectEvent")).unwrap();
    next_event(&mut third).await.unwrap().unwrap();
    assert_eq!(server.connections(), 2);
}

#[tokio::test]
async fn test_reconnects_and_resubscribes_after_drop() {
    let server = MockSubscriptionServer::start().await;
    let client = client(&server);

    let reconnects = Arc::new(AtomicU32::new(0));
    let counter = reconnects.clone();
    client.connection_events().reconnecting.connect(move |attempt| {
        counter.store(*attempt, Ordering::SeqCst);
    });

    let mut stream = client.subscribe(subscription("projectEvent")).unwrap();
    next_event(&mut stream).await.unwrap().unwrap();

    server.drop_connections();

    // The resubscription on the new socket produces a fresh event for the same id.
    let replayed = next_event(&mut stream).await.unwrap().unwrap();
    assert_eq!(event_id(&replayed), stream.id());

    assert_eq!(server.connections(), 2);
    assert_eq!(
        server.subscribed(),
        vec![stream.id().to_owned(), stream.id().to_owned()]
    );
    assert_eq!(reconnects.load(Ordering::SeqCst), 1);
    assert_eq!(client.connection_state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_server_complete_ends_stream() {
    let server = MockSubscriptionServer::start().await;
    let client = client(&server);

    let mut stream = client.subscribe(subscription("completeImmediately")).unwrap();
    assert!(next_event(&mut stream).await.unwrap().is_ok());
    assert!(next_event(&mut stream).await.is_none());

    // It was the only subscription, so the socket goes away too.
    assert!(eventually(WAIT, || server.closed() == 1).await);
    assert_eq!(client.active_subscriptions(), 0);
}

#[tokio::test]
async fn test_server_error_is_yielded_then_stream_ends() {
    let server = MockSubscriptionServer::start().await;
    let client = client(&server);

    let mut stream = client.subscribe(subscription("failImmediately")).unwrap();
    match next_event(&mut stream).await {
        Some(Err(ClientError::GraphQL(errors))) => {
            assert_eq!(errors[0].message, "subscription refused");
        }
        other => panic!("expected a GraphQL error, got {other:?}"),
    }
    assert!(next_event(&mut stream).await.is_none());
}

#[tokio::test]
async fn test_graphql_transport_ws_protocol() {
    let server = MockSubscriptionServer::start().await;
    let client = GraphQLClient::from_configuration(
        configuration(&server.origin())
            .with_protocol(WebSocketProtocol::GraphqlTransportWs)
            .with_keep_alive(Some(Duration::from_millis(20))),
    )
    .unwrap();

    let mut stream = client.subscribe(subscription("projectEvent")).unwrap();
    let event = next_event(&mut stream).await.unwrap().unwrap();
    assert_eq!(event_id(&event), stream.id());
    assert_eq!(
        server.handshakes()[0].protocol.as_deref(),
        Some("graphql-transport-ws")
    );

    // Keep-alive pings do not disturb the session.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.connections(), 1);
    assert_eq!(client.connection_state(), ConnectionState::Connected);

    drop(stream);
    assert!(eventually(WAIT, || server.stopped().len() == 1).await);
    assert_eq!(server.terminated(), 0);
}

#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    let client = GraphQLClient::from_configuration(
        configuration("ws://127.0.0.1:1")
            .with_reconnect(Some(ReconnectConfig::new().max_attempts(0))),
    )
    .unwrap();

    let mut stream = client.subscribe(subscription("projectEvent")).unwrap();
    assert!(matches!(next_event(&mut stream).await, Some(Err(_))));
    assert!(next_event(&mut stream).await.is_none());
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    assert_eq!(client.active_subscriptions(), 0);
}

#[tokio::test]
async fn test_lifecycle_signals() {
    let server = MockSubscriptionServer::start().await;
    let client = client(&server);

    let connecting = Arc::new(AtomicUsize::new(0));
    let connected = Arc::new(AtomicUsize::new(0));
    let disconnected = Arc::new(AtomicUsize::new(0));
    let events = client.connection_events();
    let c = connecting.clone();
    events.connecting.connect(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    let c = connected.clone();
    events.connected.connect(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    let c = disconnected.clone();
    events.disconnected.connect(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    let mut first = client.subscribe(subscription("projectEvent")).unwrap();
    let mut second = client.subscribe(subscription("projectEvent")).unwrap();
    next_event(&mut first).await.unwrap().unwrap();
    next_event(&mut second).await.unwrap().unwrap();

    assert_eq!(connecting.load(Ordering::SeqCst), 1);
    assert_eq!(connected.load(Ordering::SeqCst), 1);

    drop(first);
    drop(second);
    assert!(eventually(WAIT, || disconnected.load(Ordering::SeqCst) == 1).await);
}

#[tokio::test]
async fn test_execute_routes_subscriptions_to_socket() {
    let server = MockSubscriptionServer::start().await;
    let client = client(&server);

    let execution = client.execute(subscription("projectEvent")).await.unwrap();
    let Execution::Stream(mut stream) = execution else {
        panic!("subscription was not routed to the socket");
    };
    assert!(next_event(&mut stream).await.unwrap().is_ok());
    assert_eq!(server.connections(), 1);
}

#[tokio::test]
async fn test_stream_trait_yields_events() {
    let server = MockSubscriptionServer::start().await;
    let client = client(&server);

    let stream = client.subscribe(subscription("completeImmediately")).unwrap();
    let events: Vec<_> = tokio::time::timeout(WAIT, stream.collect::<Vec<_>>())
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0].is_ok());
}

#[tokio::test]
async fn test_malformed_payload_reaches_subscriber() {
    let server = MockSubscriptionServer::start().await;
    let client = client(&server);

    let mut stream = client.subscribe(subscription("malformedPayload")).unwrap();
    match next_event(&mut stream).await {
        Some(Err(ClientError::Json(_))) => {}
        other => panic!("expected a JSON error, got {other:?}"),
    }

    // The subscription stays alive for the next well-formed event.
    let event = next_event(&mut stream).await.unwrap().unwrap();
    assert_eq!(event_id(&event), stream.id());
    assert_eq!(client.active_subscriptions(), 1);
    assert_eq!(server.connections(), 1);
}

#[tokio::test]
async fn test_silent_server_after_keep_alive_is_reconnected() {
    let server = MockSubscriptionServer::start_with_keep_alive(Some(Duration::from_millis(50))).await;
    let client = GraphQLClient::from_configuration(
        configuration(&server.origin()).with_keep_alive_timeout(Some(Duration::from_millis(300))),
    )
    .unwrap();

    let mut stream = client.subscribe(subscription("projectEvent")).unwrap();
    next_event(&mut stream).await.unwrap().unwrap();

    // Regular `ka` messages keep the socket alive past the timeout.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(server.connections(), 1);
    assert_eq!(client.connection_state(), ConnectionState::Connected);

    server.mute_connections();

    let replayed = next_event(&mut stream).await.unwrap().unwrap();
    assert_eq!(event_id(&replayed), stream.id());
    assert_eq!(server.connections(), 2);
    assert_eq!(
        server.subscribed(),
        vec![stream.id().to_owned(), stream.id().to_owned()]
    );
}

#[tokio::test]
async fn test_server_without_keep_alive_is_not_timed_out() {
    let server = MockSubscriptionServer::start().await;
    let client = GraphQLClient::from_configuration(
        configuration(&server.origin()).with_keep_alive_timeout(Some(Duration::from_millis(100))),
    )
    .unwrap();

    let mut stream = client.subscribe(subscription("projectEvent")).unwrap();
    next_event(&mut stream).await.unwrap().unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(server.connections(), 1);
    assert_eq!(client.connection_state(), ConnectionState::Connected);
}
