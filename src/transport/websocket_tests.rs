use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tungstenite::protocol::Message as WsMessage;

use crate::broker::{Broker, SharedBroker, lock};
use crate::config::Settings;
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::transport::serve;

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn setup_server(settings: Settings) -> (String, SharedBroker) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().unwrap();
    let broker = Broker::with_settings(&settings.broker).shared();

    tokio::spawn(serve(listener, broker.clone(), settings));

    (format!("ws://{addr}"), broker)
}

async fn connect(url: &str) -> Ws {
    let (ws_stream, _) = connect_async(url).await.expect("WebSocket handshake failed");
    ws_stream
}

async fn send(ws: &mut Ws, msg: &ClientMessage) {
    ws.send(WsMessage::Text(serde_json::to_string(msg).unwrap().into()))
        .await
        .expect("send");
}

async fn recv(ws: &mut Ws) -> ServerMessage {
    let frame = timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for server")
        .expect("stream ended")
        .expect("read failed");
    let raw_data = frame.into_data();
    serde_json::from_slice(&raw_data).unwrap_or_else(|e| {
        panic!("Failed to deserialize ServerMessage from '{raw_data:?}': {e}");
    })
}

/// Wait until the broker reports `count` live subscribers.
async fn wait_for_subscribers(broker: &SharedBroker, count: usize) {
    timeout(Duration::from_secs(5), async {
        while lock(broker).subscriber_count() != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscriber count never reached");
}

fn publish(user: &str, content: &str) -> ClientMessage {
    ClientMessage::Publish {
        user: user.to_string(),
        content: content.to_string(),
    }
}

#[tokio::test]
async fn test_publish_query_and_snapshot_broadcast() {
    let (url, _broker) = setup_server(Settings::default()).await;
    let mut publisher = connect(&url).await;
    let mut subscriber = connect(&url).await;

    send(&mut publisher, &publish("alice", "hi")).await;
    assert_eq!(recv(&mut publisher).await, ServerMessage::Published { id: 0 });

    send(&mut publisher, &ClientMessage::Query).await;
    match recv(&mut publisher).await {
        ServerMessage::Messages { messages } => {
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].user, "alice");
        }
        other => panic!("Expected messages, got {other:?}"),
    }

    send(&mut subscriber, &ClientMessage::Subscribe).await;
    assert!(matches!(
        recv(&mut subscriber).await,
        ServerMessage::Subscribed { .. }
    ));

    send(&mut publisher, &publish("bob", "yo")).await;
    assert_eq!(recv(&mut publisher).await, ServerMessage::Published { id: 1 });

    match recv(&mut subscriber).await {
        ServerMessage::Snapshot { messages } => {
            let users: Vec<&str> = messages.iter().map(|m| m.user.as_str()).collect();
            assert_eq!(users, ["alice", "bob"]);
            assert_eq!(messages[1].id, 1);
            assert_eq!(messages[1].content, "yo");
        }
        other => panic!("Expected snapshot, got {other:?}"),
    }
}

#[tokio::test]
async fn test_two_subscribers_receive_same_snapshot() {
    let (url, broker) = setup_server(Settings::default()).await;
    let mut first = connect(&url).await;
    let mut second = connect(&url).await;
    let mut publisher = connect(&url).await;

    for ws in [&mut first, &mut second] {
        send(ws, &ClientMessage::Subscribe).await;
        assert!(matches!(recv(ws).await, ServerMessage::Subscribed { .. }));
    }
    wait_for_subscribers(&broker, 2).await;

    send(&mut publisher, &publish("carol", "hello")).await;

    let a = recv(&mut first).await;
    let b = recv(&mut second).await;
    assert!(matches!(a, ServerMessage::Snapshot { .. }));
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_disconnect_unsubscribes() {
    let (url, broker) = setup_server(Settings::default()).await;
    let mut subscriber = connect(&url).await;

    send(&mut subscriber, &ClientMessage::Subscribe).await;
    assert!(matches!(
        recv(&mut subscriber).await,
        ServerMessage::Subscribed { .. }
    ));
    wait_for_subscribers(&broker, 1).await;

    subscriber.close(None).await.expect("close");
    wait_for_subscribers(&broker, 0).await;

    // Publishing afterwards still works for everyone else.
    let mut publisher = connect(&url).await;
    send(&mut publisher, &publish("alice", "still here")).await;
    assert_eq!(recv(&mut publisher).await, ServerMessage::Published { id: 0 });
}

#[tokio::test]
async fn test_invalid_frame_keeps_connection_open() {
    let (url, _broker) = setup_server(Settings::default()).await;
    let mut ws = connect(&url).await;

    ws.send(WsMessage::Text("not json".into())).await.unwrap();
    assert!(matches!(recv(&mut ws).await, ServerMessage::Error { .. }));

    send(&mut ws, &publish("", "anonymous")).await;
    assert_eq!(
        recv(&mut ws).await,
        ServerMessage::error("user must not be empty")
    );

    send(&mut ws, &publish("dave", "")).await;
    assert_eq!(recv(&mut ws).await, ServerMessage::Published { id: 0 });
}

#[tokio::test]
async fn test_delta_delivery_over_websocket() {
    let mut settings = Settings::default();
    settings.broker.delivery = crate::broker::DeliveryMode::Delta;
    let (url, _broker) = setup_server(settings).await;
    let mut ws = connect(&url).await;

    send(&mut ws, &ClientMessage::Subscribe).await;
    assert!(matches!(recv(&mut ws).await, ServerMessage::Subscribed { .. }));

    send(&mut ws, &publish("erin", "delta")).await;

    // The acknowledgement and the broadcast travel on different tasks.
    let mut replies = vec![recv(&mut ws).await, recv(&mut ws).await];
    replies.sort_by_key(|reply| matches!(reply, ServerMessage::Appended { .. }));
    assert_eq!(replies[0], ServerMessage::Published { id: 0 });
    match &replies[1] {
        ServerMessage::Appended { message } => {
            assert_eq!(message.id, 0);
            assert_eq!(message.user, "erin");
        }
        other => panic!("Expected appended, got {other:?}"),
    }
}

#[tokio::test]
async fn test_connection_limit_refuses_extra_clients() {
    let mut settings = Settings::default();
    settings.broker.max_connections = 1;
    let (url, _broker) = setup_server(settings).await;

    let mut first = connect(&url).await;
    send(&mut first, &ClientMessage::Query).await;
    assert!(matches!(recv(&mut first).await, ServerMessage::Messages { .. }));

    assert!(connect_async(url.as_str()).await.is_err());
}
