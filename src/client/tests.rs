use tokio::sync::mpsc;
use tungstenite::protocol::Message as WsMessage;

use super::pubsub_client::Client;
use crate::broker::{Broker, SubscriptionState, lock};
use crate::transport::message::ServerMessage;

#[test]
fn test_client_new() {
    let (tx, _) = mpsc::channel::<WsMessage>(1);
    let client = Client::new(tx);
    assert!(client.id.starts_with("client-"));
    assert!(client.subscription.is_none());
}

#[tokio::test]
async fn test_client_send_serializes_json() {
    let (tx, mut rx) = mpsc::channel::<WsMessage>(1);
    let client = Client::new(tx);

    client.send(&ServerMessage::Published { id: 7 }).await.unwrap();

    let frame = rx.recv().await.unwrap();
    assert_eq!(frame.to_text().unwrap(), r#"{"type":"published","id":7}"#);
}

#[tokio::test]
async fn test_client_send_fails_after_disconnect() {
    let (tx, rx) = mpsc::channel::<WsMessage>(1);
    let client = Client::new(tx);
    drop(rx);

    assert!(client.send(&ServerMessage::Unsubscribed {}).await.is_err());
}

#[tokio::test]
async fn test_client_unsubscribe_closes_broker_subscription() {
    let broker = Broker::new().shared();
    let (tx, _rx) = mpsc::channel::<WsMessage>(1);
    let mut client = Client::new(tx);
    assert!(!client.unsubscribe(&broker).await);

    let handle = lock(&broker).subscribe();
    let id = handle.id();
    client.subscription = Some(super::ActiveSubscription {
        id,
        forwarder: tokio::spawn(async move {
            let _handle = handle;
            std::future::pending::<()>().await;
        }),
    });

    assert!(client.unsubscribe(&broker).await);
    assert!(client.subscription.is_none());
    assert_eq!(
        lock(&broker).subscription_state(id),
        Some(SubscriptionState::Closed)
    );
}

#[tokio::test]
async fn test_evicted_subscription_is_not_live() {
    let broker = Broker::new().shared();
    let (tx, _rx) = mpsc::channel::<WsMessage>(1);
    let mut client = Client::new(tx);

    let mut handle = lock(&broker).subscribe();
    let id = handle.id();
    handle.close();
    client.subscription = Some(super::ActiveSubscription {
        id,
        forwarder: tokio::spawn(std::future::pending::<()>()),
    });

    assert!(!client.has_live_subscription(&broker));
    assert!(!client.unsubscribe(&broker).await);
    assert!(client.subscription.is_none());
}
