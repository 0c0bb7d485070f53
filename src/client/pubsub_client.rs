//! Client representation
//!
//! `Client` models a connected client. The transport owns it for the life of
//! the connection; the broker never sees it, only the subscription it opens.

use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::broker::{SharedBroker, SubscriptionId, SubscriptionState, lock};
use crate::transport::message::ServerMessage;
use crate::utils::{Error, Result};

/// A broker subscription plus the task forwarding its broadcasts to the
/// client's outbound queue.
#[derive(Debug)]
pub struct ActiveSubscription {
    pub id: SubscriptionId,
    pub forwarder: JoinHandle<()>,
}

#[derive(Debug)]
pub struct Client {
    pub id: String,
    pub sender: Sender<WsMessage>,
    pub subscription: Option<ActiveSubscription>,
}

impl Client {
    /// Create a new client with a sender channel. The `id` is a UUID used
    /// to identify the client in logs.
    pub fn new(sender: Sender<WsMessage>) -> Self {
        Self {
            id: format!("client-{}", Uuid::new_v4()),
            sender,
            subscription: None,
        }
    }

    /// Queue a reply for the socket, waiting if the outbound queue is full.
    pub async fn send(&self, message: &ServerMessage) -> Result<()> {
        send_json(&self.sender, message).await
    }

    /// Whether the client holds a subscription the broker has not closed.
    ///
    /// A subscription the broker evicted is not live even while its
    /// forwarder is still draining buffered broadcasts.
    pub fn has_live_subscription(&self, broker: &SharedBroker) -> bool {
        self.subscription.as_ref().is_some_and(|active| {
            lock(broker).subscription_state(active.id) != Some(SubscriptionState::Closed)
        })
    }

    /// Drop the client's subscription, if any. Returns whether it was still
    /// live, i.e. not already evicted by the broker.
    ///
    /// The forwarder is stopped before the broker side is removed, so an
    /// explicit unsubscribe never looks like an eviction to the forwarder.
    pub async fn unsubscribe(&mut self, broker: &SharedBroker) -> bool {
        let live = self.has_live_subscription(broker);
        let Some(active) = self.subscription.take() else {
            return false;
        };

        active.forwarder.abort();
        let _ = active.forwarder.await;
        lock(broker).unsubscribe(active.id);
        live
    }
}

pub(crate) async fn send_json(sender: &Sender<WsMessage>, message: &ServerMessage) -> Result<()> {
    let text = serde_json::to_string(message)?;
    sender
        .send(WsMessage::text(text))
        .await
        .map_err(|_| Error::ConnectionClosed)
}
