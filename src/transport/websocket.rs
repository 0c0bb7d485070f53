//! WebSocket transport
//!
//! This file implements the WebSocket server that translates protocol JSON
//! messages into broker operations. Responsibilities:
//! - Accept TCP/WebSocket connections, refusing those over `max_connections`
//! - Create a `Client` for each connection with a bounded outbound queue
//! - Reject invalid input before it reaches the broker
//! - Forward broadcasts from the client's subscription to its socket
//! - Unsubscribe when the socket goes away
//!
//! Backpressure: each connection writes through a bounded queue. A client
//! that reads too slowly stalls only its own forwarding task; once its
//! subscription buffer fills, the broker evicts the subscription and the
//! client is told with an error frame.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, Sender};
use tokio_tungstenite::{WebSocketStream, accept_async};
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::broker::{SharedBroker, SubscriptionHandle, lock};
use crate::client::pubsub_client::send_json;
use crate::client::{ActiveSubscription, Client};
use crate::config::Settings;
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::utils::Result;

/// Bind to the configured address and serve until the listener fails.
pub async fn start_websocket_server(broker: SharedBroker, settings: Settings) -> Result<()> {
    let addr = settings.bind_addr();
    let listener = TcpListener::bind(&addr).await?;

    info!("WebSocket server listening on ws://{addr}");

    serve(listener, broker, settings).await
}

/// Accept connections on an already bound listener.
pub async fn serve(listener: TcpListener, broker: SharedBroker, settings: Settings) -> Result<()> {
    let connections = Arc::new(AtomicUsize::new(0));
    let max_connections = settings.broker.max_connections;
    let outbound_buffer = settings.broker.outbound_buffer.max(1);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept connection: {e}");
                continue;
            }
        };

        let Some(slot) = ConnectionSlot::acquire(&connections, max_connections) else {
            warn!(%peer, max_connections, "connection limit reached, refusing");
            drop(stream);
            continue;
        };

        let broker = broker.clone();

        tokio::spawn(async move {
            let _slot = slot;
            if let Err(e) = handle_connection(stream, broker, outbound_buffer).await {
                warn!(%peer, "Connection ended with error: {e}");
            }
        });
    }
}

/// One occupied connection slot. Dropping it frees the slot, including when
/// the connection task panics.
pub(crate) struct ConnectionSlot(Arc<AtomicUsize>);

impl ConnectionSlot {
    /// Take a slot unless `max` are already in use.
    pub(crate) fn acquire(counter: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .ok()
            .map(|_| Self(Arc::clone(counter)))
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn handle_connection(
    stream: TcpStream,
    broker: SharedBroker,
    outbound_buffer: usize,
) -> Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::channel::<WsMessage>(outbound_buffer);
    let mut client = Client::new(tx);
    let client_id = client.id.clone();

    info!(client = %client_id, "Connected to websocket");

    let send_loop = {
        let client_id = client_id.clone();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = ws_sender.send(msg).await {
                    debug!(client = %client_id, "Failed to send message: {e}");
                    break;
                }
            }
            let _ = ws_sender.close().await;
        })
    };

    let result = receive_loop(&mut ws_receiver, &broker, &mut client).await;

    client.unsubscribe(&broker).await;
    // Last sender gone: the send loop drains what is queued and stops.
    drop(client);
    let _ = send_loop.await;

    info!(client = %client_id, "Disconnected from websocket");
    result
}

async fn receive_loop(
    ws_receiver: &mut SplitStream<WebSocketStream<TcpStream>>,
    broker: &SharedBroker,
    client: &mut Client,
) -> Result<()> {
    while let Some(frame) = ws_receiver.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!(client = %client.id, "Read failed: {e}");
                break;
            }
        };

        match frame {
            WsMessage::Text(text) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(request) => handle_client_message(broker, client, request).await?,
                Err(err) => {
                    warn!(
                        client = %client.id,
                        "Invalid client message: {err} | {}",
                        text.chars().take(100).collect::<String>()
                    );
                    client
                        .send(&ServerMessage::error(format!("invalid message: {err}")))
                        .await?;
                }
            },
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    Ok(())
}

/// Apply one decoded request to the broker and queue the reply.
///
/// The broker lock is only held for the broker call itself, never while
/// waiting on the outbound queue.
pub async fn handle_client_message(
    broker: &SharedBroker,
    client: &mut Client,
    request: ClientMessage,
) -> Result<()> {
    match request {
        ClientMessage::Query => {
            let messages = lock(broker).query();
            client.send(&ServerMessage::Messages { messages }).await
        }
        ClientMessage::Publish { user, content } => {
            if user.is_empty() {
                return client
                    .send(&ServerMessage::error("user must not be empty"))
                    .await;
            }

            let id = lock(broker).publish(user, content);
            debug!(client = %client.id, id, "Published message");
            client.send(&ServerMessage::Published { id }).await
        }
        ClientMessage::Subscribe => {
            if client.has_live_subscription(broker) {
                return client.send(&ServerMessage::error("already subscribed")).await;
            }
            // Evicted earlier: stop the old forwarder before replacing it.
            client.unsubscribe(broker).await;

            let handle = lock(broker).subscribe();
            let id = handle.id();
            info!(client = %client.id, subscription = %id, "Subscribed");

            let forwarder = tokio::spawn(forward_broadcasts(handle, client.sender.clone()));
            client.subscription = Some(ActiveSubscription { id, forwarder });
            Ok(())
        }
        ClientMessage::Unsubscribe => {
            if client.unsubscribe(broker).await {
                info!(client = %client.id, "Unsubscribed");
                client.send(&ServerMessage::Unsubscribed {}).await
            } else {
                client.send(&ServerMessage::error("not subscribed")).await
            }
        }
    }
}

/// Move broadcasts from a subscription into the client's outbound queue.
///
/// The `subscribed` acknowledgement goes through here too, so the client
/// always sees it before the first broadcast.
async fn forward_broadcasts(mut handle: SubscriptionHandle, sender: Sender<WsMessage>) {
    let id = handle.id();

    if send_json(&sender, &ServerMessage::Subscribed { subscription: id })
        .await
        .is_err()
    {
        return;
    }

    while let Some(event) = handle.next().await {
        if let Err(e) = send_json(&sender, &ServerMessage::from(event)).await {
            debug!(subscription = %id, "Stopped forwarding: {e}");
            return;
        }
    }

    // Only reached when the broker closed the subscription on its own.
    debug!(subscription = %id, "Subscription closed by broker");
    let _ = send_json(&sender, &ServerMessage::error("subscription closed")).await;
}
