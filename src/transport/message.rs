//! JSON protocol spoken over the WebSocket.
//!
//! Every frame is a JSON object whose `type` field names the variant.

use serde::{Deserialize, Serialize};

use crate::broker::{Broadcast, Message, MessageId, Snapshot, SubscriptionId};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Read the current log once.
    #[serde(rename = "query")]
    Query,
    #[serde(rename = "publish")]
    Publish { user: String, content: String },
    #[serde(rename = "subscribe")]
    Subscribe,
    #[serde(rename = "unsubscribe")]
    Unsubscribe,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Reply to `query`.
    #[serde(rename = "messages")]
    Messages { messages: Snapshot },
    #[serde(rename = "published")]
    Published { id: MessageId },
    #[serde(rename = "subscribed")]
    Subscribed { subscription: SubscriptionId },
    #[serde(rename = "unsubscribed")]
    Unsubscribed {},
    /// Broadcast in snapshot delivery mode: the full log.
    #[serde(rename = "snapshot")]
    Snapshot { messages: Snapshot },
    /// Broadcast in delta delivery mode: only the new message.
    #[serde(rename = "appended")]
    Appended { message: Message },
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

impl From<Broadcast> for ServerMessage {
    fn from(event: Broadcast) -> Self {
        match event {
            Broadcast::Snapshot(messages) => ServerMessage::Snapshot { messages },
            Broadcast::Appended(message) => ServerMessage::Appended { message },
        }
    }
}
