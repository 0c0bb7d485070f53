//! Message definitions for the broker
//!
//! `Message` is the fixed-shape record stored in the log and sent over the
//! wire. It is created only by `MessageLog::append` and never mutated.
//!
//! `Snapshot` is a cheap, shareable, read-only view of the whole log at one
//! point in time. Cloning a snapshot clones a reference count, not the data.

use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Position-derived identifier of a message. The n-th message has id `n`.
pub type MessageId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub user: String,
    pub content: String,
}

/// The complete ordered sequence of messages at some point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(Arc<Vec<Message>>);

impl Snapshot {
    pub(crate) fn new(messages: Arc<Vec<Message>>) -> Self {
        Self(messages)
    }

    /// The most recently appended message, if any.
    pub fn latest(&self) -> Option<&Message> {
        self.0.last()
    }

    /// Whether two snapshots share the same allocation.
    #[cfg(test)]
    pub(crate) fn ptr_eq(&self, other: &Snapshot) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for Snapshot {
    type Target = [Message];

    fn deref(&self) -> &[Message] {
        &self.0
    }
}

impl From<Vec<Message>> for Snapshot {
    fn from(messages: Vec<Message>) -> Self {
        Self(Arc::new(messages))
    }
}
