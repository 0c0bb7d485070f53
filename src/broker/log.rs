//! Append-only message log
//!
//! The log is the single source of truth for message ids: a message's id is
//! its position in the log, so ids are dense, zero-based and strictly
//! increasing. There is no removal, mutation or compaction, and no capacity
//! limit.
//!
//! Storage is copy-on-write. `snapshot` hands out a shared reference to the
//! current contents; an `append` while snapshots are still alive copies the
//! vector first, so a snapshot never observes a later append.

use std::sync::Arc;

use crate::broker::message::{Message, MessageId, Snapshot};

#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Arc<Vec<Message>>,
}

impl MessageLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and return its id. Performs no validation.
    pub fn append(&mut self, user: impl Into<String>, content: impl Into<String>) -> MessageId {
        self.push(user, content).id
    }

    pub(crate) fn push(&mut self, user: impl Into<String>, content: impl Into<String>) -> &Message {
        let messages = Arc::make_mut(&mut self.messages);
        let id = messages.len() as MessageId;
        debug_assert!(
            messages.last().is_none_or(|last| last.id + 1 == id),
            "message log ids must be dense"
        );

        messages.push(Message {
            id,
            user: user.into(),
            content: content.into(),
        });
        &messages[messages.len() - 1]
    }

    /// The current contents in insertion order.
    ///
    /// O(1): the snapshot shares storage with the log until the next append.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(Arc::clone(&self.messages))
    }
}
