//! Broker engine
//!
//! The broker owns the message log and the active subscriptions and exposes
//! the boundary operations `publish`, `query`, `subscribe` and
//! `unsubscribe`.
//!
//! Concurrency and usage notes:
//! - The API is synchronous and designed to be held behind a single lock
//!   (`SharedBroker`). That lock is what serializes publishes against each
//!   other and against subscribe/unsubscribe, so ids are never duplicated and
//!   a broadcast is never delivered to half of a changing subscriber set.
//! - Fan-out never blocks, so holding the lock across `publish` is cheap.
//!   Callers must not hold it across network I/O.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::broker::log::MessageLog;
use crate::broker::message::{MessageId, Snapshot};
use crate::broker::subscription::{
    Broadcast, DeliveryMode, SubscriptionHandle, SubscriptionId, SubscriptionManager,
    SubscriptionState,
};
use crate::config::BrokerSettings;

pub type SharedBroker = Arc<Mutex<Broker>>;

/// Lock a shared broker. A panic while the lock was held cannot leave the
/// log or the subscriber set half-updated, so poisoning is ignored.
pub fn lock(broker: &SharedBroker) -> MutexGuard<'_, Broker> {
    broker.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct Broker {
    log: MessageLog,
    subscriptions: SubscriptionManager,
    delivery: DeliveryMode,
}

impl Broker {
    /// Create a broker with an empty log, the default subscriber buffer and
    /// full-snapshot delivery.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a broker using the buffer size and delivery mode from
    /// configuration.
    pub fn with_settings(settings: &BrokerSettings) -> Self {
        Self {
            log: MessageLog::new(),
            subscriptions: SubscriptionManager::with_buffer(settings.subscriber_buffer),
            delivery: settings.delivery,
        }
    }

    /// Wrap the broker in the lock every caller shares.
    pub fn shared(self) -> SharedBroker {
        Arc::new(Mutex::new(self))
    }

    /// What each publish hands to subscribers.
    pub fn delivery(&self) -> DeliveryMode {
        self.delivery
    }

    /// Append a message and broadcast it to every active subscriber.
    ///
    /// In `DeliveryMode::Snapshot` each subscriber receives the whole log as
    /// of this publish, all sharing one allocation. In `DeliveryMode::Delta`
    /// they receive only the new message.
    pub fn publish(&mut self, user: impl Into<String>, content: impl Into<String>) -> MessageId {
        let message = self.log.push(user, content);
        let id = message.id;

        let event = match self.delivery {
            DeliveryMode::Snapshot => Broadcast::Snapshot(self.log.snapshot()),
            DeliveryMode::Delta => Broadcast::Appended(message.clone()),
        };

        let delivered = self.subscriptions.broadcast(&event);
        debug!(id, delivered, "published message");
        id
    }

    /// One-shot read of the current log.
    pub fn query(&self) -> Snapshot {
        self.log.snapshot()
    }

    /// Register a subscriber. It receives only broadcasts published after
    /// this call, never a replay of history.
    pub fn subscribe(&mut self) -> SubscriptionHandle {
        let handle = self.subscriptions.subscribe();
        debug!(subscription = %handle.id(), "subscribed");
        handle
    }

    /// Returns false if the subscription was already closed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let removed = self.subscriptions.unsubscribe(id);
        if removed {
            debug!(subscription = %id, "unsubscribed");
        }
        removed
    }

    /// Lifecycle state of a subscription; `None` if the id was never issued.
    ///
    /// Evicted, unsubscribed and dropped subscriptions are all `Closed`.
    pub fn subscription_state(&self, id: SubscriptionId) -> Option<SubscriptionState> {
        self.subscriptions.state(id)
    }

    /// Number of subscribers that would receive the next broadcast.
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.active_count()
    }

    /// Number of messages published so far.
    pub fn message_count(&self) -> usize {
        self.log.snapshot().len()
    }
}
