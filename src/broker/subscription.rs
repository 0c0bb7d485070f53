//! Subscription management
//!
//! The `SubscriptionManager` keeps the set of live subscribers keyed by
//! `SubscriptionId` and fans each broadcast out to them.
//!
//! Every subscription owns a bounded channel. Fan-out never waits: a
//! subscriber whose buffer is full, or whose receiving side has gone away,
//! is removed from the active set during that same broadcast. Eviction
//! rather than dropping a single event keeps the delivered sequence free of
//! gaps for as long as the subscription is active.
//!
//! Concurrency note: the manager is not synchronized on its own. It lives
//! inside the `Broker`, which callers hold behind one lock.

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::{debug, warn};

use crate::broker::message::{Message, Snapshot};

/// Default number of undelivered broadcasts a subscriber may lag behind
/// before it is evicted.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Lifecycle of a subscription. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Registered, nothing delivered yet.
    Pending,
    /// At least one broadcast delivered.
    Active,
    Closed,
}

/// What a publish hands to subscribers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// The full log as of the publish.
    #[default]
    Snapshot,
    /// Only the message that was just appended.
    Delta,
}

/// One event delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Broadcast {
    Snapshot(Snapshot),
    Appended(Message),
}

impl Broadcast {
    /// The full log carried by a snapshot broadcast.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            Broadcast::Snapshot(snapshot) => Some(snapshot),
            Broadcast::Appended(_) => None,
        }
    }

    /// The newest message carried by this event.
    pub fn latest(&self) -> Option<&Message> {
        match self {
            Broadcast::Snapshot(snapshot) => snapshot.latest(),
            Broadcast::Appended(message) => Some(message),
        }
    }
}

struct Subscription {
    sender: mpsc::Sender<Broadcast>,
    state: SubscriptionState,
}

/// Receiving side of a subscription.
///
/// Yields broadcasts published after the subscription was created, in
/// publish order. The sequence ends once the subscription is closed, either
/// by `Broker::unsubscribe` or by eviction. Dropping the handle (or calling
/// `close`) counts as unsubscribing.
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    receiver: mpsc::Receiver<Broadcast>,
}

impl SubscriptionHandle {
    /// The id to pass to `Broker::unsubscribe`.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next broadcast. `None` means the subscription is closed
    /// and everything delivered before closing has been drained.
    pub async fn recv(&mut self) -> Option<Broadcast> {
        self.receiver.recv().await
    }

    /// Take the next buffered broadcast without waiting.
    pub fn try_recv(&mut self) -> Result<Broadcast, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Stop receiving. Already buffered broadcasts can still be drained.
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

impl Stream for SubscriptionHandle {
    type Item = Broadcast;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Broadcast>> {
        self.receiver.poll_recv(cx)
    }
}

pub struct SubscriptionManager {
    subscriptions: HashMap<SubscriptionId, Subscription>,
    next_id: u64,
    buffer: usize,
}

impl SubscriptionManager {
    /// Create a manager whose subscribers buffer up to
    /// `DEFAULT_SUBSCRIBER_BUFFER` broadcasts.
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_SUBSCRIBER_BUFFER)
    }

    /// A zero buffer is raised to one; a subscriber must be able to hold at
    /// least the event currently being delivered.
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            subscriptions: HashMap::new(),
            next_id: 0,
            buffer: buffer.max(1),
        }
    }

    /// Register a new subscription in the `Pending` state.
    ///
    /// Ids are issued in increasing order and never reused, so a closed id
    /// can always be told apart from one never issued.
    pub fn subscribe(&mut self) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        let (sender, receiver) = mpsc::channel(self.buffer);
        self.subscriptions.insert(
            id,
            Subscription {
                sender,
                state: SubscriptionState::Pending,
            },
        );

        SubscriptionHandle { id, receiver }
    }

    /// Remove a subscription. Its stream ends once buffered events are
    /// drained. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscriptions.remove(&id).is_some()
    }

    /// Deliver `event` to every active subscriber and return how many
    /// accepted it. Subscribers that cannot accept it are removed.
    pub fn broadcast(&mut self, event: &Broadcast) -> usize {
        let mut delivered = 0;

        self.subscriptions
            .retain(|id, subscription| match subscription.sender.try_send(event.clone()) {
                Ok(()) => {
                    subscription.state = SubscriptionState::Active;
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    warn!(subscription = %id, "subscriber buffer full, closing subscription");
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(subscription = %id, "subscriber went away, removing");
                    false
                }
            });

        delivered
    }

    /// Current lifecycle state of a subscription.
    ///
    /// `None` for an id this manager never issued. A subscription whose
    /// handle was dropped or closed reports `Closed` right away.
    pub fn state(&self, id: SubscriptionId) -> Option<SubscriptionState> {
        if id.0 >= self.next_id {
            return None;
        }

        Some(match self.subscriptions.get(&id) {
            Some(subscription) if subscription.sender.is_closed() => SubscriptionState::Closed,
            Some(subscription) => subscription.state,
            None => SubscriptionState::Closed,
        })
    }

    /// Number of subscriptions whose receiver is still open.
    ///
    /// Subscriptions whose handle was dropped stop counting at once, even
    /// before the next broadcast removes them.
    pub fn active_count(&self) -> usize {
        self.subscriptions
            .values()
            .filter(|subscription| !subscription.sender.is_closed())
            .count()
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("subscriptions", &self.subscriptions.len())
            .field("next_id", &self.next_id)
            .field("buffer", &self.buffer)
            .finish()
    }
}
