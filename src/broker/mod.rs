//! The broker: message log, publish/query and subscriber fan-out.

pub mod engine;
pub mod log;
pub mod message;
pub mod subscription;

pub use engine::{Broker, SharedBroker, lock};
pub use log::MessageLog;
pub use message::{Message, MessageId, Snapshot};
pub use subscription::{
    Broadcast, DeliveryMode, SubscriptionHandle, SubscriptionId, SubscriptionManager,
    SubscriptionState,
};
