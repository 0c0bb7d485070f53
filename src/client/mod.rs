//! The `client` module holds the server-side state of one connected client:
//! its identifier, the bounded outbound queue feeding its socket, and the
//! broker subscription it currently holds, if any.

pub mod pubsub_client;
pub use pubsub_client::{ActiveSubscription, Client};

#[cfg(test)]
mod tests;
