//! The `transport` module maps WebSocket frames onto broker operations.
//!
//! It owns everything the broker deliberately does not: accepting
//! connections, input validation, JSON encoding, and turning a socket
//! disconnect into an unsubscribe.

pub mod message;
pub mod websocket;

pub use message::{ClientMessage, ServerMessage};
pub use websocket::{handle_client_message, serve, start_websocket_server};

#[cfg(test)]
mod websocket_tests;
