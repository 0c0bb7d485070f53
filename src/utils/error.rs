//! Errors surfaced by the transport and the binary.
//!
//! Broker operations themselves never fail: delivery problems are handled
//! per subscriber inside the fan-out and never reach the publisher.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<tungstenite::Error>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("server rejected request: {0}")]
    Rejected(String),

    #[error("connection closed")]
    ConnectionClosed,
}

impl From<tungstenite::Error> for Error {
    fn from(err: tungstenite::Error) -> Self {
        Error::WebSocket(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
