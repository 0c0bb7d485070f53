use serde::Deserialize;

use crate::broker::DeliveryMode;
use crate::broker::subscription::DEFAULT_SUBSCRIBER_BUFFER;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub logging: LogSettings,
}

/// Address the WebSocket server binds to.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Limits and delivery behaviour of the broker and its connections.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BrokerSettings {
    /// Connections beyond this many are refused before the handshake.
    pub max_connections: usize,
    /// Broadcasts a subscriber may lag behind before it is evicted.
    pub subscriber_buffer: usize,
    /// Frames queued per connection waiting for the socket.
    pub outbound_buffer: usize,
    pub delivery: DeliveryMode,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Every field is optional; missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub logging: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub max_connections: Option<usize>,
    pub subscriber_buffer: Option<usize>,
    pub outbound_buffer: Option<usize>,
    pub delivery: Option<DeliveryMode>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
        }
    }
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            max_connections: 1000,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            outbound_buffer: 256,
            delivery: DeliveryMode::Snapshot,
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl PartialSettings {
    /// Fill every missing value from the defaults.
    pub fn merge(self, default: Settings) -> Settings {
        let server = self.server;
        let broker = self.broker;
        let logging = self.logging;

        Settings {
            server: ServerSettings {
                host: server
                    .as_ref()
                    .and_then(|s| s.host.clone())
                    .unwrap_or(default.server.host),
                port: server
                    .as_ref()
                    .and_then(|s| s.port)
                    .unwrap_or(default.server.port),
            },
            broker: BrokerSettings {
                max_connections: broker
                    .as_ref()
                    .and_then(|b| b.max_connections)
                    .unwrap_or(default.broker.max_connections),
                subscriber_buffer: broker
                    .as_ref()
                    .and_then(|b| b.subscriber_buffer)
                    .unwrap_or(default.broker.subscriber_buffer),
                outbound_buffer: broker
                    .as_ref()
                    .and_then(|b| b.outbound_buffer)
                    .unwrap_or(default.broker.outbound_buffer),
                delivery: broker
                    .as_ref()
                    .and_then(|b| b.delivery)
                    .unwrap_or(default.broker.delivery),
            },
            logging: LogSettings {
                level: logging
                    .and_then(|l| l.level)
                    .unwrap_or(default.logging.level),
            },
        }
    }
}
