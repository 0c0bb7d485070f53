//! CLI for LiveLog
//!
//! Subcommands:
//! - `server`: run the WebSocket server
//! - `client`: subscribe, publish one message and print the broadcast (smoke test)

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use livelog::broker::Broker;
use livelog::config::load_config;
use livelog::transport::{ClientMessage, ServerMessage, start_websocket_server};
use livelog::utils::{Error, Result, logging};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "livelog")]
enum Command {
    /// Start the WebSocket server
    Server,
    /// Subscribe, publish one message and print the first broadcast
    Client {
        /// WebSocket server URL to connect to
        #[arg(long, default_value = "ws://127.0.0.1:4000")]
        url: String,
        #[arg(long, default_value = "livelog")]
        user: String,
        #[arg(long, default_value = "hello")]
        content: String,
    },
}

#[tokio::main]
async fn main() {
    let cmd = Command::parse();

    let result = match cmd {
        Command::Server => run_server().await,
        Command::Client { url, user, content } => {
            logging::init("info");
            run_client(&url, user, content).await
        }
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run_server() -> Result<()> {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            return Err(e.into());
        }
    };
    logging::init(&config.logging.level);

    let broker = Broker::with_settings(&config.broker).shared();
    info!(delivery = ?config.broker.delivery, "Starting broker");

    tokio::select! {
        result = start_websocket_server(broker, config) => {
            error!("WebSocket server exited unexpectedly.");
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
            Ok(())
        }
    }
}

async fn run_client(url: &str, user: String, content: String) -> Result<()> {
    let (mut ws_stream, _response) = connect_async(url).await?;

    for request in [ClientMessage::Subscribe, ClientMessage::Publish { user, content }] {
        let text = serde_json::to_string(&request)?;
        ws_stream.send(WsMessage::Text(text.into())).await?;
    }

    while let Some(frame) = ws_stream.next().await {
        let WsMessage::Text(text) = frame? else {
            continue;
        };
        println!("{}", text.as_str());

        match serde_json::from_str::<ServerMessage>(text.as_str())? {
            ServerMessage::Snapshot { .. } | ServerMessage::Appended { .. } => return Ok(()),
            ServerMessage::Error { message } => return Err(Error::Rejected(message)),
            _ => {}
        }
    }

    Err(Error::ConnectionClosed)
}
