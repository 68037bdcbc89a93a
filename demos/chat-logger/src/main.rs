//! Joins chat channels anonymously and logs what is said.
//!
//! ```text
//! RUST_LOG=chat_logger=info,tether_engine=debug cargo run -p chat-logger -- rust twitchdev
//! ```

use tether::prelude::*;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Read-only anonymous login accepted by the chat gateway.
const ANONYMOUS_NICK: &str = "justinfan31415";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chat_logger=info,tether=info,tether_engine=info,warn")),
        )
        .init();

    let channels: Vec<String> = std::env::args()
        .skip(1)
        .map(|c| if c.starts_with('#') { c } else { format!("#{c}") })
        .collect();
    if channels.is_empty() {
        eprintln!("usage: chat-logger <channel>...");
        std::process::exit(2);
    }

    let client = ChatClient::new();
    let mut events = client.subscribe();
    client.start().await?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let event = tokio::select! {
            _ = &mut shutdown => break,
            event = events.recv() => event,
        };
        match event {
            // Login and joins do not survive a reconnect.
            Ok(ChatEvent::Connected) => {
                client.send_raw("CAP REQ :twitch.tv/tags twitch.tv/commands");
                client.send_raw(format!("NICK {ANONYMOUS_NICK}"));
                for channel in &channels {
                    client.join(channel);
                }
                info!(channels = ?channels, "connected, joining");
            }
            Ok(ChatEvent::Message(message)) if message.command == Command::Privmsg => {
                log_privmsg(&message);
            }
            Ok(ChatEvent::Message(message)) => debug!(%message, "chat message"),
            Ok(ChatEvent::Unknown(line)) => warn!(%line, "unparsed line"),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "logger fell behind"),
            Err(RecvError::Closed) => break,
        }
    }

    info!("shutting down");
    client.stop().await?;
    Ok(())
}

fn log_privmsg(message: &IrcMessage) {
    let channel = message.params.first().map(String::as_str).unwrap_or_default();
    let text = message.params.last().map(String::as_str).unwrap_or_default();
    let user = message
        .tag("display-name")
        .filter(|name| !name.is_empty())
        .or_else(|| {
            message
                .prefix
                .as_deref()
                .and_then(|prefix| prefix.split('!').next())
        })
        .unwrap_or("?");
    info!(%channel, %user, "{text}");
}
