//! A thin teleoperation console: publishes lines typed on stdin as
//! `command` topic values and logs whatever it is subscribed to. The
//! terminal handling itself is out of scope (spec §1 non-goals); this is
//! just enough glue to exercise `peer-session`'s publish/subscribe API
//! end to end.

use std::net::SocketAddr;
use std::sync::Arc;

use peer_session::PeerSession;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

fn broker_addr() -> SocketAddr {
    let host = std::env::var("BROKER_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
    let port: u16 = std::env::var("BROKER_PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(7000);
    format!("{host}:{port}").parse().expect("BROKER_HOST/BROKER_PORT must form a valid socket address")
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let peer = PeerSession::connect(broker_addr()).await?;

    peer.subscribe(
        "command",
        Arc::new(|params: &[Value]| {
            tracing::info!(?params, "command");
            true
        }),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let token = line.trim();
        if token.is_empty() {
            continue;
        }
        peer.publish("command", &[Value::String(token.to_owned())]);
    }

    Ok(())
}
