//! A minimal service provider: binds its own listener, registers `echo`
//! with the broker, and answers every `echo` request by returning its
//! params unchanged. Grounded on `betelbot`'s `pathfinder.py`, which
//! registers a method with the master on startup and then serves it from
//! its own accept loop.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use peer_session::PeerSession;
use rpc_protocol::Message;
use rpc_session::{FramedSession, HandlerFuture, MethodHandler, SessionHandle, SessionHooks};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn broker_addr() -> SocketAddr {
    let host = std::env::var("BROKER_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
    let port: u16 = std::env::var("BROKER_PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(7000);
    format!("{host}:{port}").parse().expect("BROKER_HOST/BROKER_PORT must form a valid socket address")
}

fn service_bind_addr() -> SocketAddr {
    let host = std::env::var("SERVICE_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
    let port: u16 = std::env::var("SERVICE_PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(0);
    format!("{host}:{port}").parse().expect("SERVICE_HOST/SERVICE_PORT must form a valid socket address")
}

fn echo_handlers() -> HashMap<String, MethodHandler> {
    let mut handlers: HashMap<String, MethodHandler> = HashMap::new();
    handlers.insert(
        "echo".to_owned(),
        Arc::new(|message: Message, session: SessionHandle| -> HandlerFuture {
            Box::pin(async move {
                if let Message::Request { id, params, .. } = message {
                    session.respond(&id, &params);
                }
            })
        }),
    );
    handlers
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let listener = TcpListener::bind(service_bind_addr()).await?;
    let bound_addr = listener.local_addr()?;
    tracing::info!(%bound_addr, "echo service listening");

    let peer = PeerSession::connect(broker_addr()).await?;
    peer.register("echo", bound_addr.port(), &bound_addr.ip().to_string());

    let handlers = echo_handlers();
    loop {
        let (stream, peer_addr) = listener.accept().await?;
        FramedSession::spawn(stream, peer_addr, handlers.clone(), SessionHooks::default());
    }
}
