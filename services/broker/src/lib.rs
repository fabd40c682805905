//! The broker (C5): accepts TCP connections, builds a framed session per
//! connection from `broker-core`'s method-handler table, and runs until
//! asked to stop.
//!
//! Grounded on the teacher's `services/server/src/lib.rs`/`main.rs` split:
//! a library crate exposing the run loop, and a thin binary that wires up
//! tracing and calls into it.

use std::net::SocketAddr;
use std::sync::Arc;

use broker_core::BrokerState;
use rpc_session::{FramedSession, SessionHooks};
use tokio::net::TcpListener;

/// Bind `addr` and serve broker connections until `shutdown` resolves.
/// Every accepted connection gets its own session with the broker's
/// `publish`/`subscribe`/`register`/`locate` handler table installed.
pub async fn serve(addr: SocketAddr, shutdown: impl std::future::Future<Output = ()>) -> std::io::Result<()> {
    let state = Arc::new(BrokerState::new());
    let handlers = broker_core::method_handlers(state.clone());
    let hooks: SessionHooks = broker_core::close_hook(state.clone());
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "broker listening");

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer_addr) = accepted?;
                FramedSession::spawn(stream, peer_addr, handlers.clone(), hooks.clone());
                tracing::debug!(%peer_addr, "accepted peer session");
            }
            () = &mut shutdown => {
                tracing::info!("broker shutting down");
                return Ok(());
            }
        }
    }
}

/// Convenience for tests and embedding binaries: bind an ephemeral port
/// and return the bound address alongside a handle to the running server
/// task.
pub async fn serve_ephemeral() -> std::io::Result<(SocketAddr, tokio::task::JoinHandle<std::io::Result<()>>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = Arc::new(BrokerState::new());
    let handlers = broker_core::method_handlers(state.clone());
    let hooks = broker_core::close_hook(state.clone());

    let handle = tokio::spawn(async move {
        loop {
            let (stream, peer_addr) = listener.accept().await?;
            FramedSession::spawn(stream, peer_addr, handlers.clone(), hooks.clone());
        }
    });

    Ok((addr, handle))
}
