//! Shared test fixtures for crates that need a real broker or a real
//! loopback session rather than mocked handlers — grounded on the
//! teacher's `rt-test-utils` crate, which plays the same role for the
//! websocket stack's own integration tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use broker_core::BrokerState;
use rpc_session::{FramedSession, MethodHandler, SessionHandle, SessionHooks};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Bind an ephemeral broker and return its address plus the accept-loop
/// task. Drop or abort the handle to tear it down.
pub async fn spawn_broker() -> std::io::Result<(SocketAddr, JoinHandle<std::io::Result<()>>)> {
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

/// Bind a single-shot service provider at an ephemeral port: accepts one
/// connection, installs `handlers`, and serves it. Returns the bound
/// address.
pub async fn spawn_service(handlers: HashMap<String, MethodHandler>) -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Ok((stream, peer_addr)) = listener.accept().await {
            FramedSession::spawn(stream, peer_addr, handlers, SessionHooks::default());
        }
    });

    Ok(addr)
}

/// Connect a bare session to `addr` with no method handlers, for tests
/// that only need to send and receive raw requests/notifications.
pub async fn connect_bare(addr: SocketAddr) -> std::io::Result<SessionHandle> {
    FramedSession::connect(addr, HashMap::new(), SessionHooks::default()).await
}
