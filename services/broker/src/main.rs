//! Broker entry point. Binds `host:port` (default all interfaces) and
//! serves until SIGTERM/Ctrl+C, mirroring the teacher's `main.rs`
//! tracing-subscriber setup and graceful-shutdown shape.

use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

fn config_from_env() -> SocketAddr {
    let host = std::env::var("BROKER_HOST").unwrap_or_else(|_| "0.0.0.0".to_owned());
    let port: u16 = std::env::var("BROKER_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(7000);
    format!("{host}:{port}")
        .parse()
        .expect("BROKER_HOST/BROKER_PORT must form a valid socket address")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let addr = config_from_env();
    broker::serve(addr, shutdown_signal()).await
}
