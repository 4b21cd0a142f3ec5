use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::net::{TcpListener, TcpStream};
use tracing::info;
use tracing_subscriber::EnvFilter;

use msgbridge_core::{BridgeEngine, Sha256SessionHasher};
use msgbridge_router::bridge_router;

mod accounts;
mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = cli::Cli::parse();
    let config = config::load(&cli)?;

    let scheduler = Arc::new(accounts::StaticScheduler::new(config.lease));
    let sink = Arc::new(accounts::TracingSink);
    let hasher = Arc::new(Sha256SessionHasher);
    let engine = Arc::new(BridgeEngine::new(scheduler, sink, hasher, config.engine));

    let app = bridge_router(engine);
    let listener = TcpListener::bind(&config.bind).await?;
    info!(event = "listening", bind = %config.bind);
    axum::serve(listener_with_nodelay(listener), app).await?;
    Ok(())
}

/// Event streams are latency-sensitive; Nagle batching would hold frames
/// back, so every accepted socket gets TCP_NODELAY.
fn listener_with_nodelay(listener: TcpListener) -> NoDelayListener {
    NoDelayListener { listener }
}

struct NoDelayListener {
    listener: TcpListener,
}

impl axum::serve::Listener for NoDelayListener {
    type Io = TcpStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let _ = stream.set_nodelay(true);
                    return (stream, addr);
                }
                // Transient accept errors (EMFILE and friends); back off.
                Err(_) => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.listener.local_addr()
    }
}
