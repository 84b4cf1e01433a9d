use std::net::SocketAddr;
use std::sync::Arc;

use cubecast_server::config::ServerConfig;
use cubecast_server::Server;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config = match ServerConfig::load("server.toml") {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load server.toml: {e}");
            std::process::exit(1);
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        "cubecast v{} starting on {}:{}",
        env!("CARGO_PKG_VERSION"),
        config.server.address,
        config.server.port
    );
    info!("Name: {}", config.server.name);
    info!("MOTD: {}", config.server.motd);
    info!("Max players: {}", config.server.max_players);
    info!("Name verification: {:?}", config.security.verify_names);

    let addr: SocketAddr = match format!("{}:{}", config.server.address, config.server.port).parse()
    {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("Invalid bind address: {e}");
            std::process::exit(1);
        }
    };

    let server = match Server::from_config(config) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Failed to start server: {e}");
            std::process::exit(1);
        }
    };

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };
    info!("Listening on {addr}");

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);

    // Handle Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => accept(&server, stream, peer),
                    Err(e) => warn!("Accept failed: {e}"),
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }

    server.shutdown();
    // Give session workers a moment to deliver their kick packets.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    server.save_all();
    info!("Server stopped");
}

/// Sessions run on their own blocking threads; hand the socket over.
fn accept(server: &Arc<Server>, stream: tokio::net::TcpStream, peer: SocketAddr) {
    let stream = match stream.into_std() {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Could not take over socket of {peer}: {e}");
            return;
        }
    };
    if let Err(e) = stream.set_nonblocking(false) {
        warn!("Could not configure socket of {peer}: {e}");
        return;
    }
    if let Err(e) = server.start_session(stream) {
        error!("Failed to start session for {peer}: {e}");
    }
}
