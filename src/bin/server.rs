use std::net::SocketAddr;
use std::sync::Arc;
use log::{error, info, warn};

use ride_relay::config::EngineConfig;
use ride_relay::core::engine::PresenceEngine;
use ride_relay::handlers;
use ride_relay::storage::NoopSink;

#[tokio::main]
async fn main() {
    // Initialize env
    let dotenv_result = dotenvy::dotenv();

    // Initialize logging
    env_logger::init();

    match dotenv_result {
        Ok(_) => info!("Environment variables loaded from .env file"),
        Err(e) => warn!("Failed to load .env file: {}", e),
    };

    // Load config from the environment
    let config = EngineConfig::from_env();
    info!(
        "Configuration: host={}, port={}, typing_timeout={:?}",
        config.host, config.port, config.typing_timeout
    );

    let host = config.host.clone();
    let port = config.port;

    // Build the engine; persistence is handled by the REST layer, so the
    // standalone server runs with a no-op sink
    let engine = PresenceEngine::new(config, Arc::new(NoopSink));
    let routes = handlers::routes(engine);

    // Build the server address
    let addr: SocketAddr = match format!("{}:{}", host, port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    // Start the server
    info!("Starting Ride Relay server on {}", addr);
    warp::serve(routes).run(addr).await;
}
