//! Request handlers and route composition for the server endpoints

pub mod websocket;

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use log::warn;
use serde::Serialize;
use warp::{Filter, Reply};

use crate::constants::WS_PATH;
use crate::core::engine::PresenceEngine;
use crate::core::subscription::TrackingStats;

// Re-export the websocket handler
pub use websocket::{handle_ws_client, ClientIdentity};

/// Aggregate engine statistics served at `GET /stats`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    connections: usize,
    tracking: TrackingStats,
}

/// Compose the server routes: WebSocket endpoint, health check, stats
pub fn routes(
    engine: Arc<PresenceEngine>,
) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    let ws_route = warp::path(WS_PATH)
        .and(warp::ws())
        .and(warp::query::<HashMap<String, String>>())
        .and(with_engine(Arc::clone(&engine)))
        .and_then(upgrade_ws);

    let health_route = warp::path("health").map(|| "OK");

    let stats_route = warp::path("stats")
        .and(with_engine(engine))
        .and_then(serve_stats);

    ws_route.or(health_route).or(stats_route)
}

// Helper function to include the engine in request handling
fn with_engine(
    engine: Arc<PresenceEngine>,
) -> impl Filter<Extract = (Arc<PresenceEngine>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&engine))
}

async fn upgrade_ws(
    ws: warp::ws::Ws,
    params: HashMap<String, String>,
    engine: Arc<PresenceEngine>,
) -> Result<warp::reply::Response, Infallible> {
    match ClientIdentity::from_query(&params) {
        Ok(identity) => Ok(ws
            .on_upgrade(move |socket| handle_ws_client(socket, engine, identity))
            .into_response()),
        Err(e) => {
            warn!("Rejected WebSocket handshake: {}", e);
            Ok(warp::reply::with_status(
                e.client_message(),
                warp::http::StatusCode::BAD_REQUEST,
            )
            .into_response())
        }
    }
}

async fn serve_stats(engine: Arc<PresenceEngine>) -> Result<impl Reply, Infallible> {
    let response = StatsResponse {
        connections: engine.connection_count().await,
        tracking: engine.tracking_stats().await,
    };
    Ok(warp::reply::json(&response))
}
