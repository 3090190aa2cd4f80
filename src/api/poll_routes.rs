use warp::Filter;

use super::poll_websocket;
use crate::config::CorsConfig;
use crate::poll::PollServer;

pub const LIVENESS_MESSAGE: &str = "Polling backend is live";

/// Health check, WebSocket transport and CORS, combined
pub fn routes(
    server: PollServer,
    cors: &CorsConfig,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    health_check()
        .or(poll_websocket_route(server))
        .with(cors_filter(cors))
}

/// Upgrades `GET /ws` and hands the socket to the session
pub fn poll_websocket_route(
    server: PollServer,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("ws")
        .and(warp::path::end())
        .and(warp::ws())
        .and(with_poll_server(server))
        .map(|ws: warp::ws::Ws, server: PollServer| {
            ws.on_upgrade(move |websocket| poll_websocket::handle_poll_websocket(websocket, server))
        })
}

pub fn health_check() -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path::end().and(warp::get()).map(|| LIVENESS_MESSAGE)
}

/// Requests carrying an `Origin` outside the allow-list, WebSocket
/// upgrades included, are refused with 403.
pub fn cors_filter(config: &CorsConfig) -> warp::cors::Cors {
    warp::cors()
        .allow_origins(config.allowed_origins.iter().map(String::as_str))
        .allow_methods(vec!["GET", "POST"])
        .build()
}

fn with_poll_server(
    server: PollServer,
) -> impl Filter<Extract = (PollServer,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || server.clone())
}
