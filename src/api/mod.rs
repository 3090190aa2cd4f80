pub mod poll_routes;
pub mod poll_websocket;

pub use poll_routes::routes;
