//! WebSocket signaling: one JSON message per text frame

mod handler;
mod server;

pub use handler::handle_connection;
pub use server::WebSocketSignalingServer;
