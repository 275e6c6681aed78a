//! Signaling: wire format, per-session state machine and the two transports
//!
//! - WebSocket: persistent duplex channel, trickled candidates, renegotiation
//! - HTTP: single `POST /session` offer/answer exchange

pub mod http;
pub mod machine;
pub mod protocol;
pub mod websocket;

pub use http::HttpSignalingServer;
pub use machine::SignalingStateMachine;
pub use protocol::{CandidateMessage, SignalingMessage};
pub use websocket::WebSocketSignalingServer;
