//! WebRTC audio sessions with custom RTP header-extension metadata
//!
//! This crate streams a pre-recorded Ogg/Opus file to WebRTC peers and reads
//! per-packet metadata from what they send back.
//!
//! # Features
//!
//! - **Signaling state machine**: offer/answer and trickled candidates over
//!   WebSocket, or a single `POST /session` exchange over HTTP
//! - **Paced packetizer**: one RTP packet per Ogg page on a steady timer,
//!   wrapping 16-bit sequence numbers, granule-derived timestamps
//! - **Header-extension negotiation**: finds the id negotiated for a custom
//!   extension URI and stamps/extracts a correlation value under it
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │  Browser / native peer                                 │
//! │  ↓ (WebSocket JSON or POST /session)                   │
//! │  Signaling transport                                   │
//! │  └─ SignalingStateMachine (one per session)            │
//! │     ├─ PeerEngine (webrtc-rs RTCPeerConnection)        │
//! │     │   └─ EngineEvent queue → run_events task         │
//! │     ├─ Extension negotiator (on CONNECTED, once)       │
//! │     ├─ Packetizer task → outbound Opus track           │
//! │     └─ Track reader task(s) ← inbound tracks           │
//! │  SessionRegistry (handle → PeerSession)                │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use audiolink_webrtc::{AudioLinkConfig, SessionService, WebRtcEngineFactory};
//! use audiolink_webrtc::signaling::WebSocketSignalingServer;
//! use std::sync::Arc;
//!
//! let config = Arc::new(AudioLinkConfig::default());
//! config.validate()?;
//!
//! let factory = Arc::new(WebRtcEngineFactory::new(Arc::clone(&config)));
//! let service = Arc::new(SessionService::new(config, factory));
//!
//! let server = WebSocketSignalingServer::bind("0.0.0.0:8080".parse()?, service).await?;
//! server.serve(async { tokio::signal::ctrl_c().await.ok(); }).await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod config;
pub mod error;
pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;

// Re-exports for public API
pub use config::{AudioLinkConfig, DEFAULT_EXTENSION_URI, OPUS_PAYLOAD_TYPE};
pub use error::{Error, Result};
pub use peer::{EngineFactory, PeerEngine, WebRtcEngineFactory};
pub use session::{SessionHandle, SessionRegistry, SessionService, SessionState};
pub use signaling::{SignalingMessage, SignalingStateMachine};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
