//! Session management
//!
//! Sessions live in an owned [`SessionRegistry`] keyed by generated handles.
//! [`SessionService`] creates them for the signaling transports.

pub mod peer_session;
pub mod registry;
pub mod service;

pub use peer_session::{PeerSession, PlaybackCursor, SessionState};
pub use registry::{SessionHandle, SessionRegistry};
pub use service::SessionService;
