//! Peer-connection engine seam and its webrtc-rs implementation

pub mod connection;
pub mod engine;

pub use connection::{LocalAudioTrack, WebRtcEngine, WebRtcEngineFactory};
pub use engine::{
    EngineEvent, EngineEventReceiver, EngineEventSender, EngineFactory, EngineParts, EngineState,
    HeaderExtension, IceCandidate, InboundTrack, PacketSink, PeerEngine, SdpKind,
    SessionDescription, SignalingChannel,
};
