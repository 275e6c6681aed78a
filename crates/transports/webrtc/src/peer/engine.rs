//! Peer-connection engine seam
//!
//! The signaling state machine never talks to webrtc-rs directly. It drives a
//! [`PeerEngine`] and consumes [`EngineEvent`]s from a single per-session
//! queue, so engine callbacks are observed in order by one task.

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::rtp::packet::Packet;

/// Kind of session description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    /// Offer
    Offer,
    /// Answer
    Answer,
}

/// Engine-independent session description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    /// Offer or answer
    pub kind: SdpKind,
    /// Raw SDP text
    pub sdp: String,
}

impl SessionDescription {
    /// Create an offer description
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    /// Create an answer description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Connectivity candidate as exchanged over signaling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    /// Candidate attribute line
    pub candidate: String,
    /// Media stream identification tag
    pub sdp_mid: String,
    /// Index of the m-line the candidate belongs to
    pub sdp_mline_index: u16,
}

/// Connection state reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Nothing started yet
    New,
    /// Connectivity checks running
    Checking,
    /// Media can flow
    Connected,
    /// Connectivity lost, may recover
    Disconnected,
    /// Connectivity failed for good
    Failed,
    /// Engine closed
    Closed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineState::New => "new",
            EngineState::Checking => "checking",
            EngineState::Connected => "connected",
            EngineState::Disconnected => "disconnected",
            EngineState::Failed => "failed",
            EngineState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// One negotiated header-extension mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderExtension {
    /// Numeric id assigned during negotiation
    pub id: isize,
    /// Extension URI
    pub uri: String,
}

impl HeaderExtension {
    /// Create a mapping
    pub fn new(id: isize, uri: impl Into<String>) -> Self {
        Self {
            id,
            uri: uri.into(),
        }
    }
}

/// Remote track delivering inbound RTP packets
#[async_trait]
pub trait InboundTrack: Send + Sync {
    /// Track identifier
    fn id(&self) -> String;

    /// Read the next RTP packet. Fails once the engine is closed.
    async fn read_packet(&self) -> Result<Packet>;
}

/// Local track accepting outbound RTP packets
#[async_trait]
pub trait PacketSink: Send + Sync {
    /// Hand one packet to the engine's outbound queue
    async fn send_packet(&self, packet: &Packet) -> Result<()>;
}

/// Data channel opened by the remote peer, usable for in-band signaling
///
/// Once connected, renegotiation offers travel over this channel instead of
/// the out-of-band signaling transport.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Channel label
    fn label(&self) -> String;

    /// Send one text message
    async fn send_text(&self, text: String) -> Result<()>;
}

/// Events emitted asynchronously by the engine
pub enum EngineEvent {
    /// A track or data channel changed and an offer is required
    NegotiationNeeded,
    /// A local candidate was gathered; `None` marks the end of candidates
    CandidateGenerated(Option<IceCandidate>),
    /// The engine's connection state changed
    StateChanged(EngineState),
    /// The remote side started sending a track
    TrackReceived(Arc<dyn InboundTrack>),
    /// The remote side opened a data channel
    DataChannelOpened(Arc<dyn SignalingChannel>),
    /// Text message received on a data channel, tagged with its label
    DataChannelMessage {
        /// Label of the receiving channel
        label: String,
        /// Message text
        text: String,
    },
    /// A data channel closed
    DataChannelClosed(String),
}

impl fmt::Debug for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEvent::NegotiationNeeded => f.write_str("NegotiationNeeded"),
            EngineEvent::CandidateGenerated(c) => {
                f.debug_tuple("CandidateGenerated").field(c).finish()
            }
            EngineEvent::StateChanged(s) => f.debug_tuple("StateChanged").field(s).finish(),
            EngineEvent::TrackReceived(t) => {
                f.debug_tuple("TrackReceived").field(&t.id()).finish()
            }
            EngineEvent::DataChannelOpened(c) => {
                f.debug_tuple("DataChannelOpened").field(&c.label()).finish()
            }
            EngineEvent::DataChannelMessage { label, text } => f
                .debug_struct("DataChannelMessage")
                .field("label", label)
                .field("text", text)
                .finish(),
            EngineEvent::DataChannelClosed(label) => {
                f.debug_tuple("DataChannelClosed").field(label).finish()
            }
        }
    }
}

/// Sender half of a session's engine event queue
pub type EngineEventSender = mpsc::UnboundedSender<EngineEvent>;

/// Receiver half of a session's engine event queue
pub type EngineEventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

/// Operations the core needs from a peer-connection engine
#[async_trait]
pub trait PeerEngine: Send + Sync {
    /// Build a local offer
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Build a local answer to the applied remote offer
    async fn create_answer(&self) -> Result<SessionDescription>;

    /// Apply a local description
    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    /// Apply a remote description
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    /// Ingest a remote candidate
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Currently applied local description
    async fn local_description(&self) -> Option<SessionDescription>;

    /// Currently applied remote description
    async fn remote_description(&self) -> Option<SessionDescription>;

    /// Header-extension parameters of every sender, then every receiver
    async fn negotiated_header_extensions(&self) -> Vec<Vec<HeaderExtension>>;

    /// Resolve once local candidate gathering has finished
    async fn wait_for_gathering(&self);

    /// Close the engine; pending reads and writes start failing
    async fn close(&self) -> Result<()>;
}

/// Engine handle plus the optional outbound audio track
pub struct EngineParts {
    /// Engine handle shared by every task of the session
    pub engine: Arc<dyn PeerEngine>,
    /// Outbound audio track, present when an audio source is streamed
    pub audio_sink: Option<Arc<dyn PacketSink>>,
}

/// Builds one engine per session, wired to the session's event queue
#[async_trait]
pub trait EngineFactory: Send + Sync {
    /// Create an engine. With `with_audio`, an outbound audio track is added.
    async fn create(&self, events: EngineEventSender, with_audio: bool) -> Result<EngineParts>;
}
