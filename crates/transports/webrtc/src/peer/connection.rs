//! webrtc-rs implementation of the peer-connection engine
//!
//! [`WebRtcEngine`] wraps an `RTCPeerConnection` built with the default codecs
//! and interceptors plus the configured custom header extension. Every
//! callback the connection exposes is turned into an [`EngineEvent`] on the
//! session's queue; nothing else runs inside the callbacks.

use crate::config::AudioLinkConfig;
use crate::peer::engine::{
    EngineEvent, EngineEventSender, EngineFactory, EngineParts, EngineState, HeaderExtension,
    IceCandidate, InboundTrack, PacketSink, PeerEngine, SdpKind, SessionDescription,
    SignalingChannel,
};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp::packet::Packet;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpHeaderExtensionCapability, RTPCodecType,
};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};
use webrtc::track::track_remote::TrackRemote;

/// Peer-connection engine backed by webrtc-rs
pub struct WebRtcEngine {
    peer_connection: Arc<RTCPeerConnection>,

    /// Set once `close` ran; outbound writes fail afterwards
    closed: Arc<AtomicBool>,
}

impl WebRtcEngine {
    /// Build a peer connection wired to `events`
    ///
    /// # Arguments
    ///
    /// * `config` - STUN servers and the custom extension URI
    /// * `events` - Session event queue receiving every engine callback
    /// * `with_audio` - Add an outbound Opus track and start its RTCP drain
    pub async fn connect(
        config: &AudioLinkConfig,
        events: EngineEventSender,
        with_audio: bool,
    ) -> Result<(Arc<Self>, Option<Arc<LocalAudioTrack>>)> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::WebRtcError(format!("Failed to register codecs: {}", e)))?;

        // The custom extension must be known to the media engine before any
        // description is built, otherwise it never shows up in the SDP.
        media_engine
            .register_header_extension(
                RTCRtpHeaderExtensionCapability {
                    uri: config.extension_uri.clone(),
                },
                RTPCodecType::Audio,
                None,
            )
            .map_err(|e| {
                Error::WebRtcError(format!(
                    "Failed to register header extension {}: {}",
                    config.extension_uri, e
                ))
            })?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| Error::WebRtcError(format!("Failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: config.stun_servers.clone(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let peer_connection = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(|e| Error::WebRtcError(format!("Failed to create peer connection: {}", e)))?,
        );

        info!(
            extension_uri = %config.extension_uri,
            stun_servers = config.stun_servers.len(),
            "Created peer connection"
        );

        let engine = Arc::new(Self {
            peer_connection,
            closed: Arc::new(AtomicBool::new(false)),
        });
        engine.register_callbacks(events);

        let audio_track = if with_audio {
            Some(engine.add_audio_track().await?)
        } else {
            None
        };

        Ok((engine, audio_track))
    }

    /// Underlying webrtc-rs peer connection
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.peer_connection
    }

    fn register_callbacks(&self, events: EngineEventSender) {
        let tx = events.clone();
        self.peer_connection
            .on_negotiation_needed(Box::new(move || {
                debug!("Engine requested negotiation");
                let _ = tx.send(EngineEvent::NegotiationNeeded);
                Box::pin(async {})
            }));

        let tx = events.clone();
        self.peer_connection
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                match candidate.map(|c| c.to_json()).transpose() {
                    Ok(init) => {
                        let candidate = init.map(|init| IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid.unwrap_or_default(),
                            sdp_mline_index: init.sdp_mline_index.unwrap_or(0),
                        });
                        let _ = tx.send(EngineEvent::CandidateGenerated(candidate));
                    }
                    Err(e) => warn!("Failed to convert ICE candidate to JSON: {}", e),
                }
                Box::pin(async {})
            }));

        let tx = events.clone();
        self.peer_connection
            .on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
                let _ = tx.send(EngineEvent::StateChanged(map_ice_state(state)));
                Box::pin(async {})
            }));

        let tx = events.clone();
        self.peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                info!(
                    "Remote track received: id={}, kind={}",
                    track.id(),
                    track.kind()
                );
                let _ = tx.send(EngineEvent::TrackReceived(Arc::new(RemoteTrack { track })));
                Box::pin(async {})
            },
        ));

        let tx = events;
        self.peer_connection
            .on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
                let tx = tx.clone();
                Box::pin(async move {
                    let label = channel.label().to_owned();
                    info!("Data channel opened by peer: label={}", label);

                    // Announce the channel before any of its messages
                    let _ = tx.send(EngineEvent::DataChannelOpened(Arc::new(
                        DataChannelSignaling {
                            channel: Arc::clone(&channel),
                        },
                    )));

                    let message_tx = tx.clone();
                    let message_label = label.clone();
                    channel.on_message(Box::new(move |msg: DataChannelMessage| {
                        if !msg.is_string {
                            debug!("Ignoring binary message on data channel {}", message_label);
                        } else {
                            match String::from_utf8(msg.data.to_vec()) {
                                Ok(text) => {
                                    let _ = message_tx.send(EngineEvent::DataChannelMessage {
                                        label: message_label.clone(),
                                        text,
                                    });
                                }
                                Err(e) => warn!(
                                    "Invalid UTF-8 on data channel {}: {}",
                                    message_label, e
                                ),
                            }
                        }
                        Box::pin(async {})
                    }));

                    let close_tx = tx;
                    channel.on_close(Box::new(move || {
                        let _ = close_tx.send(EngineEvent::DataChannelClosed(label.clone()));
                        Box::pin(async {})
                    }));
                })
            }));
    }

    async fn add_audio_track(&self) -> Result<Arc<LocalAudioTrack>> {
        let track = Arc::new(TrackLocalStaticRTP::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
            "audio".to_owned(),
            "audiolink".to_owned(),
        ));

        let sender = self
            .peer_connection
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::MediaTrackError(format!("Failed to add audio track: {}", e)))?;

        tokio::spawn(drain_rtcp(sender));

        info!("Added outbound Opus track");

        Ok(Arc::new(LocalAudioTrack {
            track,
            closed: Arc::clone(&self.closed),
        }))
    }
}

/// Read incoming RTCP so interceptors (NACK, reports) keep running.
/// Ends when the sender is closed.
async fn drain_rtcp(sender: Arc<RTCRtpSender>) {
    let mut rtcp_buf = vec![0u8; 1500];
    while let Ok((_, _)) = sender.read(&mut rtcp_buf).await {}
    debug!("RTCP drain finished");
}

fn map_ice_state(state: RTCIceConnectionState) -> EngineState {
    match state {
        RTCIceConnectionState::Checking => EngineState::Checking,
        RTCIceConnectionState::Connected | RTCIceConnectionState::Completed => {
            EngineState::Connected
        }
        RTCIceConnectionState::Disconnected => EngineState::Disconnected,
        RTCIceConnectionState::Failed => EngineState::Failed,
        RTCIceConnectionState::Closed => EngineState::Closed,
        _ => EngineState::New,
    }
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription> {
    let parsed = match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp),
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp),
    };
    parsed.map_err(|e| Error::WebRtcError(format!("Invalid SDP: {}", e)))
}

fn from_rtc(desc: RTCSessionDescription) -> Result<SessionDescription> {
    match desc.sdp_type {
        RTCSdpType::Offer => Ok(SessionDescription::offer(desc.sdp)),
        RTCSdpType::Answer => Ok(SessionDescription::answer(desc.sdp)),
        other => Err(Error::WebRtcError(format!(
            "Unsupported description type: {}",
            other
        ))),
    }
}

#[async_trait]
impl PeerEngine for WebRtcEngine {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| Error::WebRtcError(format!("Failed to create offer: {}", e)))?;
        from_rtc(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| Error::WebRtcError(format!("Failed to create answer: {}", e)))?;
        from_rtc(answer)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.peer_connection
            .set_local_description(to_rtc(desc)?)
            .await
            .map_err(|e| Error::WebRtcError(format!("Failed to set local description: {}", e)))
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.peer_connection
            .set_remote_description(to_rtc(desc)?)
            .await
            .map_err(|e| Error::WebRtcError(format!("Failed to set remote description: {}", e)))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: Some(candidate.sdp_mid),
            sdp_mline_index: Some(candidate.sdp_mline_index),
            ..Default::default()
        };
        self.peer_connection
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::WebRtcError(format!("Failed to add ICE candidate: {}", e)))
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.peer_connection
            .local_description()
            .await
            .and_then(|d| from_rtc(d).ok())
    }

    async fn remote_description(&self) -> Option<SessionDescription> {
        self.peer_connection
            .remote_description()
            .await
            .and_then(|d| from_rtc(d).ok())
    }

    async fn negotiated_header_extensions(&self) -> Vec<Vec<HeaderExtension>> {
        let mut transceivers = Vec::new();

        for sender in self.peer_connection.get_senders().await {
            let params = sender.get_parameters().await;
            transceivers.push(
                params
                    .rtp_parameters
                    .header_extensions
                    .iter()
                    .map(|ext| HeaderExtension::new(ext.id, ext.uri.clone()))
                    .collect(),
            );
        }

        for receiver in self.peer_connection.get_receivers().await {
            let params = receiver.get_parameters().await;
            transceivers.push(
                params
                    .header_extensions
                    .iter()
                    .map(|ext| HeaderExtension::new(ext.id, ext.uri.clone()))
                    .collect(),
            );
        }

        transceivers
    }

    async fn wait_for_gathering(&self) {
        let mut gathering_done = self.peer_connection.gathering_complete_promise().await;
        let _ = gathering_done.recv().await;
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Closing peer connection");
        self.peer_connection
            .close()
            .await
            .map_err(|e| Error::WebRtcError(format!("Failed to close peer connection: {}", e)))
    }
}

/// Peer-opened data channel carrying in-band signaling
struct DataChannelSignaling {
    channel: Arc<RTCDataChannel>,
}

#[async_trait]
impl SignalingChannel for DataChannelSignaling {
    fn label(&self) -> String {
        self.channel.label().to_owned()
    }

    async fn send_text(&self, text: String) -> Result<()> {
        self.channel
            .send_text(text)
            .await
            .map(|_| ())
            .map_err(|e| Error::SignalingError(format!("Failed to send on data channel: {}", e)))
    }
}

/// Outbound Opus track fed by the packetizer
pub struct LocalAudioTrack {
    track: Arc<TrackLocalStaticRTP>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl PacketSink for LocalAudioTrack {
    async fn send_packet(&self, packet: &Packet) -> Result<()> {
        // A closed connection drops its track bindings and writes become
        // silent no-ops, so the closed flag is what stops the packetizer.
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::MediaTrackError("peer connection closed".to_string()));
        }
        self.track
            .write_rtp(packet)
            .await
            .map(|_| ())
            .map_err(|e| Error::MediaTrackError(format!("Failed to write RTP: {}", e)))
    }
}

struct RemoteTrack {
    track: Arc<TrackRemote>,
}

#[async_trait]
impl InboundTrack for RemoteTrack {
    fn id(&self) -> String {
        self.track.id()
    }

    async fn read_packet(&self) -> Result<Packet> {
        self.track
            .read_rtp()
            .await
            .map(|(packet, _attributes)| packet)
            .map_err(|e| Error::MediaTrackError(format!("Failed to read RTP: {}", e)))
    }
}

/// Creates a [`WebRtcEngine`] per session from the shared configuration
pub struct WebRtcEngineFactory {
    config: Arc<AudioLinkConfig>,
}

impl WebRtcEngineFactory {
    /// Create a factory
    pub fn new(config: Arc<AudioLinkConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EngineFactory for WebRtcEngineFactory {
    async fn create(&self, events: EngineEventSender, with_audio: bool) -> Result<EngineParts> {
        let (engine, audio_track) = WebRtcEngine::connect(&self.config, events, with_audio).await?;
        Ok(EngineParts {
            engine,
            audio_sink: audio_track.map(|t| t as Arc<dyn PacketSink>),
        })
    }
}
