//! Paced Ogg page to RTP packetizer
//!
//! Emits one RTP packet per page on a steady periodic timer once the session
//! is connected. Sequence numbers start at 0 and wrap at 2^16; timestamps are
//! the page granule truncated to 32 bits.

use crate::config::AudioLinkConfig;
use crate::media::ogg::{AudioPage, PageSource};
use crate::peer::engine::PacketSink;
use crate::session::peer_session::PeerSession;
use crate::Result;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use webrtc::rtp::header::{Header, EXTENSION_PROFILE_TWO_BYTE};
use webrtc::rtp::packet::Packet;

const MAX_ONE_BYTE_EXTENSION_ID: u8 = 14;

/// Packetizer settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketizerConfig {
    /// Time between two packets
    pub interval: Duration,
    /// RTP payload type
    pub payload_type: u8,
    /// RTP SSRC
    pub ssrc: u32,
    /// Value written big-endian under the resolved extension id
    pub correlation_value: u32,
}

impl From<&AudioLinkConfig> for PacketizerConfig {
    fn from(config: &AudioLinkConfig) -> Self {
        Self {
            interval: config.page_interval(),
            payload_type: config.payload_type,
            ssrc: config.ssrc,
            correlation_value: config.correlation_value,
        }
    }
}

/// Build the RTP packet for one page
///
/// With `extension_id`, the correlation value is attached under that id.
/// Ids 1..=14 use the one-byte header form; higher ids only fit the
/// two-byte form (RFC 8285).
pub fn build_packet(
    config: &PacketizerConfig,
    sequence: u16,
    page: AudioPage,
    extension_id: Option<u8>,
) -> Packet {
    let mut packet = Packet {
        header: Header {
            version: 2,
            payload_type: config.payload_type,
            sequence_number: sequence,
            timestamp: page.granule as u32,
            ssrc: config.ssrc,
            ..Default::default()
        },
        payload: page.payload,
    };

    if let Some(id) = extension_id {
        if id > MAX_ONE_BYTE_EXTENSION_ID {
            packet.header.extension = true;
            packet.header.extension_profile = EXTENSION_PROFILE_TWO_BYTE;
        }
        let value = Bytes::copy_from_slice(&config.correlation_value.to_be_bytes());
        if let Err(e) = packet.header.set_extension(id, value) {
            warn!("Failed to set header extension {}: {}", id, e);
        }
    }

    packet
}

/// Streams pages from a source to a session's outbound track
pub struct Packetizer {
    config: PacketizerConfig,
    source: Box<dyn PageSource>,
    sink: Arc<dyn PacketSink>,
    session: Arc<PeerSession>,
}

impl Packetizer {
    /// Create a packetizer
    pub fn new(
        config: PacketizerConfig,
        source: Box<dyn PageSource>,
        sink: Arc<dyn PacketSink>,
        session: Arc<PeerSession>,
    ) -> Self {
        Self {
            config,
            source,
            sink,
            session,
        }
    }

    /// Run until end of stream
    ///
    /// Blocks until the session is connected and returns `Ok(0)` if it closes
    /// first. Returns the number of packets sent. Decode errors and send
    /// errors end the run.
    pub async fn run(mut self) -> Result<u64> {
        let handle = self.session.handle();

        if !self.session.wait_connected().await {
            debug!("{} closed before connecting, packetizer not started", handle);
            return Ok(0);
        }

        info!(
            "{} packetizer started (interval {:?})",
            handle, self.config.interval
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut sequence: u16 = 0;
        let mut sent: u64 = 0;

        loop {
            ticker.tick().await;

            let Some(page) = self.source.next_page()? else {
                info!("{} reached end of audio after {} packets", handle, sent);
                break;
            };

            let granule = page.granule;
            let packet = build_packet(
                &self.config,
                sequence,
                page,
                self.session.extension().resolved_id(),
            );
            self.sink.send_packet(&packet).await?;
            self.session.record_packet(sequence, granule);

            sequence = sequence.wrapping_add(1);
            sent += 1;
        }

        Ok(sent)
    }
}
