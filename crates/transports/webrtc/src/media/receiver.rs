//! Inbound track reader

use crate::media::extension::{describe_metadata, extract_metadata};
use crate::peer::engine::InboundTrack;
use crate::session::peer_session::PeerSession;
use std::sync::Arc;
use tracing::{debug, info};

/// Read packets from `track` until the engine closes it
///
/// Logs the custom extension value of every packet that carries one.
/// Returns the number of packets read.
pub async fn run_track_reader(track: Arc<dyn InboundTrack>, session: Arc<PeerSession>) -> u64 {
    let handle = session.handle();
    let track_id = track.id();
    info!("{} reading track {}", handle, track_id);

    let mut received: u64 = 0;
    loop {
        let packet = match track.read_packet().await {
            Ok(packet) => packet,
            Err(e) => {
                debug!("{} track {} ended: {}", handle, track_id, e);
                break;
            }
        };
        received += 1;

        if let Some(value) = extract_metadata(&packet, session.extension()) {
            info!(
                "{} received metadata on track {}: {} (seq {})",
                handle,
                track_id,
                describe_metadata(&value),
                packet.header.sequence_number
            );
        }
    }

    info!("{} track {} closed after {} packets", handle, track_id, received);
    received
}
