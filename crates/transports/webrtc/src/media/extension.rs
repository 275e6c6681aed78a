//! Custom RTP header-extension negotiation and extraction

use crate::peer::engine::HeaderExtension;
use bytes::Bytes;
use std::sync::atomic::{AtomicI32, Ordering};
use webrtc::rtp::packet::Packet;

/// Sentinel stored while the extension id is not known yet
pub const UNRESOLVED: i32 = -1;

/// Find the id negotiated for `uri`
///
/// Walks every transceiver's extension list in order. When the URI appears
/// more than once the last occurrence wins. Ids outside 1..=255 cannot be
/// written into a packet and are ignored.
///
/// Returns [`UNRESOLVED`] when nothing matched.
pub fn resolve_extension_id(uri: &str, transceivers: &[Vec<HeaderExtension>]) -> i32 {
    let mut resolved = UNRESOLVED;
    for ext in transceivers.iter().flatten() {
        if ext.uri == uri && (1..=255).contains(&ext.id) {
            resolved = ext.id as i32;
        }
    }
    resolved
}

/// Extension URI plus the id it was bound to after negotiation
///
/// The id moves from unresolved to a concrete value exactly once. The
/// packetizer and the inbound reader read it concurrently.
#[derive(Debug)]
pub struct ExtensionBinding {
    uri: String,
    resolved: AtomicI32,
}

impl ExtensionBinding {
    /// Create an unresolved binding for `uri`
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            resolved: AtomicI32::new(UNRESOLVED),
        }
    }

    /// Extension URI
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Bind the negotiated id
    ///
    /// Returns `true` when this call performed the binding. Unresolved
    /// values and second bindings are ignored.
    pub fn bind(&self, id: i32) -> bool {
        if id == UNRESOLVED {
            return false;
        }
        self.resolved
            .compare_exchange(UNRESOLVED, id, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Negotiated id, if already known
    pub fn resolved_id(&self) -> Option<u8> {
        match self.resolved.load(Ordering::Acquire) {
            UNRESOLVED => None,
            id => u8::try_from(id).ok(),
        }
    }
}

/// Bytes carried under the bound extension id, if any
pub fn extract_metadata(packet: &Packet, binding: &ExtensionBinding) -> Option<Bytes> {
    let id = binding.resolved_id()?;
    packet.header.get_extension(id)
}

/// Render extension bytes for logging
///
/// Four bytes are shown as the big-endian integer the sender wrote; anything
/// else is shown as lossy UTF-8.
pub fn describe_metadata(value: &[u8]) -> String {
    match <[u8; 4]>::try_from(value) {
        Ok(raw) => u32::from_be_bytes(raw).to_string(),
        Err(_) => String::from_utf8_lossy(value).into_owned(),
    }
}
