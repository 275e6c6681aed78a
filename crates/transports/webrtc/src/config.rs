//! Configuration types for AudioLink sessions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Header-extension URI negotiated for the per-packet correlation value
pub const DEFAULT_EXTENSION_URI: &str = "urn:ietf:params:rtp-hdrext:session-id";

/// Opus dynamic payload type used by browsers and webrtc-rs defaults
pub const OPUS_PAYLOAD_TYPE: u8 = 111;

/// Main configuration shared by every session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioLinkConfig {
    /// STUN server URLs (at least one required)
    pub stun_servers: Vec<String>,

    /// URI of the custom RTP header extension (default: session-id URN)
    pub extension_uri: String,

    /// Ogg/Opus file streamed to every connected peer
    pub audio_file: PathBuf,

    /// Pacing interval between two pages in milliseconds (default: 20)
    pub page_interval_ms: u64,

    /// RTP payload type for outbound packets (default: 111)
    pub payload_type: u8,

    /// RTP SSRC for outbound packets (default: 12345)
    pub ssrc: u32,

    /// Correlation value written big-endian into the header extension
    pub correlation_value: u32,

    /// Maximum concurrent sessions (0 = unlimited)
    pub max_sessions: usize,
}

impl Default for AudioLinkConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            extension_uri: DEFAULT_EXTENSION_URI.to_string(),
            audio_file: PathBuf::from("output.ogg"),
            page_interval_ms: 20,
            payload_type: OPUS_PAYLOAD_TYPE,
            ssrc: 12345,
            correlation_value: 12345,
            max_sessions: 0,
        }
    }
}

impl AudioLinkConfig {
    /// Page pacing interval as a `Duration`
    pub fn page_interval(&self) -> Duration {
        Duration::from_millis(self.page_interval_ms)
    }

    /// Whether the configured audio file is present on disk
    pub fn audio_available(&self) -> bool {
        self.audio_file.is_file()
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `stun_servers` is empty or contains a non-STUN URL
    /// - `extension_uri` is empty
    /// - `page_interval_ms` is not in range 1-1000
    /// - `payload_type` is not a dynamic payload type (96-127)
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if self.stun_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one STUN server is required".to_string(),
            ));
        }

        if let Some(bad) = self
            .stun_servers
            .iter()
            .find(|url| !url.starts_with("stun:") && !url.starts_with("stuns:"))
        {
            return Err(Error::InvalidConfig(format!(
                "stun server must start with stun: or stuns:, got {}",
                bad
            )));
        }

        if self.extension_uri.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "extension_uri must not be empty".to_string(),
            ));
        }

        if self.page_interval_ms == 0 || self.page_interval_ms > 1000 {
            return Err(Error::InvalidConfig(format!(
                "page_interval_ms must be in range 1-1000, got {}",
                self.page_interval_ms
            )));
        }

        if !(96..=127).contains(&self.payload_type) {
            return Err(Error::InvalidConfig(format!(
                "payload_type must be a dynamic payload type (96-127), got {}",
                self.payload_type
            )));
        }

        Ok(())
    }
}
