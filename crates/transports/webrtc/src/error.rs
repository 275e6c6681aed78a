//! Error types for the AudioLink WebRTC crate

use thiserror::Error;

/// Result type alias for AudioLink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by signaling, session management and media handling
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The peer-connection engine rejected an operation
    #[error("WebRTC error: {0}")]
    WebRtcError(String),

    /// Signaling channel or signaling message error
    #[error("Signaling error: {0}")]
    SignalingError(String),

    /// A signaling message was not valid JSON or lacked a required field
    #[error("Malformed signaling message: {0}")]
    MalformedMessage(String),

    /// Session lookup or lifecycle error
    #[error("Session error: {0}")]
    SessionError(String),

    /// Writing or reading an RTP packet failed
    #[error("Media track error: {0}")]
    MediaTrackError(String),

    /// The audio container could not be decoded
    #[error("Container decode error: {0}")]
    DecodeError(String),

    /// The configured audio file does not exist
    #[error("Audio file unavailable: {0}")]
    AudioUnavailable(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error only affects the message being processed.
    ///
    /// Signaling loops keep running after such errors; everything else
    /// is reported the same way but is worth a louder log line.
    pub fn is_per_message(&self) -> bool {
        matches!(
            self,
            Error::MalformedMessage(_) | Error::Json(_) | Error::WebRtcError(_)
        )
    }
}
