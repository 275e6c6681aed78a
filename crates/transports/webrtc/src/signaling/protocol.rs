//! Signaling wire format
//!
//! One JSON object per message, discriminated by `type`:
//!
//! ```json
//! {"type": "offer", "sdp": "v=0..."}
//! {"type": "answer", "sdp": "v=0..."}
//! {"type": "candidate", "candidate": "candidate:...", "sdpMid": "0", "sdpMLineIndex": 0}
//! {"type": "hello"}
//! ```

use crate::peer::engine::IceCandidate;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

const KNOWN_TYPES: [&str; 4] = ["offer", "answer", "candidate", "hello"];

/// Candidate payload as sent by browsers
///
/// Fields are optional on the wire so that a message missing one of them
/// can be reported instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateMessage {
    /// Candidate attribute line
    pub candidate: Option<String>,

    /// Media stream identification tag
    #[serde(rename = "sdpMid")]
    pub sdp_mid: Option<String>,

    /// Index of the m-line
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
}

impl CandidateMessage {
    /// Convert to an engine candidate, rejecting missing fields
    pub fn into_candidate(self) -> Result<IceCandidate> {
        let candidate = self
            .candidate
            .ok_or_else(|| Error::MalformedMessage("candidate message missing candidate".into()))?;
        let sdp_mid = self
            .sdp_mid
            .ok_or_else(|| Error::MalformedMessage("candidate message missing sdpMid".into()))?;
        let sdp_mline_index = self.sdp_mline_index.ok_or_else(|| {
            Error::MalformedMessage("candidate message missing sdpMLineIndex".into())
        })?;

        Ok(IceCandidate {
            candidate,
            sdp_mid,
            sdp_mline_index,
        })
    }
}

impl From<IceCandidate> for CandidateMessage {
    fn from(candidate: IceCandidate) -> Self {
        Self {
            candidate: Some(candidate.candidate),
            sdp_mid: Some(candidate.sdp_mid),
            sdp_mline_index: Some(candidate.sdp_mline_index),
        }
    }
}

/// Message exchanged over the signaling channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalingMessage {
    /// Session description offer
    Offer {
        /// SDP text
        sdp: String,
    },
    /// Session description answer
    Answer {
        /// SDP text
        sdp: String,
    },
    /// Connectivity candidate
    Candidate(CandidateMessage),
    /// Ask the other side for a fresh offer
    Hello,
}

impl SignalingMessage {
    /// Parse one message
    ///
    /// Returns `Ok(None)` for a well-formed message of an unknown type.
    pub fn parse(text: &str) -> Result<Option<Self>> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| Error::MalformedMessage(format!("invalid JSON: {}", e)))?;

        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| Error::MalformedMessage("missing type field".to_string()))?;

        if !KNOWN_TYPES.contains(&kind) {
            return Ok(None);
        }

        let kind = kind.to_string();
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| Error::MalformedMessage(format!("invalid {} message: {}", kind, e)))
    }

    /// Serialize to the JSON wire form
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wire name of the message type
    pub fn kind(&self) -> &'static str {
        match self {
            SignalingMessage::Offer { .. } => "offer",
            SignalingMessage::Answer { .. } => "answer",
            SignalingMessage::Candidate(_) => "candidate",
            SignalingMessage::Hello => "hello",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_parse_offer() {
        let msg = SignalingMessage::parse(r#"{"type":"offer","sdp":"v=0"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(msg, SignalingMessage::Offer { sdp: "v=0".into() });
    }

    #[test]
    fn test_parse_hello() {
        let msg = SignalingMessage::parse(r#"{"type":"hello"}"#).unwrap().unwrap();
        assert_eq!(msg, SignalingMessage::Hello);
    }

    #[test]
    fn test_parse_candidate() {
        let text = r#"{"type":"candidate","candidate":"candidate:1 1 udp 1 10.0.0.1 5000 typ host","sdpMid":"0","sdpMLineIndex":0}"#;
        let msg = SignalingMessage::parse(text).unwrap().unwrap();

        let SignalingMessage::Candidate(candidate) = msg else {
            panic!("expected candidate");
        };
        let candidate = candidate.into_candidate().unwrap();
        assert_eq!(candidate.sdp_mid, "0");
        assert_eq!(candidate.sdp_mline_index, 0);
    }

    #[test]
    fn test_candidate_missing_mid_is_rejected() {
        let text = r#"{"type":"candidate","candidate":"candidate:1","sdpMLineIndex":0}"#;
        let Some(SignalingMessage::Candidate(candidate)) = SignalingMessage::parse(text).unwrap()
        else {
            panic!("expected candidate");
        };
        assert!(matches!(
            candidate.into_candidate(),
            Err(Error::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        assert_eq!(SignalingMessage::parse(r#"{"type":"bye"}"#).unwrap(), None);
    }

    #[test]
    fn test_malformed_messages() {
        assert!(SignalingMessage::parse("not json").is_err());
        assert!(SignalingMessage::parse(r#"{"sdp":"v=0"}"#).is_err());
        assert!(SignalingMessage::parse(r#"{"type":"offer"}"#).is_err());
    }

    #[test]
    fn test_wire_field_names() {
        let msg = SignalingMessage::Candidate(CandidateMessage::from(IceCandidate {
            candidate: "candidate:1".into(),
            sdp_mid: "audio".into(),
            sdp_mline_index: 1,
        }));
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "candidate",
                "candidate": "candidate:1",
                "sdpMid": "audio",
                "sdpMLineIndex": 1
            })
        );

        let offer: Value =
            serde_json::from_str(&SignalingMessage::Offer { sdp: "v=0".into() }.to_json().unwrap())
                .unwrap();
        assert_eq!(offer, json!({"type": "offer", "sdp": "v=0"}));
    }
}
