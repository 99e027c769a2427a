//! Peer-to-peer data-channel messages.
//!
//! Wire format is JSON `{"type": "...", "payload": ...}`. Older clients send
//! the bare type string (`audioOn`), which is accepted for every message
//! without a payload. Anything unrecognised parses to `None` and is ignored.

use serde::{Deserialize, Serialize};

/// A message exchanged over the peer data channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum DataChannelMessage {
    AudioOn,
    AudioOff,
    VideoOn,
    VideoOff,
    Speaking,
    StoppedSpeaking,
    RaiseHand,
    LowerHand,
    NickChanged { name: String },
}

impl DataChannelMessage {
    /// Parse wire text. Returns `None` for unknown or malformed messages.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.starts_with('{') {
            serde_json::from_str(text).ok()
        } else {
            serde_json::from_value(serde_json::json!({ "type": text })).ok()
        }
    }

    /// Encode to wire text.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; cannot happen for these variants in
    /// practice.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Message type name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            DataChannelMessage::AudioOn => "audioOn",
            DataChannelMessage::AudioOff => "audioOff",
            DataChannelMessage::VideoOn => "videoOn",
            DataChannelMessage::VideoOff => "videoOff",
            DataChannelMessage::Speaking => "speaking",
            DataChannelMessage::StoppedSpeaking => "stoppedSpeaking",
            DataChannelMessage::RaiseHand => "raiseHand",
            DataChannelMessage::LowerHand => "lowerHand",
            DataChannelMessage::NickChanged { .. } => "nickChanged",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_type_strings() {
        assert_eq!(
            DataChannelMessage::parse("audioOn"),
            Some(DataChannelMessage::AudioOn)
        );
        assert_eq!(
            DataChannelMessage::parse(" stoppedSpeaking\n"),
            Some(DataChannelMessage::StoppedSpeaking)
        );
        assert_eq!(
            DataChannelMessage::parse("raiseHand"),
            Some(DataChannelMessage::RaiseHand)
        );
    }

    #[test]
    fn test_parse_json_envelope() {
        assert_eq!(
            DataChannelMessage::parse(r#"{"type":"videoOff"}"#),
            Some(DataChannelMessage::VideoOff)
        );
        assert_eq!(
            DataChannelMessage::parse(r#"{"type":"nickChanged","payload":{"name":"Alice"}}"#),
            Some(DataChannelMessage::NickChanged {
                name: "Alice".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_messages_ignored() {
        assert_eq!(DataChannelMessage::parse("dance"), None);
        assert_eq!(DataChannelMessage::parse(r#"{"type":"dance"}"#), None);
        assert_eq!(DataChannelMessage::parse("{not json"), None);
        assert_eq!(DataChannelMessage::parse(""), None);
        // Payload-carrying messages need the envelope.
        assert_eq!(DataChannelMessage::parse("nickChanged"), None);
    }

    #[test]
    fn test_encode_matches_wire_format() {
        assert_eq!(
            DataChannelMessage::AudioOff.encode().unwrap(),
            r#"{"type":"audioOff"}"#
        );
        assert_eq!(
            DataChannelMessage::NickChanged {
                name: "Bob".to_string()
            }
            .encode()
            .unwrap(),
            r#"{"type":"nickChanged","payload":{"name":"Bob"}}"#
        );
    }
}
