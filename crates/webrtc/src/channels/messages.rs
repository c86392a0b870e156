//! Chat wire format for the data channel.
//!
//! Both sides exchange the same JSON shape. Inbound messages are never
//! trusted for identity or ordering: receipt restamps a fresh local id
//! and timestamp, and `sentAt` is display-only.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use telecare_core::{ChatMessage, ParticipantRole};

use crate::error::Result;

/// Ceiling on one serialized chat message.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// A chat message as it travels over the data channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireChatMessage {
    /// Message body
    pub text: String,
    /// Author's role tag, omitted when the sender has none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ParticipantRole>,
    /// Sender's clock in unix milliseconds; display only
    pub sent_at: i64,
    /// Sender's client id
    pub sender_id: String,
}

impl WireChatMessage {
    /// Build an outbound wire message stamped with the local clock.
    pub fn outgoing(
        text: impl Into<String>,
        role: Option<ParticipantRole>,
        sender_id: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            role,
            sent_at: Utc::now().timestamp_millis(),
            sender_id: sender_id.into(),
        }
    }

    /// Serialize for the data channel.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse bytes received on the data channel.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Rebuild an inbound wire message as a local chat entry.
///
/// The remote clock and any remote ids are discarded; the entry gets a
/// fresh local id and receipt timestamp.
pub fn restamp_inbound(wire: WireChatMessage, id: u64) -> ChatMessage {
    ChatMessage::incoming(id, wire.text, wire.role)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_json_field_names() {
        let wire = WireChatMessage {
            text: "hello".to_string(),
            role: Some(ParticipantRole::Doctor),
            sent_at: 1_700_000_000_000,
            sender_id: "c-9".to_string(),
        };
        let json = String::from_utf8(wire.to_bytes().unwrap()).unwrap();
        assert!(json.contains("\"sentAt\":1700000000000"));
        assert!(json.contains("\"senderId\":\"c-9\""));
        assert!(json.contains("\"role\":\"doctor\""));
    }

    #[test]
    fn test_role_omitted_when_absent() {
        let wire = WireChatMessage::outgoing("hi", None, "c-1");
        let json = String::from_utf8(wire.to_bytes().unwrap()).unwrap();
        assert!(!json.contains("role"));
    }

    #[test]
    fn test_missing_role_parses() {
        let wire = WireChatMessage::from_bytes(
            br#"{"text":"ping","sentAt":0,"senderId":"c-2"}"#,
        )
        .unwrap();
        assert_eq!(wire.text, "ping");
        assert!(wire.role.is_none());
    }

    #[test]
    fn test_restamp_discards_remote_identity() {
        let wire = WireChatMessage {
            text: "from afar".to_string(),
            role: Some(ParticipantRole::Patient),
            // A clock far in the future must not leak into the local entry.
            sent_at: i64::MAX,
            sender_id: "remote-1".to_string(),
        };
        let before = Utc::now();
        let message = restamp_inbound(wire, 17);
        assert_eq!(message.id, 17);
        assert!(!message.is_self);
        assert_eq!(message.role, Some(ParticipantRole::Patient));
        assert!(message.timestamp >= before);
        assert!(message.timestamp <= Utc::now());
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        assert!(WireChatMessage::from_bytes(b"\xff\xfe not json").is_err());
    }
}
