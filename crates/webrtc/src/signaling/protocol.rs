//! Relay wire protocol: JSON envelopes with base64 payloads.
//!
//! The relay forwards opaque envelopes between the two parties on a
//! channel. Each envelope names an action and carries the actual SDP or
//! ICE JSON base64-encoded in `messagePayload`. The joiner stamps its
//! `senderClientId` on everything it sends; the initiator addresses its
//! replies with `recipientClientId`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;

use crate::error::{Error, Result};

/// Envelope actions understood by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayAction {
    SdpOffer,
    SdpAnswer,
    IceCandidate,
}

impl RelayAction {
    /// Action name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            RelayAction::SdpOffer => "SDP_OFFER",
            RelayAction::SdpAnswer => "SDP_ANSWER",
            RelayAction::IceCandidate => "ICE_CANDIDATE",
        }
    }
}

/// One relay message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayEnvelope {
    pub action: RelayAction,
    /// Base64 of the JSON payload for `action`
    pub message_payload: String,
    /// Joiner's client id, stamped on joiner-sent envelopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_client_id: Option<String>,
    /// Addressee client id, stamped on initiator-sent envelopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_client_id: Option<String>,
}

impl RelayEnvelope {
    /// Build an envelope around a serializable payload.
    pub fn new<T: Serialize>(action: RelayAction, payload: &T) -> Result<Self> {
        let json = serde_json::to_vec(payload)?;
        Ok(Self {
            action,
            message_payload: BASE64.encode(json),
            sender_client_id: None,
            recipient_client_id: None,
        })
    }

    /// An SDP offer envelope.
    pub fn offer(payload: &SessionDescriptionPayload) -> Result<Self> {
        Self::new(RelayAction::SdpOffer, payload)
    }

    /// An SDP answer envelope.
    pub fn answer(payload: &SessionDescriptionPayload) -> Result<Self> {
        Self::new(RelayAction::SdpAnswer, payload)
    }

    /// An ICE candidate envelope.
    pub fn ice(payload: &IceCandidatePayload) -> Result<Self> {
        Self::new(RelayAction::IceCandidate, payload)
    }

    /// Stamp the sender client id (joiner side).
    pub fn from_sender(mut self, client_id: impl Into<String>) -> Self {
        self.sender_client_id = Some(client_id.into());
        self
    }

    /// Stamp the recipient client id (initiator side).
    pub fn to_recipient(mut self, client_id: impl Into<String>) -> Self {
        self.recipient_client_id = Some(client_id.into());
        self
    }

    /// Decode the base64 payload into the type `action` implies.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T> {
        let bytes = BASE64
            .decode(&self.message_payload)
            .map_err(|e| Error::Signaling(format!("invalid base64 payload: {}", e)))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Serialize the envelope to relay text.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse relay text into an envelope.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// SDP type discriminator inside a session description payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Payload of `SDP_OFFER` and `SDP_ANSWER` envelopes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDescriptionPayload {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescriptionPayload {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Payload of `ICE_CANDIDATE` envelopes, in the browser JSON shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceCandidatePayload {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    #[serde(
        rename = "usernameFragment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_fragment: Option<String>,
}

impl From<RTCIceCandidateInit> for IceCandidatePayload {
    fn from(init: RTCIceCandidateInit) -> Self {
        Self {
            candidate: init.candidate,
            sdp_mid: init.sdp_mid,
            sdp_mline_index: init.sdp_mline_index,
            username_fragment: init.username_fragment,
        }
    }
}

impl From<IceCandidatePayload> for RTCIceCandidateInit {
    fn from(payload: IceCandidatePayload) -> Self {
        Self {
            candidate: payload.candidate,
            sdp_mid: payload.sdp_mid,
            sdp_mline_index: payload.sdp_mline_index,
            username_fragment: payload.username_fragment,
        }
    }
}
