//! Peer negotiation and in-call messaging for telecare calls
//!
//! This crate connects two call participants. It speaks the relay's
//! base64-enveloped signaling protocol over WebSocket, drives the
//! offer/answer exchange for a fixed role, trickles ICE candidates,
//! runs data-channel chat, and hands both audio sides to the
//! transcription driver as they become available.
//!
//! # Features
//!
//! - **Signaling relay**: envelope codec plus a pump task that turns the
//!   wire into typed events and stamps outbound identity
//! - **Peer link**: webrtc-rs connection with opus audio, ordered data
//!   channels, and an observable six-state lifecycle
//! - **Role orchestration**: initiator answers, joiner offers; neither
//!   retries after a terminal state
//! - **Chat**: wire-format messages restamped at the edge, delivery
//!   problems surfaced as timed notices
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ RelaySession ──typed events──> CallSession              │
//! │      ▲                           │        │             │
//! │ RelaySender <──offer/answer/ice──┘        │             │
//! │                                           ▼             │
//! │ PeerConnection ──tracks──> RemoteAudioAdapter           │
//! │      │                           │                      │
//! │      │ data channel              ▼                      │
//! │      ▼                   TranscriptionDriver            │
//! │ ChatChannel ──messages/notices──> CallEvent stream      │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use telecare_webrtc::{CallConfig, CallRole};
//!
//! let config = CallConfig::new("room-42", "wss://relay.example/signaling");
//! assert!(config.validate().is_ok());
//! assert!(CallRole::Joiner.is_joiner());
//! ```

#![warn(clippy::all)]

pub mod call;
pub mod channels;
pub mod config;
pub mod error;
pub mod media;
pub mod peer;
pub mod signaling;

// Re-exports for public API
pub use call::{CallEvent, CallSession};
pub use channels::{ChatChannel, ChatChannelState, ChatEvent, ChatOptions, MAX_MESSAGE_SIZE};
pub use config::{stun_url_for_region, CallConfig, CallRole, IceServer};
pub use error::{Error, Result};
pub use media::RemoteAudioAdapter;
pub use peer::{ConnectionState, PeerConnection};
pub use signaling::{
    IceCandidatePayload, RelayAction, RelayEnvelope, RelaySender, RelaySession,
    SessionDescriptionPayload, SignalingChannel, SignalingEvent, WebSocketChannel,
};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let ver = version();
        assert!(!ver.is_empty());
    }
}
