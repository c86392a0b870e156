//! Error types for peer negotiation, signaling, and data channels.

use thiserror::Error;

/// Errors produced while negotiating and running a call.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid call configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Signaling channel failure (connect, send, or relay protocol)
    #[error("Signaling error: {0}")]
    Signaling(String),

    /// SDP offer/answer handling failure
    #[error("SDP error: {0}")]
    Sdp(String),

    /// ICE candidate parse or apply failure
    #[error("ICE candidate error: {0}")]
    IceCandidate(String),

    /// Data channel create or send failure
    #[error("Data channel error: {0}")]
    DataChannel(String),

    /// Peer connection API failure
    #[error("Peer connection error: {0}")]
    PeerConnection(String),

    /// Local or remote media track failure
    #[error("Media track error: {0}")]
    MediaTrack(String),

    /// Error bubbled up from the shared primitives
    #[error("Core error: {0}")]
    Core(#[from] telecare_core::Error),

    /// Error bubbled up from the transcription pipeline
    #[error("Transcription error: {0}")]
    Transcribe(#[from] telecare_transcribe::Error),

    /// JSON encode/decode failure for envelopes and chat payloads
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error means the call cannot proceed at all.
    ///
    /// Media acquisition and configuration failures abort call setup;
    /// most signaling and channel errors are survivable mid-call.
    pub fn is_call_aborting(&self) -> bool {
        match self {
            Error::InvalidConfig(_) => true,
            Error::Core(e) => e.is_call_aborting(),
            _ => false,
        }
    }

    /// Whether this error came from the signaling relay.
    pub fn is_signaling_error(&self) -> bool {
        matches!(self, Error::Signaling(_))
    }
}
