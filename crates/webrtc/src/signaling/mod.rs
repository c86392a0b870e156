//! Signaling relay: wire protocol and session pump.
//!
//! Negotiation traffic travels through a message relay both parties
//! attach to. The [`protocol`] module defines the envelope format; the
//! [`session`] module runs the transport pump and exposes typed events.

pub mod protocol;
pub mod session;

pub use protocol::{
    IceCandidatePayload, RelayAction, RelayEnvelope, SdpKind, SessionDescriptionPayload,
};
pub use session::{
    MemoryChannel, RelaySender, RelaySession, SignalingChannel, SignalingEvent, WebSocketChannel,
};
