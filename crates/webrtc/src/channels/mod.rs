//! Data-channel chat.
//!
//! One ordered, reliable data channel carries the in-call text chat:
//!
//! - [`WireChatMessage`] - the JSON both sides exchange
//! - [`ChatChannel`] - lifecycle tracking, restamping, delivery notices
//!
//! Anything identity-like arriving on the wire is discarded at the
//! edge; local entries carry locally generated ids and timestamps only.

mod chat;
mod messages;

pub use chat::{ChatChannel, ChatChannelState, ChatEvent, ChatOptions};
pub use messages::{restamp_inbound, WireChatMessage, MAX_MESSAGE_SIZE};
