//! Shared primitives for the telecare call engine
//!
//! This crate holds everything the connection and transcription layers have
//! in common: observable state cells, the in-process media model, PCM
//! conversion, chat history, and the seams to external services.
//!
//! # Features
//!
//! - **Observable state**: last-value-replay cells backed by `tokio::sync::watch`
//! - **Media model**: audio tracks with fan-out taps, device acquisition seam
//! - **PCM framing**: f32 ↔ 16-bit little-endian conversion for streaming
//! - **Chat**: immutable messages, monotonic local ids, unread bookkeeping
//! - **Service seams**: credentials, translation, assistant, storage upload
//! - **Recording**: in-memory WAV capture of one audio track
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │  telecare-webrtc      (call orchestration)       │
//! │  telecare-transcribe  (mixing + captions)        │
//! │      ↓ shared primitives                         │
//! │  telecare-core                                   │
//! │  ├─ observable  (watch-backed state cells)       │
//! │  ├─ media       (tracks, taps, device seam)      │
//! │  ├─ pcm         (f32 ↔ i16 framing)              │
//! │  ├─ chat        (messages, ids, unread counts)   │
//! │  ├─ providers   (external-service traits)        │
//! │  └─ recorder    (WAV capture + upload)           │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use telecare_core::{ChatLog, ChatMessage, MessageIdGen, Observable};
//!
//! let ids = MessageIdGen::new();
//! let mut log = ChatLog::new();
//! log.push(ChatMessage::incoming(ids.next(), "hello", None));
//! assert_eq!(log.unread(), 1);
//!
//! let caption = Observable::new(String::new());
//! caption.set("hello world ".to_string());
//! assert_eq!(caption.get(), "hello world ");
//! ```

#![warn(clippy::all)]

pub mod chat;
pub mod error;
pub mod media;
pub mod observable;
pub mod pcm;
pub mod providers;
pub mod recorder;
pub mod session;

// Re-exports for public API
pub use chat::{ChatLog, ChatMessage, MessageIdGen, ParticipantRole};
pub use error::{Error, Result};
pub use media::{
    AudioChunk, AudioTap, AudioTrack, MediaConstraints, MediaDevices, MediaStream, VideoTrack,
    DEFAULT_SAMPLE_RATE_HZ,
};
pub use observable::{Observable, Subscription};
pub use providers::{
    AssistantChat, CachedCredentials, ChatBackend, CredentialsBundle, CredentialsProvider,
    Language, LanguagePair, StorageUpload, Translator, DEFAULT_LANGUAGE_CODE,
};
pub use recorder::Recorder;
pub use session::{session_id, Notice};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
