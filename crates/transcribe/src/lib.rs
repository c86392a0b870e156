//! Voice-gated streaming transcription for telecare calls
//!
//! This crate turns the two audio sides of a call into live captions. The
//! local and remote streams are summed into one mono track, a fast level
//! probe watches it for voice, and a provider stream is opened only while
//! someone is speaking. Silence closes the stream and resets the caption.
//!
//! # Features
//!
//! - **Audio composition**: tick-based summing of both call sides with clamping
//! - **Voice-activity gate**: counter-based open/close with configurable tuning
//! - **Frame pacing**: fixed-size PCM frames, one per interval, with keep-alive
//! - **Provider seam**: speech recognition behind one async trait
//! - **Caption accumulation**: observable transcript, partials dropped,
//!   finals optionally translated before display
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  local stream ─┐                                     │
//! │                ├─ mixer::compose ──> "mixed" track   │
//! │  remote stream ┘         │                           │
//! │                          ├─ LevelProbe ─> ActivityGate
//! │                          │       │ engaged/released  │
//! │                          └─ FramePipeline            │
//! │                                  │ paced PCM frames  │
//! │                          TranscribeProvider          │
//! │                                  │ transcript events │
//! │                          TranscriptionDriver         │
//! │                                  └─> Observable<String>
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use telecare_transcribe::{GateConfig, TranscribeConfig};
//!
//! let config = TranscribeConfig::default().with_gate(GateConfig::steady());
//! assert!(config.validate().is_ok());
//! assert_eq!(config.language_code, "zh-TW");
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod driver;
pub mod error;
pub mod frames;
pub mod gate;
pub mod mixer;
pub mod provider;

// Re-exports for public API
pub use config::{GateConfig, TranscribeConfig};
pub use driver::TranscriptionDriver;
pub use error::{Error, Result};
pub use frames::FramePipeline;
pub use gate::{ActivityGate, GateTransition, LevelProbe};
pub use mixer::{compose, MixContext, MIXED_TRACK_LABEL};
pub use provider::{
    MediaEncoding, StreamRequest, TranscribeProvider, TranscriptEvent, TranscriptStream,
};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
