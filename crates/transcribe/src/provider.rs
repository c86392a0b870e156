//! Transcription provider seam
//!
//! The driver talks to speech recognition through one trait: hand over a
//! stream request plus a channel of PCM frames, get back a stream of
//! transcript events. Closing the frame channel ends the stream.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio::sync::mpsc;

/// Audio encoding of the frames sent to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaEncoding {
    /// Signed 16-bit little-endian PCM.
    Pcm,
}

/// Parameters for one transcript stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRequest {
    /// Language to transcribe, e.g. `zh-TW`.
    pub language_code: String,
    /// Sample rate of the PCM frames in hertz.
    pub sample_rate_hz: u32,
    /// Frame encoding.
    pub encoding: MediaEncoding,
}

/// One recognition result from the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEvent {
    /// Recognized text.
    pub transcript: String,
    /// True while the provider may still revise this result.
    pub is_partial: bool,
}

/// Stream of transcript events for one open stream.
pub type TranscriptStream = Pin<Box<dyn Stream<Item = Result<TranscriptEvent>> + Send>>;

/// Speech recognition service.
#[async_trait]
pub trait TranscribeProvider: Send + Sync {
    /// Open a transcript stream fed by `frames`.
    ///
    /// The stream ends after the frame channel closes and the provider has
    /// flushed its remaining results.
    async fn start_stream(
        &self,
        request: StreamRequest,
        frames: mpsc::Receiver<Bytes>,
    ) -> Result<TranscriptStream>;
}
