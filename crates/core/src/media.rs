//! Media stream model
//!
//! Streams and tracks here are engine-level handles, decoupled from any
//! particular capture or transport backend. An [`AudioTrack`] carries live
//! mono f32 PCM chunks fanned out over a broadcast channel; a [`VideoTrack`]
//! is an opaque identity (video flows through the transport untouched).
//! Capture backends plug in through the [`MediaDevices`] trait.

use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Engine-wide PCM sample rate (16 kHz mono).
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 16_000;

/// Capacity of each track's chunk fan-out channel.
const CHUNK_CHANNEL_CAPACITY: usize = 64;

/// One chunk of mono f32 samples in [-1.0, 1.0].
pub type AudioChunk = Arc<Vec<f32>>;

/// Handle to a live mono PCM audio feed.
///
/// Cloning the handle shares the underlying feed. Producers call [`push`];
/// consumers call [`subscribe`] and read chunks from the returned tap.
///
/// [`push`]: AudioTrack::push
/// [`subscribe`]: AudioTrack::subscribe
#[derive(Debug, Clone)]
pub struct AudioTrack {
    id: String,
    label: String,
    sample_rate_hz: u32,
    chunks: broadcast::Sender<AudioChunk>,
}

impl AudioTrack {
    /// Create a track at the given sample rate.
    pub fn new(label: impl Into<String>, sample_rate_hz: u32) -> Self {
        let (chunks, _rx) = broadcast::channel(CHUNK_CHANNEL_CAPACITY);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            label: label.into(),
            sample_rate_hz,
            chunks,
        }
    }

    /// Unique track id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable label ("microphone", "mixed", ...).
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Sample rate of the PCM feed.
    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    /// Publish a chunk of samples to all taps.
    ///
    /// A track with no taps silently drops the chunk.
    pub fn push(&self, samples: Vec<f32>) {
        let _ = self.chunks.send(Arc::new(samples));
    }

    /// Open a tap on this track's feed.
    ///
    /// The tap only sees chunks pushed after it was opened.
    pub fn subscribe(&self) -> AudioTap {
        AudioTap {
            rx: self.chunks.subscribe(),
        }
    }

    /// Number of open taps.
    pub fn tap_count(&self) -> usize {
        self.chunks.receiver_count()
    }
}

/// Reader side of an [`AudioTrack`].
pub struct AudioTap {
    rx: broadcast::Receiver<AudioChunk>,
}

impl AudioTap {
    /// Wait for the next chunk.
    ///
    /// Lagged chunks (tap slower than the feed) are skipped. Returns `None`
    /// once every handle to the track has been dropped.
    pub async fn next(&mut self) -> Option<AudioChunk> {
        loop {
            match self.rx.recv().await {
                Ok(chunk) => return Some(chunk),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("audio tap lagged, skipped {} chunks", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next pending chunk without waiting, if any.
    pub fn try_next(&mut self) -> Option<AudioChunk> {
        loop {
            match self.rx.try_recv() {
                Ok(chunk) => return Some(chunk),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => return None,
            }
        }
    }
}

/// Opaque video track identity.
///
/// Video payloads never enter the engine; only track identity is tracked so
/// callers can attach and mirror tracks through the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoTrack {
    id: String,
    label: String,
}

impl VideoTrack {
    /// Create a video track handle.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            label: label.into(),
        }
    }

    /// Create a handle mirroring an externally-assigned id.
    pub fn with_id(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }

    /// Unique track id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable label.
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// An identified bag of audio and video tracks.
///
/// Streams are cheap handles; cloning shares the underlying track feeds.
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: String,
    audio: Vec<AudioTrack>,
    video: Vec<VideoTrack>,
}

impl MediaStream {
    /// Create an empty stream.
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            audio: Vec::new(),
            video: Vec::new(),
        }
    }

    /// Unique stream id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Add an audio track.
    pub fn add_audio_track(&mut self, track: AudioTrack) {
        self.audio.push(track);
    }

    /// Add a video track.
    pub fn add_video_track(&mut self, track: VideoTrack) {
        self.video.push(track);
    }

    /// Audio tracks in this stream.
    pub fn audio_tracks(&self) -> &[AudioTrack] {
        &self.audio
    }

    /// Video tracks in this stream.
    pub fn video_tracks(&self) -> &[VideoTrack] {
        &self.video
    }

    /// Whether the stream carries at least one audio track.
    pub fn has_audio(&self) -> bool {
        !self.audio.is_empty()
    }
}

impl Default for MediaStream {
    fn default() -> Self {
        Self::new()
    }
}

/// Requested capture kinds for [`MediaDevices::get_user_media`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    /// Request an audio (microphone) track.
    pub audio: bool,
    /// Request a video (camera) track.
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

/// Capture backend seam.
///
/// Implementations own device access; acquisition failure is surfaced as
/// [`Error::MediaAcquisition`] and aborts the call attempt before
/// negotiation begins.
#[async_trait::async_trait]
pub trait MediaDevices: Send + Sync {
    /// Acquire a local stream matching `constraints`.
    async fn get_user_media(&self, constraints: MediaConstraints) -> Result<MediaStream>;
}

/// Reject zero-track requests up front so backends can assume at least one
/// kind was asked for.
pub fn validate_constraints(constraints: &MediaConstraints) -> Result<()> {
    if !constraints.audio && !constraints.video {
        return Err(Error::MediaAcquisition(
            "at least one of audio or video must be requested".to_string(),
        ));
    }
    Ok(())
}
