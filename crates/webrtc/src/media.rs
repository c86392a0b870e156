//! Remote media adaptation seam.

use std::sync::Arc;

use async_trait::async_trait;
use telecare_core::AudioTrack;
use webrtc::track::track_remote::TrackRemote;

use crate::error::Result;

/// Decodes a remote RTP audio track into the PCM track model.
///
/// Implementations own the RTP read loop and codec decode; the returned
/// track pushes mono float samples at the call's sample rate for as
/// long as RTP flows. Without an adapter the call still connects, but
/// the remote party cannot be composed into the transcription mix.
#[async_trait]
pub trait RemoteAudioAdapter: Send + Sync {
    /// Start decoding `track` and return its PCM counterpart.
    async fn adapt(&self, track: Arc<TrackRemote>) -> Result<AudioTrack>;
}
