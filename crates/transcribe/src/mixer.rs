//! Audio composition
//!
//! Sums the local and remote call audio into one mono track that feeds the
//! transcript stream. Mixing is tick-based: every tick drains whatever each
//! source produced, sums one tick's worth of samples with zero padding for
//! the quieter-clocked source, and publishes the result. Nothing is
//! published while both sources are idle.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use telecare_core::{AudioTap, AudioTrack, MediaStream, DEFAULT_SAMPLE_RATE_HZ};
use tokio::task::JoinHandle;
use tracing::debug;

/// Label of the composed output track.
pub const MIXED_TRACK_LABEL: &str = "mixed";

/// Mixing cadence in milliseconds.
const TICK_INTERVAL_MS: u64 = 16;

/// Upper bound on buffered samples per source, one second of audio.
/// A source running hot against the tick clock loses its oldest samples.
fn max_buffered_samples(sample_rate_hz: u32) -> usize {
    sample_rate_hz as usize
}

/// Handle to a running mix.
///
/// Holds the tick task alive. Call [`close`](MixContext::close) when the
/// mix is replaced or the call ends; a forgotten context keeps its task
/// ticking.
pub struct MixContext {
    live: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl MixContext {
    /// Whether the tick task is still running.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire) && !self.task.is_finished()
    }

    /// Stop the tick task and release the source taps.
    pub fn close(self) {
        self.live.store(false, Ordering::Release);
        self.task.abort();
        debug!("mix context closed");
    }
}

/// Compose the call audio into a single-track stream.
///
/// The first audio track of each input that has one is tapped; an input
/// without audio contributes silence. The returned stream carries exactly
/// one audio track, labeled [`MIXED_TRACK_LABEL`], at the sample rate of
/// the first tapped source.
pub fn compose(local: &MediaStream, remote: &MediaStream) -> (MediaStream, MixContext) {
    let mut taps: Vec<AudioTap> = Vec::new();
    let mut sample_rate_hz = None;
    for stream in [local, remote] {
        if let Some(track) = stream.audio_tracks().first() {
            taps.push(track.subscribe());
            sample_rate_hz.get_or_insert(track.sample_rate_hz());
        }
    }
    let sample_rate_hz = sample_rate_hz.unwrap_or(DEFAULT_SAMPLE_RATE_HZ);

    let mixed = AudioTrack::new(MIXED_TRACK_LABEL, sample_rate_hz);
    let live = Arc::new(AtomicBool::new(true));
    let task = tokio::spawn(mix_task(taps, mixed.clone(), Arc::clone(&live)));

    let mut stream = MediaStream::new();
    stream.add_audio_track(mixed);
    debug!(
        stream_id = %stream.id(),
        sources = stream.audio_tracks().len(),
        "composed mixed stream"
    );
    (stream, MixContext { live, task })
}

async fn mix_task(taps: Vec<AudioTap>, out: AudioTrack, live: Arc<AtomicBool>) {
    let sample_rate_hz = out.sample_rate_hz();
    let tick_samples = (u64::from(sample_rate_hz) * TICK_INTERVAL_MS / 1000) as usize;
    let buffer_cap = max_buffered_samples(sample_rate_hz);
    let mut sources: Vec<(AudioTap, VecDeque<f32>)> =
        taps.into_iter().map(|tap| (tap, VecDeque::new())).collect();

    let mut interval = tokio::time::interval(Duration::from_millis(TICK_INTERVAL_MS));
    loop {
        interval.tick().await;
        if !live.load(Ordering::Acquire) {
            break;
        }

        for (tap, buffer) in sources.iter_mut() {
            while let Some(chunk) = tap.try_next() {
                buffer.extend(chunk.iter().copied());
            }
            if buffer.len() > buffer_cap {
                let overflow = buffer.len() - buffer_cap;
                buffer.drain(..overflow);
                debug!("mix source overran, dropped {} samples", overflow);
            }
        }

        if sources.iter().all(|(_, buffer)| buffer.is_empty()) {
            continue;
        }

        let mut mixed = vec![0.0f32; tick_samples];
        for (_, buffer) in sources.iter_mut() {
            for slot in mixed.iter_mut() {
                match buffer.pop_front() {
                    Some(sample) => *slot += sample,
                    None => break,
                }
            }
        }
        for sample in mixed.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
        out.push(mixed);
    }
}
