//! PCM frame production
//!
//! Turns the mixed track's float chunks into paced 16-bit frames for the
//! transcription provider. Capture and pacing are split: a capture task
//! cuts fixed-size blocks into an internal queue, a drain task forwards one
//! frame per interval and substitutes a short silence frame when the queue
//! has been empty long enough for the provider to time out.

use crate::config::TranscribeConfig;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use telecare_core::{pcm, AudioTrack};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Frames buffered between capture and drain before the oldest is dropped.
const FRAME_QUEUE_CAPACITY: usize = 64;

/// Capacity of the outbound frame channel.
const FRAME_CHANNEL_CAPACITY: usize = 8;

/// How often the capture task rechecks liveness while the track is quiet.
const CAPTURE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Running frame producer for one provider stream.
///
/// Take the receiver with [`frames`](FramePipeline::frames) and hand it to
/// the provider; call [`stop`](FramePipeline::stop) when the stream closes.
pub struct FramePipeline {
    frames: Option<mpsc::Receiver<Bytes>>,
    live: Arc<AtomicBool>,
    capture: JoinHandle<()>,
    drain: JoinHandle<()>,
}

impl FramePipeline {
    /// Begin producing frames from `track`.
    pub fn start(track: &AudioTrack, config: &TranscribeConfig) -> Self {
        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let live = Arc::new(AtomicBool::new(true));
        let queue: Arc<Mutex<VecDeque<Bytes>>> = Arc::new(Mutex::new(VecDeque::new()));

        let capture = tokio::spawn(capture_task(
            track.subscribe(),
            config.block_size,
            Arc::clone(&queue),
            Arc::clone(&live),
        ));
        let drain = tokio::spawn(drain_task(
            tx,
            config.clone(),
            queue,
            Arc::clone(&live),
        ));

        Self {
            frames: Some(rx),
            live,
            capture,
            drain,
        }
    }

    /// Take the frame receiver. Returns `None` after the first call.
    pub fn frames(&mut self) -> Option<mpsc::Receiver<Bytes>> {
        self.frames.take()
    }

    /// Stop both tasks. The frame channel closes shortly after.
    pub fn stop(&self) {
        self.live.store(false, Ordering::Release);
        self.capture.abort();
        self.drain.abort();
        debug!("frame pipeline stopped");
    }
}

fn lock_queue(queue: &Mutex<VecDeque<Bytes>>) -> std::sync::MutexGuard<'_, VecDeque<Bytes>> {
    match queue.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

async fn capture_task(
    mut tap: telecare_core::AudioTap,
    block_size: usize,
    queue: Arc<Mutex<VecDeque<Bytes>>>,
    live: Arc<AtomicBool>,
) {
    let mut pending: Vec<f32> = Vec::new();
    while live.load(Ordering::Acquire) {
        match tokio::time::timeout(CAPTURE_POLL_INTERVAL, tap.next()).await {
            Ok(Some(chunk)) => {
                pending.extend_from_slice(&chunk);
                while pending.len() >= block_size {
                    let block: Vec<f32> = pending.drain(..block_size).collect();
                    let frame = pcm::encode_frame(&block);
                    let mut queue = lock_queue(&queue);
                    if queue.len() >= FRAME_QUEUE_CAPACITY {
                        queue.pop_front();
                        warn!("frame queue full, dropped oldest frame");
                    }
                    queue.push_back(frame);
                }
            }
            Ok(None) => {
                debug!("source track closed, frame capture ending");
                break;
            }
            Err(_) => {}
        }
    }
}

async fn drain_task(
    tx: mpsc::Sender<Bytes>,
    config: TranscribeConfig,
    queue: Arc<Mutex<VecDeque<Bytes>>>,
    live: Arc<AtomicBool>,
) {
    let keepalive_after = Duration::from_millis(config.keepalive_after_ms);
    let mut interval = tokio::time::interval(Duration::from_millis(config.drain_interval_ms));
    let mut last_sent = Instant::now();

    loop {
        interval.tick().await;
        if !live.load(Ordering::Acquire) {
            break;
        }

        let frame = {
            let mut queue = lock_queue(&queue);
            queue.pop_front()
        };
        match frame {
            Some(mut frame) => {
                if frame.len() > config.max_frame_bytes {
                    warn!(
                        "frame of {} bytes exceeds limit, truncating to {}",
                        frame.len(),
                        config.max_frame_bytes
                    );
                    frame.truncate(config.max_frame_bytes);
                }
                if tx.send(frame).await.is_err() {
                    break;
                }
                last_sent = Instant::now();
            }
            None => {
                if last_sent.elapsed() >= keepalive_after {
                    debug!("no audio for {:?}, sending keep-alive", keepalive_after);
                    if tx.send(pcm::silence_frame(config.keepalive_samples)).await.is_err() {
                        break;
                    }
                    last_sent = Instant::now();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telecare_core::DEFAULT_SAMPLE_RATE_HZ;
    use tokio::time::timeout;

    fn fast_config() -> TranscribeConfig {
        TranscribeConfig {
            block_size: 4096,
            drain_interval_ms: 20,
            keepalive_after_ms: 200,
            settle_delay_ms: 100,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_blocks_become_fixed_size_frames() {
        let track = AudioTrack::new("mixed", DEFAULT_SAMPLE_RATE_HZ);
        let mut pipeline = FramePipeline::start(&track, &fast_config());
        let mut frames = pipeline.frames().unwrap();

        track.push(vec![0.1; 4096]);
        track.push(vec![0.2; 4096]);

        for _ in 0..2 {
            let frame = timeout(Duration::from_secs(2), frames.recv())
                .await
                .expect("no frame produced")
                .expect("frame channel closed");
            assert_eq!(frame.len(), 4096 * pcm::BYTES_PER_SAMPLE);
        }
        pipeline.stop();
    }

    #[tokio::test]
    async fn test_partial_block_is_held_back() {
        let track = AudioTrack::new("mixed", DEFAULT_SAMPLE_RATE_HZ);
        let mut pipeline = FramePipeline::start(&track, &fast_config());
        let mut frames = pipeline.frames().unwrap();

        track.push(vec![0.1; 1000]);
        assert!(
            timeout(Duration::from_millis(100), frames.recv())
                .await
                .is_err(),
            "partial block must not produce a frame"
        );

        track.push(vec![0.1; 3096]);
        let frame = timeout(Duration::from_secs(2), frames.recv())
            .await
            .expect("completed block produced no frame")
            .expect("frame channel closed");
        assert_eq!(frame.len(), 4096 * pcm::BYTES_PER_SAMPLE);
        pipeline.stop();
    }

    #[tokio::test]
    async fn test_oversized_frames_are_truncated() {
        let config = TranscribeConfig {
            block_size: 10_000,
            ..fast_config()
        };
        let track = AudioTrack::new("mixed", DEFAULT_SAMPLE_RATE_HZ);
        let mut pipeline = FramePipeline::start(&track, &config);
        let mut frames = pipeline.frames().unwrap();

        track.push(vec![0.1; 10_000]);
        let frame = timeout(Duration::from_secs(2), frames.recv())
            .await
            .expect("no frame produced")
            .expect("frame channel closed");
        assert_eq!(frame.len(), config.max_frame_bytes);
        pipeline.stop();
    }

    #[tokio::test]
    async fn test_keepalive_fires_once_per_idle_window() {
        let track = AudioTrack::new("mixed", DEFAULT_SAMPLE_RATE_HZ);
        let mut pipeline = FramePipeline::start(&track, &fast_config());
        let mut frames = pipeline.frames().unwrap();

        let keepalive = timeout(Duration::from_secs(2), frames.recv())
            .await
            .expect("no keep-alive produced")
            .expect("frame channel closed");
        assert_eq!(keepalive.len(), 512);
        assert!(keepalive.iter().all(|&b| b == 0));

        // The timer was reset, so the next keep-alive is a full window away.
        assert!(
            timeout(Duration::from_millis(100), frames.recv())
                .await
                .is_err(),
            "keep-alive repeated before the idle window elapsed"
        );
        let next = timeout(Duration::from_secs(2), frames.recv())
            .await
            .expect("second keep-alive never arrived")
            .expect("frame channel closed");
        assert_eq!(next.len(), 512);
        pipeline.stop();
    }

    #[tokio::test]
    async fn test_stop_closes_frame_channel() {
        let track = AudioTrack::new("mixed", DEFAULT_SAMPLE_RATE_HZ);
        let mut pipeline = FramePipeline::start(&track, &fast_config());
        let mut frames = pipeline.frames().unwrap();

        pipeline.stop();
        let closed = timeout(Duration::from_secs(1), frames.recv()).await;
        assert_eq!(closed.expect("channel did not close"), None);
    }

    #[tokio::test]
    async fn test_frames_receiver_taken_once() {
        let track = AudioTrack::new("mixed", DEFAULT_SAMPLE_RATE_HZ);
        let mut pipeline = FramePipeline::start(&track, &fast_config());
        assert!(pipeline.frames().is_some());
        assert!(pipeline.frames().is_none());
        pipeline.stop();
    }
}
