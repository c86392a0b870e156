//! Call audio recording
//!
//! Captures PCM from one audio track into memory, encodes it as a 16-bit
//! mono WAV on stop, and hands the file to a [`StorageUpload`]
//! implementation. Upload failures are logged and do not discard the
//! recording result.

use crate::error::{Error, Result};
use crate::media::AudioTrack;
use crate::observable::Observable;
use crate::pcm;
use crate::providers::StorageUpload;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const WAV_CONTENT_TYPE: &str = "audio/wav";

/// How long the capture task may keep waiting for audio once stopped.
const CAPTURE_POLL_INTERVAL: Duration = Duration::from_millis(250);

struct ActiveRecording {
    samples: Arc<Mutex<Vec<i16>>>,
    live: Arc<AtomicBool>,
    task: JoinHandle<()>,
    sample_rate_hz: u32,
}

/// Records one audio track at a time.
pub struct Recorder {
    uploader: Arc<dyn StorageUpload>,
    recording: Observable<bool>,
    inner: tokio::sync::Mutex<Option<ActiveRecording>>,
}

impl Recorder {
    /// Create a recorder that stores finished files via `uploader`.
    pub fn new(uploader: Arc<dyn StorageUpload>) -> Self {
        Self {
            uploader,
            recording: Observable::new(false),
            inner: tokio::sync::Mutex::new(None),
        }
    }

    /// True while a recording is in progress.
    pub fn recording(&self) -> &Observable<bool> {
        &self.recording
    }

    /// Begin capturing `track`.
    ///
    /// A second call while already recording is a no-op; the first
    /// recording keeps running.
    pub async fn start(&self, track: &AudioTrack) {
        let mut inner = self.inner.lock().await;
        if inner.is_some() {
            warn!("recording already in progress, ignoring start");
            return;
        }

        let samples = Arc::new(Mutex::new(Vec::new()));
        let live = Arc::new(AtomicBool::new(true));
        let mut tap = track.subscribe();

        let task = {
            let samples = Arc::clone(&samples);
            let live = Arc::clone(&live);
            tokio::spawn(async move {
                while live.load(Ordering::Acquire) {
                    match tokio::time::timeout(CAPTURE_POLL_INTERVAL, tap.next()).await {
                        Ok(Some(chunk)) => {
                            let mut samples = lock_samples(&samples);
                            samples.extend(chunk.iter().map(|&s| pcm::f32_to_i16(s)));
                        }
                        Ok(None) => {
                            debug!("recorded track closed, capture ending");
                            break;
                        }
                        Err(_) => {}
                    }
                }
            })
        };

        *inner = Some(ActiveRecording {
            samples,
            live,
            task,
            sample_rate_hz: track.sample_rate_hz(),
        });
        self.recording.set(true);
        debug!(track_id = %track.id(), "recording started");
    }

    /// Finish the current recording and upload it.
    ///
    /// Returns the stored filename, or `None` when no recording was
    /// running. A failed upload is logged but the filename is still
    /// returned.
    pub async fn stop(&self) -> Result<Option<String>> {
        let active = {
            let mut inner = self.inner.lock().await;
            inner.take()
        };
        let Some(active) = active else {
            return Ok(None);
        };
        self.recording.set(false);

        active.live.store(false, Ordering::Release);
        let abort = active.task.abort_handle();
        if tokio::time::timeout(Duration::from_secs(1), active.task)
            .await
            .is_err()
        {
            abort.abort();
        }

        let samples = {
            let samples = lock_samples(&active.samples);
            samples.clone()
        };
        let bytes = encode_wav(&samples, active.sample_rate_hz)?;
        let filename = format!(
            "recording-{}.wav",
            chrono::Utc::now().format("%Y%m%d%H%M%S")
        );

        debug!(
            filename = %filename,
            samples = samples.len(),
            "recording finished, uploading"
        );
        if let Err(e) = self
            .uploader
            .upload(bytes, &filename, WAV_CONTENT_TYPE)
            .await
        {
            warn!("recording upload failed: {}", e);
        }
        Ok(Some(filename))
    }
}

fn lock_samples(samples: &Mutex<Vec<i16>>) -> std::sync::MutexGuard<'_, Vec<i16>> {
    match samples.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn encode_wav(samples: &[i16], sample_rate_hz: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: sample_rate_hz,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| Error::Recording(e.to_string()))?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Recording(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| Error::Recording(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}
