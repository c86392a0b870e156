//! In-memory call test harness
//!
//! Stands in for everything outside the crate: a relay hub that
//! forwards signaling text between two in-memory transports while
//! recording every envelope, capture devices that hand out synthetic
//! streams (or refuse to), and a transcription provider whose streams
//! never produce results.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use telecare_core::{AudioTrack, MediaConstraints, MediaDevices, MediaStream};
use telecare_transcribe::{
    StreamRequest, TranscribeConfig, TranscribeProvider, TranscriptStream, TranscriptionDriver,
};
use telecare_webrtc::{RelayAction, RelayEnvelope, SignalingChannel};
use tokio::sync::mpsc;

/// Initialize test logging (call once per test)
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info,telecare_webrtc=debug")
        .try_init();
}

/// One transport end wired through the [`RelayHub`].
pub struct HubEnd {
    tx: Option<mpsc::UnboundedSender<String>>,
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl SignalingChannel for HubEnd {
    async fn send(&mut self, text: String) -> telecare_webrtc::Result<()> {
        let tx = self.tx.as_ref().ok_or_else(|| {
            telecare_webrtc::Error::Signaling("hub transport closed".to_string())
        })?;
        tx.send(text)
            .map_err(|_| telecare_webrtc::Error::Signaling("hub dropped".to_string()))
    }

    async fn recv(&mut self) -> Option<telecare_webrtc::Result<String>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.tx = None;
    }
}

/// Two-ended in-memory relay.
///
/// Forwards raw text both ways like the real relay service and keeps a
/// parsed copy of every envelope for assertions. `inject_*` pushes text
/// straight to one end without recording it, which lets tests replay
/// stale messages.
pub struct RelayHub {
    log: Arc<Mutex<Vec<RelayEnvelope>>>,
    to_initiator: mpsc::UnboundedSender<String>,
    to_joiner: mpsc::UnboundedSender<String>,
}

impl RelayHub {
    /// Build the hub plus the transport ends for both roles.
    pub fn spawn() -> (Self, HubEnd, HubEnd) {
        let (init_in_tx, init_in_rx) = mpsc::unbounded_channel::<String>();
        let (join_in_tx, join_in_rx) = mpsc::unbounded_channel::<String>();
        let (to_init_tx, to_init_rx) = mpsc::unbounded_channel::<String>();
        let (to_join_tx, to_join_rx) = mpsc::unbounded_channel::<String>();

        let log = Arc::new(Mutex::new(Vec::new()));
        forward(init_in_rx, to_join_tx.clone(), Arc::clone(&log));
        forward(join_in_rx, to_init_tx.clone(), Arc::clone(&log));

        let hub = Self {
            log,
            to_initiator: to_init_tx,
            to_joiner: to_join_tx,
        };
        let initiator_end = HubEnd {
            tx: Some(init_in_tx),
            rx: to_init_rx,
        };
        let joiner_end = HubEnd {
            tx: Some(join_in_tx),
            rx: to_join_rx,
        };
        (hub, initiator_end, joiner_end)
    }

    /// Every envelope that crossed the hub so far, in arrival order.
    pub fn recorded(&self) -> Vec<RelayEnvelope> {
        self.log.lock().unwrap().clone()
    }

    /// How many recorded envelopes carry `action`.
    pub fn count(&self, action: RelayAction) -> usize {
        self.recorded().iter().filter(|e| e.action == action).count()
    }

    /// First recorded envelope carrying `action`, if any crossed yet.
    pub fn first(&self, action: RelayAction) -> Option<RelayEnvelope> {
        self.recorded().into_iter().find(|e| e.action == action)
    }

    /// Push raw relay text to the initiator's end, bypassing the log.
    pub fn inject_to_initiator(&self, text: String) {
        let _ = self.to_initiator.send(text);
    }

    /// Push raw relay text to the joiner's end, bypassing the log.
    pub fn inject_to_joiner(&self, text: String) {
        let _ = self.to_joiner.send(text);
    }
}

fn forward(
    mut from: mpsc::UnboundedReceiver<String>,
    to: mpsc::UnboundedSender<String>,
    log: Arc<Mutex<Vec<RelayEnvelope>>>,
) {
    tokio::spawn(async move {
        while let Some(text) = from.recv().await {
            if let Ok(envelope) = RelayEnvelope::from_json(&text) {
                log.lock().unwrap().push(envelope);
            }
            if to.send(text).is_err() {
                break;
            }
        }
    });
}

/// Capture backend handing out one synthetic audio track per request.
pub struct MockMediaDevices;

#[async_trait]
impl MediaDevices for MockMediaDevices {
    async fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> telecare_core::Result<MediaStream> {
        let mut stream = MediaStream::new();
        if constraints.audio {
            stream.add_audio_track(AudioTrack::new("mock-mic", 48_000));
        }
        Ok(stream)
    }
}

/// Capture backend that always refuses, as a missing microphone would.
pub struct FailingMediaDevices;

#[async_trait]
impl MediaDevices for FailingMediaDevices {
    async fn get_user_media(
        &self,
        _constraints: MediaConstraints,
    ) -> telecare_core::Result<MediaStream> {
        Err(telecare_core::Error::MediaAcquisition(
            "microphone unavailable".to_string(),
        ))
    }
}

/// Provider whose transcript streams stay open but never yield.
pub struct PendingProvider {
    pub starts: AtomicUsize,
}

impl PendingProvider {
    pub fn new() -> Self {
        Self {
            starts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TranscribeProvider for PendingProvider {
    async fn start_stream(
        &self,
        _request: StreamRequest,
        mut frames: mpsc::Receiver<Bytes>,
    ) -> telecare_transcribe::Result<TranscriptStream> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        // Drain frames so the pipeline never backs up.
        tokio::spawn(async move { while frames.recv().await.is_some() {} });
        Ok(Box::pin(futures::stream::pending()))
    }
}

/// A driver wired to a [`PendingProvider`].
pub fn pending_driver() -> Arc<TranscriptionDriver> {
    let provider = Arc::new(PendingProvider::new());
    Arc::new(TranscriptionDriver::new(provider, TranscribeConfig::default()).unwrap())
}

/// Poll `predicate` every 25ms until it holds or `deadline` passes.
pub async fn wait_until<F>(deadline: Duration, mut predicate: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    predicate()
}
