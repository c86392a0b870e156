//! Streaming transcription driver
//!
//! Owns the full caption pipeline for one call: composes the two audio
//! sources into a mixed track, watches its level on a fast tick, and opens
//! a provider stream only while someone is speaking. Final results are
//! accumulated into an observable caption; partials are logged and
//! dropped. The provider stream is the only part that churns; composition
//! and detection run from [`start_transcription`] until
//! [`stop_transcribing`].
//!
//! [`start_transcription`]: TranscriptionDriver::start_transcription
//! [`stop_transcribing`]: TranscriptionDriver::stop_transcribing

use crate::config::TranscribeConfig;
use crate::error::{Error, Result};
use crate::frames::FramePipeline;
use crate::gate::{ActivityGate, GateTransition, LevelProbe};
use crate::mixer::{self, MixContext};
use crate::provider::{MediaEncoding, StreamRequest, TranscribeProvider, TranscriptStream};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use telecare_core::{LanguagePair, MediaStream, Observable, Translator};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Default)]
struct MixSlot {
    context: Option<MixContext>,
    stream: Option<MediaStream>,
    pipeline: Option<FramePipeline>,
    consumer: Option<JoinHandle<()>>,
    detector: Option<JoinHandle<()>>,
}

/// Voice-gated streaming transcription for one call.
pub struct TranscriptionDriver {
    provider: Arc<dyn TranscribeProvider>,
    translator: Option<Arc<dyn Translator>>,
    languages: LanguagePair,
    config: TranscribeConfig,
    transcript: Observable<String>,
    transcribing: AtomicBool,
    stream_active: AtomicBool,
    updating: AtomicBool,
    probe: Mutex<Option<LevelProbe>>,
    slot: tokio::sync::Mutex<MixSlot>,
}

impl TranscriptionDriver {
    /// Create a driver using `provider` for speech recognition.
    pub fn new(provider: Arc<dyn TranscribeProvider>, config: TranscribeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            provider,
            translator: None,
            languages: LanguagePair::new(),
            config,
            transcript: Observable::new(String::new()),
            transcribing: AtomicBool::new(false),
            stream_active: AtomicBool::new(false),
            updating: AtomicBool::new(false),
            probe: Mutex::new(None),
            slot: tokio::sync::Mutex::new(MixSlot::default()),
        })
    }

    /// Translate final results before display.
    ///
    /// Translation only runs when the language pair's source and target
    /// differ; a failed translation falls back to the untranslated text.
    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    /// Share a language selection with the rest of the call.
    pub fn with_languages(mut self, languages: LanguagePair) -> Self {
        self.languages = languages;
        self
    }

    /// The accumulated caption. Finals are appended with a trailing space;
    /// the text resets when silence closes the stream.
    pub fn transcript(&self) -> &Observable<String> {
        &self.transcript
    }

    /// Language selection driving transcription and translation.
    pub fn languages(&self) -> &LanguagePair {
        &self.languages
    }

    /// Whether [`start_transcription`](Self::start_transcription) has run.
    pub fn is_transcribing(&self) -> bool {
        self.transcribing.load(Ordering::Acquire)
    }

    /// Whether a provider stream is currently open.
    pub fn is_stream_active(&self) -> bool {
        self.stream_active.load(Ordering::Acquire)
    }

    /// Compose the call audio and start watching for voice.
    ///
    /// No provider stream is opened here; the gate opens one when someone
    /// speaks. Calling again while already running is a no-op.
    pub async fn start_transcription(
        self: &Arc<Self>,
        local: &MediaStream,
        remote: &MediaStream,
    ) -> Result<()> {
        if self.transcribing.swap(true, Ordering::AcqRel) {
            debug!("transcription already running, ignoring start");
            return Ok(());
        }
        info!("starting transcription");

        let (mixed, context) = mixer::compose(local, remote);
        let track = match mixed.audio_tracks().first() {
            Some(track) => track.clone(),
            None => {
                self.transcribing.store(false, Ordering::Release);
                return Err(Error::Stream("composed stream has no audio track".to_string()));
            }
        };
        {
            let mut probe = lock_probe(&self.probe);
            *probe = Some(LevelProbe::new(track.subscribe()));
        }

        let mut slot = self.slot.lock().await;
        if let Some(old) = slot.context.take() {
            old.close();
        }
        slot.context = Some(context);
        slot.stream = Some(mixed);
        slot.detector = Some(tokio::spawn(Arc::clone(self).detect_loop()));
        Ok(())
    }

    /// Swap the call audio under a running transcription.
    ///
    /// Stops any open stream, waits for the provider to settle, rebuilds
    /// the mix from the new sources and reopens the stream directly. The
    /// accumulated caption is kept. Does nothing when transcription is
    /// not running.
    pub async fn update_stream(
        self: &Arc<Self>,
        local: &MediaStream,
        remote: &MediaStream,
    ) -> Result<()> {
        if !self.transcribing.load(Ordering::Acquire) {
            debug!("transcription not running, ignoring stream update");
            return Ok(());
        }
        info!("updating transcription sources");

        // Hold the gate closed while sources swap so it cannot open a
        // stream against the half-rebuilt mix.
        self.updating.store(true, Ordering::Release);
        let result = self.swap_sources(local, remote).await;
        self.updating.store(false, Ordering::Release);
        result
    }

    async fn swap_sources(
        self: &Arc<Self>,
        local: &MediaStream,
        remote: &MediaStream,
    ) -> Result<()> {
        self.end_stream(false).await;
        tokio::time::sleep(Duration::from_millis(self.config.settle_delay_ms)).await;

        {
            let mut slot = self.slot.lock().await;
            if let Some(old) = slot.context.take() {
                old.close();
            }
            slot.stream = None;
        }

        let (mixed, context) = mixer::compose(local, remote);
        let track = match mixed.audio_tracks().first() {
            Some(track) => track.clone(),
            None => return Err(Error::Stream("composed stream has no audio track".to_string())),
        };
        {
            let mut probe = lock_probe(&self.probe);
            *probe = Some(LevelProbe::new(track.subscribe()));
        }
        {
            let mut slot = self.slot.lock().await;
            if let Some(old) = slot.context.take() {
                old.close();
            }
            slot.context = Some(context);
            slot.stream = Some(mixed);
        }

        self.begin_stream().await
    }

    /// Tear the whole pipeline down. Safe to call more than once.
    pub async fn stop_transcribing(&self) {
        if !self.transcribing.swap(false, Ordering::AcqRel) {
            return;
        }
        info!("stopping transcription");

        self.end_stream(true).await;
        let (context, detector) = {
            let mut slot = self.slot.lock().await;
            slot.stream = None;
            (slot.context.take(), slot.detector.take())
        };
        if let Some(context) = context {
            context.close();
        }
        if let Some(detector) = detector {
            detector.abort();
        }
        let mut probe = lock_probe(&self.probe);
        *probe = None;
    }

    async fn detect_loop(self: Arc<Self>) {
        let mut gate = ActivityGate::new(self.config.gate.clone());
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.gate.tick_interval_ms));
        while self.transcribing.load(Ordering::Acquire) {
            interval.tick().await;
            if !self.transcribing.load(Ordering::Acquire) {
                break;
            }
            if self.updating.load(Ordering::Acquire) {
                continue;
            }
            let level = {
                let mut probe = lock_probe(&self.probe);
                probe.as_mut().map(|p| p.level()).unwrap_or(0.0)
            };
            let active = self.stream_active.load(Ordering::Acquire);
            match gate.evaluate(level, active) {
                Some(GateTransition::Engaged) => {
                    debug!("voice detected, opening transcript stream");
                    if let Err(e) = self.begin_stream().await {
                        warn!("failed to open transcript stream: {}", e);
                    }
                }
                Some(GateTransition::Released) => {
                    debug!("silence tolerance exceeded, closing transcript stream");
                    self.end_stream(true).await;
                }
                None => {}
            }
        }
    }

    async fn begin_stream(self: &Arc<Self>) -> Result<()> {
        if self.stream_active.load(Ordering::Acquire) {
            return Ok(());
        }
        let track = {
            let slot = self.slot.lock().await;
            match slot.stream.as_ref().and_then(|s| s.audio_tracks().first()) {
                Some(track) => track.clone(),
                None => return Err(Error::Stream("no mixed track to stream from".to_string())),
            }
        };

        let mut pipeline = FramePipeline::start(&track, &self.config);
        let frames = match pipeline.frames() {
            Some(frames) => frames,
            None => {
                pipeline.stop();
                return Err(Error::Stream("frame receiver already taken".to_string()));
            }
        };
        let request = StreamRequest {
            language_code: self.languages.source().get(),
            sample_rate_hz: self.config.sample_rate_hz,
            encoding: MediaEncoding::Pcm,
        };

        // The provider call runs with the slot unlocked; stop and swap can
        // take it while this waits.
        let stream = match self.provider.start_stream(request, frames).await {
            Ok(stream) => stream,
            Err(e) => {
                pipeline.stop();
                return Err(e);
            }
        };

        let mut slot = self.slot.lock().await;
        let fresh = self.transcribing.load(Ordering::Acquire)
            && !self.stream_active.load(Ordering::Acquire)
            && slot
                .stream
                .as_ref()
                .and_then(|s| s.audio_tracks().first())
                .map(|current| current.id() == track.id())
                .unwrap_or(false);
        if !fresh {
            debug!("mix stopped or swapped while the stream opened, discarding it");
            pipeline.stop();
            return Ok(());
        }
        self.stream_active.store(true, Ordering::Release);
        let driver = Arc::clone(self);
        slot.pipeline = Some(pipeline);
        slot.consumer = Some(tokio::spawn(driver.consume_events(stream)));
        debug!("transcript stream opened");
        Ok(())
    }

    async fn end_stream(&self, clear: bool) {
        self.stream_active.store(false, Ordering::Release);
        let (pipeline, consumer) = {
            let mut slot = self.slot.lock().await;
            (slot.pipeline.take(), slot.consumer.take())
        };
        if let Some(pipeline) = pipeline {
            pipeline.stop();
        }
        if let Some(consumer) = consumer {
            consumer.abort();
        }
        if clear {
            self.transcript.set(String::new());
        }
    }

    async fn consume_events(self: Arc<Self>, mut stream: TranscriptStream) {
        while let Some(event) = stream.next().await {
            match event {
                Ok(event) => {
                    if event.is_partial {
                        debug!("partial transcript: {}", event.transcript);
                        continue;
                    }
                    let text = event.transcript.trim().to_string();
                    if text.is_empty() {
                        continue;
                    }
                    let text = self.render_final(text).await;
                    self.transcript.update(|acc| {
                        acc.push_str(&text);
                        acc.push(' ');
                    });
                }
                Err(e) => {
                    warn!("transcript stream error: {}", e);
                    break;
                }
            }
        }
        // The stream is gone; release the pipeline so voice can reopen one.
        self.stream_active.store(false, Ordering::Release);
        let mut slot = self.slot.lock().await;
        if let Some(pipeline) = slot.pipeline.take() {
            pipeline.stop();
        }
        slot.consumer = None;
        debug!("transcript stream ended");
    }

    async fn render_final(&self, text: String) -> String {
        let source = self.languages.source().get();
        let target = self.languages.target().get();
        if source == target {
            return text;
        }
        let Some(translator) = self.translator.as_ref() else {
            return text;
        };
        match translator.translate(&text, &source, &target).await {
            Ok(translated) => translated,
            Err(e) => {
                warn!("translation failed, showing original text: {}", e);
                text
            }
        }
    }
}

fn lock_probe(probe: &Mutex<Option<LevelProbe>>) -> std::sync::MutexGuard<'_, Option<LevelProbe>> {
    match probe.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
