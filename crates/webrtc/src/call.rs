//! Call session: one end of a two-party call.
//!
//! [`CallSession`] drives a single call attempt for a fixed role. It
//! acquires local media through the capture seam, negotiates the peer
//! link over the signaling relay, adopts the remote stream as tracks
//! arrive, runs data-channel chat, and keeps the transcription driver
//! fed with the current audio sources. The embedding UI consumes
//! [`CallEvent`]s plus the observables exposed by the driver and peer.
//!
//! Role protocol:
//! - The joiner generates a client id, creates the data channel, sends
//!   the offer stamped with its id, and applies the answer.
//! - The initiator creates its data channel, waits for the offer,
//!   learns the joiner's id from it, and addresses the answer and all
//!   later candidates to that id.
//!
//! Neither role retries: terminal connection states stop the driver,
//! emit a notice, and leave the session for the caller to discard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use rand::Rng;
use telecare_core::{
    ChatLog, ChatMessage, MediaConstraints, MediaDevices, MediaStream, MessageIdGen, Notice,
    Observable,
};
use telecare_transcribe::TranscriptionDriver;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webrtc::data_channel::RTCDataChannel;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

use crate::channels::{ChatChannel, ChatEvent, ChatOptions};
use crate::config::{CallConfig, CallRole};
use crate::error::Result;
use crate::media::RemoteAudioAdapter;
use crate::peer::{ConnectionState, PeerConnection};
use crate::signaling::{
    IceCandidatePayload, RelaySender, RelaySession, SessionDescriptionPayload, SignalingChannel,
    SignalingEvent,
};

/// Events surfaced to the embedding UI.
#[derive(Debug, Clone)]
pub enum CallEvent {
    /// Show a timed notice
    Notice(Notice),
    /// The peer link changed state
    ConnectionState(ConnectionState),
    /// The remote stream became available or was rebuilt
    RemoteStream(MediaStream),
    /// A chat message entered the log, ours or theirs
    Chat(ChatMessage),
}

impl CallEvent {
    /// Event name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            CallEvent::Notice(_) => "notice",
            CallEvent::ConnectionState(_) => "connection_state",
            CallEvent::RemoteStream(_) => "remote_stream",
            CallEvent::Chat(_) => "chat",
        }
    }
}

/// The joiner's announced identity: a random decimal in 0..=999999.
fn random_client_id() -> String {
    rand::thread_rng().gen_range(0..1_000_000u32).to_string()
}

struct SessionInner {
    role: CallRole,
    config: CallConfig,
    client_id: String,
    peer: Arc<PeerConnection>,
    driver: Arc<TranscriptionDriver>,
    remote_audio: Option<Arc<dyn RemoteAudioAdapter>>,
    local_stream: MediaStream,
    local_rtp_track: Arc<TrackLocalStaticSample>,
    remote_stream: RwLock<MediaStream>,
    /// Learned from the first inbound offer (initiator only)
    remote_client_id: RwLock<Option<String>>,
    negotiated: AtomicBool,
    chat: RwLock<Option<Arc<ChatChannel>>>,
    chat_log: Arc<Mutex<ChatLog>>,
    chat_ids: Arc<MessageIdGen>,
    chat_events: mpsc::UnboundedSender<ChatEvent>,
    events: mpsc::UnboundedSender<CallEvent>,
}

impl SessionInner {
    fn notify(&self, notice: Notice) {
        let _ = self.events.send(CallEvent::Notice(notice));
    }

    fn attach_chat(&self, rtc_channel: Arc<RTCDataChannel>) {
        let channel = ChatChannel::attach(
            rtc_channel,
            ChatOptions {
                sender_id: self.client_id.clone(),
                role_tag: self.config.local_role_tag,
                info_notice_ms: self.config.info_notice_ms,
                warn_notice_ms: self.config.warn_notice_ms,
            },
            Arc::clone(&self.chat_log),
            Arc::clone(&self.chat_ids),
            self.chat_events.clone(),
        );
        *write_lock(&self.chat) = Some(channel);
    }

    fn current_chat(&self) -> Option<Arc<ChatChannel>> {
        read_lock(&self.chat).clone()
    }

    async fn handle_offer(
        self: &Arc<Self>,
        relay: &RelaySender,
        description: SessionDescriptionPayload,
        remote_client_id: Option<String>,
    ) {
        if self.role != CallRole::Initiator {
            warn!("Ignoring inbound offer: not the initiator");
            return;
        }
        if self.negotiated.load(Ordering::Acquire) {
            debug!("Duplicate offer after negotiation, ignoring");
            return;
        }

        match &remote_client_id {
            Some(id) => {
                info!("Offer received from client {}", id);
                *write_lock(&self.remote_client_id) = Some(id.clone());
            }
            None => warn!("Offer carried no sender client id; replies cannot be addressed"),
        }

        let answer_sdp = match self.peer.accept_offer(description.sdp).await {
            Ok(sdp) => sdp,
            Err(e) => {
                warn!("Failed to answer offer: {}", e);
                return;
            }
        };
        if let Err(e) = relay.send_sdp_answer(
            &SessionDescriptionPayload::answer(answer_sdp),
            remote_client_id.as_deref(),
        ) {
            warn!("Failed to relay answer: {}", e);
            return;
        }
        self.negotiated.store(true, Ordering::Release);

        self.start_driver().await;
    }

    async fn handle_answer(self: &Arc<Self>, description: SessionDescriptionPayload) {
        if self.role != CallRole::Joiner {
            warn!("Ignoring inbound answer: not the joiner");
            return;
        }
        if self.negotiated.load(Ordering::Acquire) {
            debug!("Duplicate answer after negotiation, ignoring");
            return;
        }

        if let Err(e) = self.peer.accept_answer(description.sdp).await {
            warn!("Failed to apply answer: {}", e);
            return;
        }
        self.negotiated.store(true, Ordering::Release);

        self.start_driver().await;
    }

    async fn handle_candidate(&self, candidate: IceCandidatePayload) {
        // Candidate failures are survivable; others may still connect us.
        if let Err(e) = self.peer.add_ice_candidate(candidate).await {
            warn!("Failed to apply remote ICE candidate: {}", e);
        }
    }

    async fn start_driver(self: &Arc<Self>) {
        let remote = read_lock(&self.remote_stream).clone();
        self.start_driver_from(remote).await;
    }

    /// Start transcription from a snapshot of the remote stream. A track
    /// adopted while the start is in flight misses the running
    /// transcription, so the snapshot is checked against the live stream
    /// afterward and any newer stream is swapped in.
    async fn start_driver_from(self: &Arc<Self>, remote: MediaStream) {
        if let Err(e) = self
            .driver
            .start_transcription(&self.local_stream, &remote)
            .await
        {
            warn!("Failed to start transcription: {}", e);
            return;
        }
        let current = read_lock(&self.remote_stream).clone();
        if current.id() != remote.id() {
            if let Err(e) = self
                .driver
                .update_stream(&self.local_stream, &current)
                .await
            {
                warn!("Failed to update transcription sources: {}", e);
            }
        }
    }

    /// Rebuild the remote stream around a newly arrived audio track and
    /// swap it into the running transcription.
    async fn adopt_remote_track(self: Arc<Self>, track: Arc<TrackRemote>) {
        let mut stream = MediaStream::new();
        match &self.remote_audio {
            Some(adapter) => match adapter.adapt(track).await {
                Ok(audio) => stream.add_audio_track(audio),
                Err(e) => warn!("Remote audio adaptation failed: {}", e),
            },
            None => debug!("No remote audio adapter; remote track not composed"),
        }

        *write_lock(&self.remote_stream) = stream.clone();
        let _ = self.events.send(CallEvent::RemoteStream(stream.clone()));

        if let Err(e) = self.driver.update_stream(&self.local_stream, &stream).await {
            warn!("Failed to update transcription sources: {}", e);
        }
    }
}

/// One end of an active call.
pub struct CallSession {
    inner: Arc<SessionInner>,
    tasks: Vec<JoinHandle<()>>,
    closed: AtomicBool,
}

impl CallSession {
    /// Connect over the configured WebSocket relay.
    pub async fn connect(
        role: CallRole,
        config: CallConfig,
        media: Arc<dyn MediaDevices>,
        driver: Arc<TranscriptionDriver>,
        remote_audio: Option<Arc<dyn RemoteAudioAdapter>>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<CallEvent>)> {
        config.validate()?;
        let client_id = resolve_client_id(role, &config);
        let relay = RelaySession::connect(
            &config.signaling_url,
            (role == CallRole::Joiner).then(|| client_id.clone()),
        )
        .await?;
        Self::setup(role, config, client_id, media, driver, remote_audio, relay).await
    }

    /// Connect over an already-built signaling transport.
    pub async fn connect_with_channel(
        role: CallRole,
        config: CallConfig,
        media: Arc<dyn MediaDevices>,
        driver: Arc<TranscriptionDriver>,
        remote_audio: Option<Arc<dyn RemoteAudioAdapter>>,
        channel: Box<dyn SignalingChannel>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<CallEvent>)> {
        config.validate()?;
        let client_id = resolve_client_id(role, &config);
        let relay = RelaySession::with_channel(
            channel,
            (role == CallRole::Joiner).then(|| client_id.clone()),
        );
        Self::setup(role, config, client_id, media, driver, remote_audio, relay).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn setup(
        role: CallRole,
        config: CallConfig,
        client_id: String,
        media: Arc<dyn MediaDevices>,
        driver: Arc<TranscriptionDriver>,
        remote_audio: Option<Arc<dyn RemoteAudioAdapter>>,
        mut relay: RelaySession,
    ) -> Result<(Self, mpsc::UnboundedReceiver<CallEvent>)> {
        wait_for_open(&mut relay).await?;
        info!("Call attempt starting: role={}, channel={}", role, config.channel_id);

        // Media first: acquisition failure aborts before any negotiation.
        let local_stream = media.get_user_media(MediaConstraints::default()).await?;

        let peer = Arc::new(PeerConnection::new(&config).await?);
        let local_rtp_track = peer
            .add_local_audio_track("audio", &format!("call-{}", config.channel_id))
            .await?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (chat_tx, chat_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(SessionInner {
            role,
            config,
            client_id,
            peer: Arc::clone(&peer),
            driver,
            remote_audio,
            local_stream,
            local_rtp_track,
            remote_stream: RwLock::new(MediaStream::new()),
            remote_client_id: RwLock::new(None),
            negotiated: AtomicBool::new(false),
            chat: RwLock::new(None),
            chat_log: Arc::new(Mutex::new(ChatLog::new())),
            chat_ids: Arc::new(MessageIdGen::new()),
            chat_events: chat_tx,
            events: events_tx,
        });

        // Both roles open their own chat channel; the joiner also adopts
        // the channel the initiator announces, so one channel ends up
        // carrying the conversation.
        let own_channel = peer
            .create_data_channel(&inner.config.data_channel_label)
            .await?;
        inner.attach_chat(own_channel);
        if role == CallRole::Joiner {
            let adopt = Arc::clone(&inner);
            peer.on_data_channel(move |channel| {
                if channel.label() == adopt.config.data_channel_label {
                    info!("Adopting announced chat channel");
                    adopt.attach_chat(channel);
                } else {
                    warn!("Ignoring unexpected data channel: {}", channel.label());
                }
            });
        }

        let track_inner = Arc::clone(&inner);
        peer.on_track(move |track| {
            if track.kind() != RTPCodecType::Audio {
                debug!("Ignoring remote track of kind {:?}", track.kind());
                return;
            }
            let track_inner = Arc::clone(&track_inner);
            tokio::spawn(track_inner.adopt_remote_track(track));
        });

        let candidate_inner = Arc::clone(&inner);
        let candidate_relay = relay.sender();
        peer.on_ice_candidate(move |candidate| {
            let recipient = match candidate_inner.role {
                CallRole::Initiator => match read_lock(&candidate_inner.remote_client_id).clone() {
                    Some(id) => Some(id),
                    None => {
                        warn!("Dropping local candidate: remote client id not yet known");
                        return;
                    }
                },
                CallRole::Joiner => None,
            };
            if let Err(e) = candidate_relay.send_ice_candidate(&candidate, recipient.as_deref()) {
                debug!("Candidate not relayed (relay gone): {}", e);
            }
        });

        if role == CallRole::Joiner {
            let offer_sdp = peer.create_offer().await?;
            relay.send_sdp_offer(&SessionDescriptionPayload::offer(offer_sdp))?;
            info!("Offer relayed as client {}", inner.client_id);
        }

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(signaling_loop(Arc::clone(&inner), relay)));
        tasks.push(tokio::spawn(state_watcher(Arc::clone(&inner))));
        tasks.push(tokio::spawn(chat_forwarder(Arc::clone(&inner), chat_rx)));

        Ok((
            Self {
                inner,
                tasks,
                closed: AtomicBool::new(false),
            },
            events_rx,
        ))
    }

    /// This end's role.
    pub fn role(&self) -> CallRole {
        self.inner.role
    }

    /// This end's client id (the joiner announces it on the relay).
    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    /// The local capture stream.
    pub fn local_stream(&self) -> &MediaStream {
        &self.inner.local_stream
    }

    /// The negotiated outbound audio track. Embedders with an encoder
    /// write opus samples here to be heard by the peer.
    pub fn local_rtp_track(&self) -> &Arc<TrackLocalStaticSample> {
        &self.inner.local_rtp_track
    }

    /// Snapshot of the adopted remote stream.
    pub fn remote_stream(&self) -> MediaStream {
        read_lock(&self.inner.remote_stream).clone()
    }

    /// Observable peer connection state.
    pub fn connection_state(&self) -> Observable<ConnectionState> {
        self.inner.peer.state().clone()
    }

    /// The transcription driver running under this call.
    pub fn driver(&self) -> &Arc<TranscriptionDriver> {
        &self.inner.driver
    }

    /// The shared chat log (messages, unread count, panel flag).
    pub fn chat_log(&self) -> Arc<Mutex<ChatLog>> {
        Arc::clone(&self.inner.chat_log)
    }

    /// Send a chat message; delivery problems surface as notices.
    pub async fn send_chat(&self, text: &str) -> Option<ChatMessage> {
        match self.inner.current_chat() {
            Some(chat) => chat.send(text).await,
            None => {
                self.inner
                    .notify(self.inner.config.warn_notice("Chat is not ready yet."));
                None
            }
        }
    }

    /// End the call: stop transcription, close chat and the peer link.
    ///
    /// Idempotent. Emits the final `Closed` state and notice itself so
    /// callers see a deterministic shutdown sequence.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Closing call session");

        self.inner.driver.stop_transcribing().await;
        for task in &self.tasks {
            task.abort();
        }
        if let Some(chat) = self.inner.current_chat() {
            chat.close().await;
        }
        if let Err(e) = self.inner.peer.close().await {
            warn!("Peer close failed: {}", e);
        }

        let _ = self
            .inner
            .events
            .send(CallEvent::ConnectionState(ConnectionState::Closed));
        self.inner
            .notify(self.inner.config.alert_notice("Call ended."));
    }
}

fn resolve_client_id(role: CallRole, config: &CallConfig) -> String {
    match (&config.client_id, role) {
        (Some(id), _) => id.clone(),
        (None, CallRole::Joiner) => random_client_id(),
        // The initiator never announces an id; keep one for chat stamps.
        (None, CallRole::Initiator) => format!("host-{}", random_client_id()),
    }
}

async fn wait_for_open(relay: &mut RelaySession) -> Result<()> {
    loop {
        match relay.next_event().await {
            Some(SignalingEvent::Open) => return Ok(()),
            Some(SignalingEvent::Error(e)) => {
                return Err(crate::error::Error::Signaling(e));
            }
            Some(SignalingEvent::Closed) | None => {
                return Err(crate::error::Error::Signaling(
                    "relay closed before opening".to_string(),
                ));
            }
            Some(other) => {
                debug!("Ignoring pre-open signaling event: {}", other.name());
            }
        }
    }
}

async fn signaling_loop(inner: Arc<SessionInner>, mut relay: RelaySession) {
    let sender = relay.sender();
    loop {
        let event = match relay.next_event().await {
            Some(event) => event,
            None => break,
        };
        match event {
            SignalingEvent::Open => {}
            SignalingEvent::SdpOffer {
                description,
                remote_client_id,
            } => {
                inner
                    .handle_offer(&sender, description, remote_client_id)
                    .await;
            }
            SignalingEvent::SdpAnswer { description, .. } => {
                inner.handle_answer(description).await;
            }
            SignalingEvent::IceCandidate { candidate, .. } => {
                inner.handle_candidate(candidate).await;
            }
            SignalingEvent::Closed => {
                // Expected once negotiation is done; the peer link lives on.
                debug!("Signaling relay closed, call continues");
                break;
            }
            SignalingEvent::Error(e) => {
                warn!("Signaling error: {}", e);
                inner.notify(
                    inner
                        .config
                        .alert_notice("Signaling connection error. The call cannot be set up."),
                );
                break;
            }
        }
    }
    relay.close().await;
}

async fn state_watcher(inner: Arc<SessionInner>) {
    let mut states = inner.peer.state().subscribe();
    let mut last = ConnectionState::New;
    while let Some(state) = states.next().await {
        if state == last {
            continue;
        }
        last = state;
        debug!("Connection state: {}", state);
        let _ = inner.events.send(CallEvent::ConnectionState(state));

        match state {
            ConnectionState::Connected => {
                inner.notify(inner.config.info_notice("Connected."));
            }
            ConnectionState::Disconnected => {
                inner.notify(inner.config.alert_notice(
                    "Connection lost. The other participant may have dropped.",
                ));
            }
            ConnectionState::Failed => {
                inner.notify(inner.config.alert_notice("Connection failed."));
            }
            ConnectionState::Closed => {
                inner.notify(inner.config.alert_notice("Call ended."));
            }
            ConnectionState::New | ConnectionState::Connecting => {}
        }

        if state.is_terminal() {
            inner.driver.stop_transcribing().await;
            break;
        }
    }
}

async fn chat_forwarder(inner: Arc<SessionInner>, mut chat_rx: mpsc::UnboundedReceiver<ChatEvent>) {
    while let Some(event) = chat_rx.recv().await {
        let mapped = match event {
            ChatEvent::Message(message) => CallEvent::Chat(message),
            ChatEvent::Notice(notice) => CallEvent::Notice(notice),
        };
        let _ = inner.events.send(mapped);
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use telecare_core::{AudioTrack, DEFAULT_SAMPLE_RATE_HZ};
    use telecare_transcribe::{StreamRequest, TranscribeProvider, TranscriptStream};

    #[test]
    fn test_generated_client_id_is_small_decimal() {
        for _ in 0..64 {
            let id = random_client_id();
            let n: u32 = id.parse().unwrap();
            assert!(n < 1_000_000);
        }
    }

    #[test]
    fn test_resolve_client_id_prefers_configured() {
        let config = CallConfig::default().with_client_id("fixed-7");
        assert_eq!(resolve_client_id(CallRole::Joiner, &config), "fixed-7");
        assert_eq!(resolve_client_id(CallRole::Initiator, &config), "fixed-7");

        let config = CallConfig::default();
        assert!(resolve_client_id(CallRole::Initiator, &config).starts_with("host-"));
    }

    #[test]
    fn test_event_names() {
        let notice = CallEvent::Notice(Notice::new("hi", std::time::Duration::from_secs(1)));
        assert_eq!(notice.name(), "notice");
        assert_eq!(
            CallEvent::ConnectionState(ConnectionState::Connected).name(),
            "connection_state"
        );
        assert_eq!(CallEvent::RemoteStream(MediaStream::new()).name(), "remote_stream");
    }

    struct IdleProvider;

    #[async_trait]
    impl TranscribeProvider for IdleProvider {
        async fn start_stream(
            &self,
            _request: StreamRequest,
            mut frames: mpsc::Receiver<Bytes>,
        ) -> telecare_transcribe::Result<TranscriptStream> {
            tokio::spawn(async move { while frames.recv().await.is_some() {} });
            Ok(Box::pin(futures::stream::pending()))
        }
    }

    #[tokio::test]
    async fn test_start_picks_up_stream_adopted_mid_start() {
        let mut config = CallConfig::new("race-1", "ws://unused.test").with_ice_servers(vec![]);
        config.transcribe.settle_delay_ms = 100;

        let peer = Arc::new(PeerConnection::new(&config).await.unwrap());
        let local_rtp_track = peer
            .add_local_audio_track("audio", "call-race-1")
            .await
            .unwrap();
        let driver = Arc::new(
            TranscriptionDriver::new(Arc::new(IdleProvider), config.transcribe.clone()).unwrap(),
        );

        let mut local = MediaStream::new();
        local.add_audio_track(AudioTrack::new("mic", DEFAULT_SAMPLE_RATE_HZ));

        let (events, _events_rx) = mpsc::unbounded_channel();
        let (chat_events, _chat_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(SessionInner {
            role: CallRole::Initiator,
            config,
            client_id: "host-1".to_string(),
            peer,
            driver: Arc::clone(&driver),
            remote_audio: None,
            local_stream: local,
            local_rtp_track,
            remote_stream: RwLock::new(MediaStream::new()),
            remote_client_id: RwLock::new(None),
            negotiated: AtomicBool::new(false),
            chat: RwLock::new(None),
            chat_log: Arc::new(Mutex::new(ChatLog::new())),
            chat_ids: Arc::new(MessageIdGen::new()),
            chat_events,
            events,
        });

        // Negotiation snapshots the remote stream, then a track arrives
        // before the driver start runs against that snapshot.
        let snapshot = read_lock(&inner.remote_stream).clone();
        let adopted_track = AudioTrack::new("their-audio", DEFAULT_SAMPLE_RATE_HZ);
        let mut adopted = MediaStream::new();
        adopted.add_audio_track(adopted_track.clone());
        *write_lock(&inner.remote_stream) = adopted;

        inner.start_driver_from(snapshot).await;

        assert!(driver.is_transcribing());
        assert!(driver.is_stream_active());
        assert!(
            adopted_track.tap_count() > 0,
            "track adopted mid-start never entered the mix"
        );
        driver.stop_transcribing().await;
        inner.peer.close().await.unwrap();
    }
}
