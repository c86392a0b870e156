//! Peer connection wrapper over the WebRTC stack.
//!
//! Wraps `RTCPeerConnection` with the call's vocabulary: offers and
//! answers as plain SDP strings, ICE candidates in the relay payload
//! shape, and connection state surfaced through an [`Observable`] so
//! the session can react to transitions without polling.

use std::sync::Arc;

use telecare_core::Observable;
use tracing::{debug, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::config::CallConfig;
use crate::error::{Error, Result};
use crate::signaling::IceCandidatePayload;

/// Connection state of a call's peer link.
///
/// All six states are distinct: `Disconnected` (transport lost, peer
/// may be gone) and `Closed` (connection shut down locally or remotely)
/// carry different user-facing meaning and notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// Whether the call cannot continue from this state.
    ///
    /// No automatic renegotiation is attempted from a terminal state;
    /// the user starts a fresh call instead.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected | ConnectionState::Failed | ConnectionState::Closed
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::New => "new",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// One side of the call's WebRTC link.
pub struct PeerConnection {
    rtc: Arc<RTCPeerConnection>,
    state: Observable<ConnectionState>,
}

impl PeerConnection {
    /// Create a peer connection from the call's ICE configuration.
    pub async fn new(config: &CallConfig) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::PeerConnection(format!("failed to register codecs: {}", e)))?;

        let interceptor_registry = register_default_interceptors(Default::default(), &mut media_engine)
            .map_err(|e| Error::PeerConnection(format!("failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let ice_servers: Vec<RTCIceServer> = config
            .ice_servers
            .iter()
            .map(|server| {
                #[allow(clippy::needless_update)]
                RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone(),
                    credential: server.credential.clone(),
                    ..Default::default()
                }
            })
            .collect();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let rtc = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(|e| Error::PeerConnection(format!("failed to create connection: {}", e)))?,
        );

        let state = Observable::new(ConnectionState::New);
        let state_handle = state.clone();
        rtc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            let state_handle = state_handle.clone();
            Box::pin(async move {
                let mapped = match s {
                    RTCPeerConnectionState::New => ConnectionState::New,
                    RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
                    RTCPeerConnectionState::Connected => ConnectionState::Connected,
                    RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
                    RTCPeerConnectionState::Failed => ConnectionState::Failed,
                    RTCPeerConnectionState::Closed => ConnectionState::Closed,
                    _ => return,
                };
                if state_handle.get() != mapped {
                    debug!("Peer state transition: {}", mapped);
                    state_handle.set(mapped);
                }
            })
        }));

        Ok(Self { rtc, state })
    }

    /// Observable connection state.
    pub fn state(&self) -> &Observable<ConnectionState> {
        &self.state
    }

    /// Create the local offer and return its SDP.
    pub async fn create_offer(&self) -> Result<String> {
        let offer = self
            .rtc
            .create_offer(None)
            .await
            .map_err(|e| Error::Sdp(format!("failed to create offer: {}", e)))?;

        self.rtc
            .set_local_description(offer)
            .await
            .map_err(|e| Error::Sdp(format!("failed to set local description: {}", e)))?;

        let local = self
            .rtc
            .local_description()
            .await
            .ok_or_else(|| Error::Sdp("no local description after offer".to_string()))?;

        debug!("Created SDP offer");
        Ok(local.sdp)
    }

    /// Apply a remote offer and return the answer SDP.
    pub async fn accept_offer(&self, offer_sdp: String) -> Result<String> {
        let offer = RTCSessionDescription::offer(offer_sdp)
            .map_err(|e| Error::Sdp(format!("failed to parse offer: {}", e)))?;

        self.rtc
            .set_remote_description(offer)
            .await
            .map_err(|e| Error::Sdp(format!("failed to set remote description: {}", e)))?;

        let answer = self
            .rtc
            .create_answer(None)
            .await
            .map_err(|e| Error::Sdp(format!("failed to create answer: {}", e)))?;

        self.rtc
            .set_local_description(answer)
            .await
            .map_err(|e| Error::Sdp(format!("failed to set local description: {}", e)))?;

        let local = self
            .rtc
            .local_description()
            .await
            .ok_or_else(|| Error::Sdp("no local description after answer".to_string()))?;

        debug!("Created SDP answer");
        Ok(local.sdp)
    }

    /// Apply the remote answer to our earlier offer.
    pub async fn accept_answer(&self, answer_sdp: String) -> Result<()> {
        let answer = RTCSessionDescription::answer(answer_sdp)
            .map_err(|e| Error::Sdp(format!("failed to parse answer: {}", e)))?;

        self.rtc
            .set_remote_description(answer)
            .await
            .map_err(|e| Error::Sdp(format!("failed to set remote description: {}", e)))?;

        debug!("Applied SDP answer");
        Ok(())
    }

    /// Apply a trickled remote ICE candidate.
    pub async fn add_ice_candidate(&self, payload: IceCandidatePayload) -> Result<()> {
        self.rtc
            .add_ice_candidate(payload.into())
            .await
            .map_err(|e| Error::IceCandidate(format!("failed to add candidate: {}", e)))
    }

    /// Register a handler for locally gathered ICE candidates.
    ///
    /// The handler runs on the gathering task; it must not block.
    pub fn on_ice_candidate<F>(&self, handler: F)
    where
        F: Fn(IceCandidatePayload) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        self.rtc
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    if let Some(candidate) = candidate {
                        match candidate.to_json() {
                            Ok(init) => handler(init.into()),
                            Err(e) => warn!("Failed to serialize ICE candidate: {}", e),
                        }
                    }
                })
            }));
    }

    /// Add the outbound audio track that negotiation advertises.
    ///
    /// Returns the sample track; callers feed it encoded Opus. The RTCP
    /// reader for the sender is drained in a background task.
    pub async fn add_local_audio_track(
        &self,
        track_id: &str,
        stream_id: &str,
    ) -> Result<Arc<TrackLocalStaticSample>> {
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48_000,
                channels: 2,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
            track_id.to_string(),
            stream_id.to_string(),
        ));

        let rtp_sender = self
            .rtc
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::MediaTrack(format!("failed to add audio track: {}", e)))?;

        // Drain RTCP so the interceptors keep processing reports.
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while let Ok((_, _)) = rtp_sender.read(&mut rtcp_buf).await {}
        });

        Ok(track)
    }

    /// Register a handler for inbound remote tracks.
    pub fn on_track<F>(&self, handler: F)
    where
        F: Fn(Arc<TrackRemote>) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        self.rtc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                debug!("Remote track received: {:?}", track.kind());
                handler(track);
            })
        }));
    }

    /// Create an ordered, reliable data channel.
    pub async fn create_data_channel(&self, label: &str) -> Result<Arc<RTCDataChannel>> {
        let init = RTCDataChannelInit {
            ordered: Some(true),
            ..Default::default()
        };
        self.rtc
            .create_data_channel(label, Some(init))
            .await
            .map_err(|e| Error::DataChannel(format!("failed to create channel: {}", e)))
    }

    /// Register a handler for data channels opened by the remote side.
    pub fn on_data_channel<F>(&self, handler: F)
    where
        F: Fn(Arc<RTCDataChannel>) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        self.rtc.on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                debug!("Remote data channel announced: {}", channel.label());
                handler(channel);
            })
        }));
    }

    /// Close the connection. The state observable reports `Closed`
    /// through the normal state-change path.
    pub async fn close(&self) -> Result<()> {
        self.rtc
            .close()
            .await
            .map_err(|e| Error::PeerConnection(format!("failed to close: {}", e)))
    }
}
