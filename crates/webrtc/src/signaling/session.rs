//! Relay session: a pump task over a pluggable signaling transport.
//!
//! [`RelaySession`] owns the transport and runs one pump task that
//! sends negotiation envelopes and decodes inbound ones into typed
//! [`SignalingEvent`]s. Malformed inbound messages are dropped with a
//! warning so one bad envelope cannot kill negotiation. [`RelaySender`]
//! is a cheap clone handle that sends without awaiting, usable from
//! ICE gathering callbacks.
//!
//! A session created with a local client id (the joiner) stamps that id
//! as `senderClientId` on everything it sends; answer and candidate
//! sends optionally address a recipient (the initiator replying to the
//! joiner it learned from the offer).

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::signaling::protocol::{
    IceCandidatePayload, RelayAction, RelayEnvelope, SessionDescriptionPayload,
};

/// How long [`RelaySession::close`] lets the pump flush before aborting.
const PUMP_SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

/// Transport seam beneath the relay session.
///
/// Production uses [`WebSocketChannel`]; tests wire two sessions
/// together in memory.
#[async_trait]
pub trait SignalingChannel: Send {
    /// Send one text message.
    async fn send(&mut self, text: String) -> Result<()>;

    /// Receive the next text message, `None` once the transport closed.
    async fn recv(&mut self) -> Option<Result<String>>;

    /// Close the transport.
    async fn close(&mut self);
}

/// WebSocket transport for the signaling relay.
pub struct WebSocketChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WebSocketChannel {
    /// Connect to a `ws://` or `wss://` relay endpoint.
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| Error::Signaling(format!("connect to {} failed: {}", url, e)))?;
        info!("Signaling relay connected: {}", url);
        Ok(Self { stream })
    }
}

#[async_trait]
impl SignalingChannel for WebSocketChannel {
    async fn send(&mut self, text: String) -> Result<()> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| Error::Signaling(format!("websocket send failed: {}", e)))
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        while let Some(message) = self.stream.next().await {
            match message {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(_)) => return None,
                // Pongs are queued by tungstenite; other frame kinds are
                // not part of the relay protocol.
                Ok(_) => continue,
                Err(e) => return Some(Err(Error::Signaling(e.to_string()))),
            }
        }
        None
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// In-process transport: two endpoints wired back to back.
pub struct MemoryChannel {
    tx: Option<mpsc::UnboundedSender<String>>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl MemoryChannel {
    /// Create two connected endpoints.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(a_tx),
                rx: b_rx,
            },
            Self {
                tx: Some(b_tx),
                rx: a_rx,
            },
        )
    }
}

#[async_trait]
impl SignalingChannel for MemoryChannel {
    async fn send(&mut self, text: String) -> Result<()> {
        match &self.tx {
            Some(tx) => tx
                .send(text)
                .map_err(|_| Error::Signaling("peer endpoint dropped".to_string())),
            None => Err(Error::Signaling("channel closed".to_string())),
        }
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.tx = None;
    }
}

/// Typed negotiation events decoded from the relay.
#[derive(Debug, Clone)]
pub enum SignalingEvent {
    /// Transport is attached and the pump is running
    Open,
    /// Remote party's offer; `remote_client_id` identifies the sender
    SdpOffer {
        description: SessionDescriptionPayload,
        remote_client_id: Option<String>,
    },
    /// Remote party's answer to our offer
    SdpAnswer {
        description: SessionDescriptionPayload,
        remote_client_id: Option<String>,
    },
    /// Remote party's trickled ICE candidate
    IceCandidate {
        candidate: IceCandidatePayload,
        remote_client_id: Option<String>,
    },
    /// Transport closed; benign once negotiation has completed
    Closed,
    /// Transport error; the session is unusable afterwards
    Error(String),
}

impl SignalingEvent {
    /// Event name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            SignalingEvent::Open => "open",
            SignalingEvent::SdpOffer { .. } => "sdp_offer",
            SignalingEvent::SdpAnswer { .. } => "sdp_answer",
            SignalingEvent::IceCandidate { .. } => "ice_candidate",
            SignalingEvent::Closed => "closed",
            SignalingEvent::Error(_) => "error",
        }
    }
}

/// Clone handle for sending envelopes without awaiting.
#[derive(Clone)]
pub struct RelaySender {
    outbound: mpsc::UnboundedSender<String>,
    local_client_id: Option<String>,
}

impl RelaySender {
    /// Relay our SDP offer.
    pub fn send_sdp_offer(&self, description: &SessionDescriptionPayload) -> Result<()> {
        self.dispatch(RelayEnvelope::offer(description)?, None)
    }

    /// Relay our SDP answer, addressed to the offering client.
    pub fn send_sdp_answer(
        &self,
        description: &SessionDescriptionPayload,
        recipient_client_id: Option<&str>,
    ) -> Result<()> {
        self.dispatch(RelayEnvelope::answer(description)?, recipient_client_id)
    }

    /// Relay a locally gathered ICE candidate.
    pub fn send_ice_candidate(
        &self,
        candidate: &IceCandidatePayload,
        recipient_client_id: Option<&str>,
    ) -> Result<()> {
        self.dispatch(RelayEnvelope::ice(candidate)?, recipient_client_id)
    }

    fn dispatch(&self, mut envelope: RelayEnvelope, recipient: Option<&str>) -> Result<()> {
        if let Some(id) = &self.local_client_id {
            envelope.sender_client_id = Some(id.clone());
        }
        if let Some(recipient) = recipient {
            envelope.recipient_client_id = Some(recipient.to_string());
        }
        let text = envelope.to_json()?;
        self.outbound
            .send(text)
            .map_err(|_| Error::Signaling("relay session closed".to_string()))
    }
}

/// An attached signaling relay connection.
pub struct RelaySession {
    outbound: mpsc::UnboundedSender<String>,
    events: mpsc::UnboundedReceiver<SignalingEvent>,
    local_client_id: Option<String>,
    pump: JoinHandle<()>,
}

impl RelaySession {
    /// Connect to a relay over WebSocket.
    ///
    /// `local_client_id` is stamped on everything this session sends;
    /// the initiator passes `None`.
    pub async fn connect(url: &str, local_client_id: Option<String>) -> Result<Self> {
        let channel = WebSocketChannel::connect(url).await?;
        Ok(Self::with_channel(Box::new(channel), local_client_id))
    }

    /// Attach to an already-built transport.
    pub fn with_channel(
        channel: Box<dyn SignalingChannel>,
        local_client_id: Option<String>,
    ) -> Self {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(pump_task(channel, out_rx, event_tx));
        Self {
            outbound: out_tx,
            events: event_rx,
            local_client_id,
            pump,
        }
    }

    /// A clone handle for sending from callbacks.
    pub fn sender(&self) -> RelaySender {
        RelaySender {
            outbound: self.outbound.clone(),
            local_client_id: self.local_client_id.clone(),
        }
    }

    /// Relay our SDP offer.
    pub fn send_sdp_offer(&self, description: &SessionDescriptionPayload) -> Result<()> {
        self.sender().send_sdp_offer(description)
    }

    /// Relay our SDP answer.
    pub fn send_sdp_answer(
        &self,
        description: &SessionDescriptionPayload,
        recipient_client_id: Option<&str>,
    ) -> Result<()> {
        self.sender().send_sdp_answer(description, recipient_client_id)
    }

    /// Relay a locally gathered ICE candidate.
    pub fn send_ice_candidate(
        &self,
        candidate: &IceCandidatePayload,
        recipient_client_id: Option<&str>,
    ) -> Result<()> {
        self.sender().send_ice_candidate(candidate, recipient_client_id)
    }

    /// Next signaling event, `None` once the pump has stopped.
    pub async fn next_event(&mut self) -> Option<SignalingEvent> {
        self.events.recv().await
    }

    /// Close the transport.
    ///
    /// Waits briefly so queued outbound frames can flush, then stops the
    /// pump. Sender handles held by callbacks error from then on.
    pub async fn close(self) {
        drop(self.outbound);
        let abort = self.pump.abort_handle();
        if tokio::time::timeout(PUMP_SHUTDOWN_GRACE, self.pump)
            .await
            .is_err()
        {
            debug!("Relay pump still held open, aborting it");
            abort.abort();
        }
    }
}

async fn pump_task(
    mut channel: Box<dyn SignalingChannel>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<SignalingEvent>,
) {
    let _ = events.send(SignalingEvent::Open);
    loop {
        tokio::select! {
            outgoing = outbound.recv() => match outgoing {
                Some(text) => {
                    if let Err(e) = channel.send(text).await {
                        warn!("Relay send failed: {}", e);
                        let _ = events.send(SignalingEvent::Error(e.to_string()));
                        break;
                    }
                }
                // Session handle dropped; close the transport politely.
                None => {
                    channel.close().await;
                    break;
                }
            },
            inbound = channel.recv() => match inbound {
                Some(Ok(text)) => {
                    if let Some(event) = decode_relay_text(&text) {
                        let _ = events.send(event);
                    }
                }
                Some(Err(e)) => {
                    warn!("Signaling transport error: {}", e);
                    let _ = events.send(SignalingEvent::Error(e.to_string()));
                    break;
                }
                None => {
                    info!("Signaling relay closed");
                    let _ = events.send(SignalingEvent::Closed);
                    break;
                }
            },
        }
    }
}

/// Decode one relay text frame; malformed frames yield `None` with a
/// warning.
fn decode_relay_text(text: &str) -> Option<SignalingEvent> {
    let envelope = match RelayEnvelope::from_json(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("Dropping malformed relay message: {}", e);
            return None;
        }
    };
    debug!(action = envelope.action.name(), "Relay message received");
    let remote_client_id = envelope.sender_client_id.clone();
    let decoded = match envelope.action {
        RelayAction::SdpOffer => envelope
            .decode_payload::<SessionDescriptionPayload>()
            .map(|description| SignalingEvent::SdpOffer {
                description,
                remote_client_id,
            }),
        RelayAction::SdpAnswer => envelope
            .decode_payload::<SessionDescriptionPayload>()
            .map(|description| SignalingEvent::SdpAnswer {
                description,
                remote_client_id,
            }),
        RelayAction::IceCandidate => envelope
            .decode_payload::<IceCandidatePayload>()
            .map(|candidate| SignalingEvent::IceCandidate {
                candidate,
                remote_client_id,
            }),
    };
    match decoded {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Dropping relay message with bad payload: {}", e);
            None
        }
    }
}
