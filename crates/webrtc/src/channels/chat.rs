//! Chat over the call's data channel.
//!
//! [`ChatChannel`] wraps the negotiated data channel with chat
//! semantics: inbound bytes are parsed, restamped, and appended to the
//! shared [`ChatLog`]; outbound sends check the channel lifecycle and
//! surface a user-facing [`Notice`] instead of an error when the
//! channel cannot deliver. Open, close, and error transitions each
//! emit a timed notice.

use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use bytes::Bytes;
use telecare_core::{ChatLog, ChatMessage, MessageIdGen, Notice, ParticipantRole};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;

use crate::channels::messages::{restamp_inbound, WireChatMessage, MAX_MESSAGE_SIZE};

/// Lifecycle of the chat channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatChannelState {
    /// Transport negotiation still in flight
    Connecting,
    /// Messages flow
    Open,
    /// Closed by either side; chat is over for this call
    Closed,
}

/// Events pushed by the chat channel as they happen.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A message entered the log, inbound or outbound
    Message(ChatMessage),
    /// A user-facing notice (lifecycle or delivery)
    Notice(Notice),
}

/// Identity and notice settings for one chat endpoint.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// Client id stamped on outbound wire messages
    pub sender_id: String,
    /// Role tag stamped on outbound messages
    pub role_tag: Option<ParticipantRole>,
    /// Duration of lifecycle notices
    pub info_notice_ms: u64,
    /// Duration of delivery-problem notices
    pub warn_notice_ms: u64,
}

/// Chat endpoint bound to one data channel.
pub struct ChatChannel {
    rtc_channel: Arc<RTCDataChannel>,
    state: Arc<RwLock<ChatChannelState>>,
    log: Arc<Mutex<ChatLog>>,
    ids: Arc<MessageIdGen>,
    options: ChatOptions,
    events: mpsc::UnboundedSender<ChatEvent>,
}

impl ChatChannel {
    /// Bind chat semantics to a data channel.
    ///
    /// Works for both locally created channels and channels announced
    /// by the remote side; the starting state is seeded from the
    /// channel's current ready state.
    pub fn attach(
        rtc_channel: Arc<RTCDataChannel>,
        options: ChatOptions,
        log: Arc<Mutex<ChatLog>>,
        ids: Arc<MessageIdGen>,
        events: mpsc::UnboundedSender<ChatEvent>,
    ) -> Arc<Self> {
        let state = Arc::new(RwLock::new(match rtc_channel.ready_state() {
            RTCDataChannelState::Open => ChatChannelState::Open,
            RTCDataChannelState::Closing | RTCDataChannelState::Closed => ChatChannelState::Closed,
            _ => ChatChannelState::Connecting,
        }));

        let channel = Self {
            rtc_channel,
            state,
            log,
            ids,
            options,
            events,
        };
        channel.setup_handlers();
        Arc::new(channel)
    }

    // Handlers deliberately capture only what they need; capturing the
    // whole channel would cycle through the RTC handle and leak it.
    fn setup_handlers(&self) {
        let label = self.rtc_channel.label().to_string();

        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let info_ms = self.options.info_notice_ms;
        let open_label = label.clone();
        self.rtc_channel.on_open(Box::new(move || {
            info!("Chat channel open: {}", open_label);
            set_state(&state, ChatChannelState::Open);
            send_notice(&events, "Chat connected.", info_ms);
            Box::pin(async move {})
        }));

        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let warn_ms = self.options.warn_notice_ms;
        let close_label = label.clone();
        self.rtc_channel.on_close(Box::new(move || {
            info!("Chat channel closed: {}", close_label);
            set_state(&state, ChatChannelState::Closed);
            send_notice(&events, "Chat disconnected.", warn_ms);
            Box::pin(async move {})
        }));

        let events = self.events.clone();
        let warn_ms = self.options.warn_notice_ms;
        let error_label = label.clone();
        self.rtc_channel.on_error(Box::new(move |err| {
            warn!("Chat channel error on {}: {}", error_label, err);
            send_notice(&events, "Chat channel error.", warn_ms);
            Box::pin(async move {})
        }));

        let log = Arc::clone(&self.log);
        let ids = Arc::clone(&self.ids);
        let events = self.events.clone();
        self.rtc_channel
            .on_message(Box::new(move |msg: DataChannelMessage| {
                let log = Arc::clone(&log);
                let ids = Arc::clone(&ids);
                let events = events.clone();
                Box::pin(async move {
                    deliver_inbound(&msg.data, &ids, &log, &events);
                })
            }));
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ChatChannelState {
        match self.state.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Send a chat message.
    ///
    /// Delivery problems never surface as errors: the user gets a
    /// notice and `None` comes back. On success the message is appended
    /// to the log as our own and returned.
    pub async fn send(&self, text: &str) -> Option<ChatMessage> {
        match self.state() {
            ChatChannelState::Connecting => {
                self.delivery_notice("Chat is still connecting. Please try again in a moment.");
                return None;
            }
            ChatChannelState::Closed => {
                self.delivery_notice("Chat is disconnected.");
                return None;
            }
            ChatChannelState::Open => {}
        }

        let wire = WireChatMessage::outgoing(
            text,
            self.options.role_tag,
            self.options.sender_id.clone(),
        );
        let bytes = match wire.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to encode chat message: {}", e);
                self.delivery_notice("Message could not be sent.");
                return None;
            }
        };
        if bytes.len() > MAX_MESSAGE_SIZE {
            self.delivery_notice("Message is too long to send.");
            return None;
        }

        if let Err(e) = self.rtc_channel.send(&Bytes::from(bytes)).await {
            warn!("Chat send failed: {}", e);
            self.delivery_notice("Message could not be sent.");
            return None;
        }

        let message = ChatMessage::outgoing(self.ids.next(), text, self.options.role_tag);
        self.lock_log().push(message.clone());
        let _ = self.events.send(ChatEvent::Message(message.clone()));
        Some(message)
    }

    /// Close the underlying data channel.
    pub async fn close(&self) {
        if let Err(e) = self.rtc_channel.close().await {
            warn!("Chat channel close failed: {}", e);
        }
        set_state(&self.state, ChatChannelState::Closed);
    }

    fn delivery_notice(&self, text: &str) {
        send_notice(&self.events, text, self.options.warn_notice_ms);
    }

    fn lock_log(&self) -> MutexGuard<'_, ChatLog> {
        match self.log.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Parse, restamp, and deliver one inbound frame.
fn deliver_inbound(
    data: &[u8],
    ids: &MessageIdGen,
    log: &Mutex<ChatLog>,
    events: &mpsc::UnboundedSender<ChatEvent>,
) {
    let wire = match WireChatMessage::from_bytes(data) {
        Ok(wire) => wire,
        Err(e) => {
            warn!("Dropping malformed chat message: {}", e);
            return;
        }
    };
    debug!("Chat message received from {}", wire.sender_id);
    let message = restamp_inbound(wire, ids.next());
    match log.lock() {
        Ok(mut guard) => guard.push(message.clone()),
        Err(poisoned) => poisoned.into_inner().push(message.clone()),
    }
    let _ = events.send(ChatEvent::Message(message));
}

fn send_notice(events: &mpsc::UnboundedSender<ChatEvent>, text: &str, duration_ms: u64) {
    let _ = events.send(ChatEvent::Notice(Notice::new(
        text,
        Duration::from_millis(duration_ms),
    )));
}

fn set_state(state: &Arc<RwLock<ChatChannelState>>, new_state: ChatChannelState) {
    match state.write() {
        Ok(mut guard) => *guard = new_state,
        Err(poisoned) => *poisoned.into_inner() = new_state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CallConfig;
    use crate::peer::PeerConnection;

    fn options() -> ChatOptions {
        ChatOptions {
            sender_id: "c-test".to_string(),
            role_tag: Some(ParticipantRole::Doctor),
            info_notice_ms: 2_000,
            warn_notice_ms: 3_000,
        }
    }

    async fn unconnected_channel() -> (
        Arc<ChatChannel>,
        Arc<Mutex<ChatLog>>,
        mpsc::UnboundedReceiver<ChatEvent>,
    ) {
        let mut config = CallConfig::default();
        config.ice_servers = vec![];
        let peer = PeerConnection::new(&config).await.unwrap();
        let rtc = peer.create_data_channel("chat").await.unwrap();

        let log = Arc::new(Mutex::new(ChatLog::new()));
        let ids = Arc::new(MessageIdGen::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = ChatChannel::attach(rtc, options(), Arc::clone(&log), ids, tx);
        (channel, log, rx)
    }

    fn first_notice_text(rx: &mut mpsc::UnboundedReceiver<ChatEvent>) -> String {
        while let Ok(event) = rx.try_recv() {
            if let ChatEvent::Notice(notice) = event {
                return notice.text;
            }
        }
        panic!("no notice queued");
    }

    #[tokio::test]
    async fn test_starts_connecting_before_transport() {
        let (channel, _log, _rx) = unconnected_channel().await;
        assert_eq!(channel.state(), ChatChannelState::Connecting);
    }

    #[tokio::test]
    async fn test_send_before_open_notices_and_drops() {
        let (channel, log, mut rx) = unconnected_channel().await;

        let sent = channel.send("hello?").await;
        assert!(sent.is_none());

        match rx.recv().await.unwrap() {
            ChatEvent::Notice(notice) => {
                assert!(notice.text.contains("still connecting"));
                assert_eq!(notice.duration, Duration::from_millis(3_000));
            }
            other => panic!("expected notice, got {:?}", other),
        }
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_after_close_notices_disconnected() {
        let (channel, _log, mut rx) = unconnected_channel().await;
        channel.close().await;
        assert_eq!(channel.state(), ChatChannelState::Closed);

        assert!(channel.send("anyone?").await.is_none());
        // Depending on transport timing the close itself may queue a
        // notice first; the send notice must be among them.
        let mut texts = vec![first_notice_text(&mut rx)];
        while let Ok(ChatEvent::Notice(notice)) = rx.try_recv() {
            texts.push(notice.text);
        }
        assert!(texts.iter().any(|t| t.contains("disconnected")));
    }

    #[tokio::test]
    async fn test_inbound_bytes_restamp_into_log() {
        let log = Arc::new(Mutex::new(ChatLog::new()));
        let ids = Arc::new(MessageIdGen::new());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let wire = WireChatMessage {
            text: "how are you feeling?".to_string(),
            role: Some(ParticipantRole::Patient),
            sent_at: 123,
            sender_id: "remote-5".to_string(),
        };
        deliver_inbound(&wire.to_bytes().unwrap(), &ids, &log, &tx);

        match rx.recv().await.unwrap() {
            ChatEvent::Message(message) => {
                assert!(!message.is_self);
                assert_eq!(message.text, "how are you feeling?");
                assert_eq!(message.role, Some(ParticipantRole::Patient));
            }
            other => panic!("expected message, got {:?}", other),
        }
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.unread(), 1);
    }

    #[tokio::test]
    async fn test_malformed_inbound_is_ignored() {
        let log = Arc::new(Mutex::new(ChatLog::new()));
        let ids = Arc::new(MessageIdGen::new());
        let (tx, mut rx) = mpsc::unbounded_channel();

        deliver_inbound(b"{\"nope\":true}", &ids, &log, &tx);
        deliver_inbound(b"\x00\x01\x02", &ids, &log, &tx);

        assert!(log.lock().unwrap().is_empty());
        assert!(rx.try_recv().is_err());
    }
}
