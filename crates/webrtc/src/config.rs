//! Call configuration: role, signaling endpoint, ICE servers, notices.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use telecare_core::{Notice, ParticipantRole};
use telecare_transcribe::TranscribeConfig;

use crate::error::{Error, Result};

/// Which side of the call this process plays.
///
/// The initiator waits on the relay for an offer and answers it. The
/// joiner dials in: it sends the offer and consumes the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallRole {
    /// Hosts the session and answers incoming offers (the clinician side).
    Initiator,
    /// Joins an existing session by sending the offer (the patient side).
    Joiner,
}

impl CallRole {
    pub fn is_initiator(&self) -> bool {
        matches!(self, CallRole::Initiator)
    }

    pub fn is_joiner(&self) -> bool {
        matches!(self, CallRole::Joiner)
    }
}

impl std::fmt::Display for CallRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallRole::Initiator => write!(f, "initiator"),
            CallRole::Joiner => write!(f, "joiner"),
        }
    }
}

/// One ICE server entry (STUN or TURN).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServer {
    /// Server URLs, e.g. `stun:stun.example.com:443`
    pub urls: Vec<String>,
    /// TURN username, empty for STUN
    #[serde(default)]
    pub username: String,
    /// TURN credential, empty for STUN
    #[serde(default)]
    pub credential: String,
}

impl IceServer {
    /// A STUN-only entry with no credentials.
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: String::new(),
            credential: String::new(),
        }
    }

    /// A TURN entry with username/credential auth.
    pub fn turn(
        urls: Vec<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            urls,
            username: username.into(),
            credential: credential.into(),
        }
    }
}

/// The STUN endpoint of the managed signaling service for a region.
pub fn stun_url_for_region(region: &str) -> String {
    format!("stun:stun.kinesisvideo.{}.amazonaws.com:443", region)
}

/// Configuration for a two-party call.
#[derive(Debug, Clone)]
pub struct CallConfig {
    /// Relay channel both parties attach to
    pub channel_id: String,
    /// WebSocket URL of the signaling relay
    pub signaling_url: String,
    /// Client id announced by the joiner; generated when `None`
    pub client_id: Option<String>,
    /// ICE servers used for connectivity
    pub ice_servers: Vec<IceServer>,
    /// Label for the chat data channel
    pub data_channel_label: String,
    /// Role tag stamped on outbound chat messages
    pub local_role_tag: Option<ParticipantRole>,
    /// How long informational notices stay on screen
    pub info_notice_ms: u64,
    /// How long warning notices stay on screen
    pub warn_notice_ms: u64,
    /// How long alert notices stay on screen
    pub alert_notice_ms: u64,
    /// Transcription pipeline settings for this call
    pub transcribe: TranscribeConfig,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            channel_id: "demo".to_string(),
            signaling_url: "ws://localhost:8080/signaling".to_string(),
            client_id: None,
            ice_servers: vec![IceServer::stun("stun:stun.l.google.com:19302")],
            data_channel_label: "chat".to_string(),
            local_role_tag: None,
            info_notice_ms: 2_000,
            warn_notice_ms: 3_000,
            alert_notice_ms: 5_000,
            transcribe: TranscribeConfig::default(),
        }
    }
}

impl CallConfig {
    /// Configuration for a named relay channel.
    pub fn new(channel_id: impl Into<String>, signaling_url: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            signaling_url: signaling_url.into(),
            ..Default::default()
        }
    }

    /// Set the role tag stamped on outbound chat messages.
    pub fn with_role_tag(mut self, role: ParticipantRole) -> Self {
        self.local_role_tag = Some(role);
        self
    }

    /// Set a fixed client id instead of generating one.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Replace the ICE server list.
    pub fn with_ice_servers(mut self, servers: Vec<IceServer>) -> Self {
        self.ice_servers = servers;
        self
    }

    /// Replace the transcription settings.
    pub fn with_transcribe(mut self, transcribe: TranscribeConfig) -> Self {
        self.transcribe = transcribe;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.channel_id.is_empty() {
            return Err(Error::InvalidConfig("channel_id must not be empty".to_string()));
        }
        if self.signaling_url.is_empty() {
            return Err(Error::InvalidConfig(
                "signaling_url must not be empty".to_string(),
            ));
        }
        if !self.signaling_url.starts_with("ws://") && !self.signaling_url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "signaling_url must be a ws:// or wss:// URL, got {}",
                self.signaling_url
            )));
        }
        if self.data_channel_label.is_empty() {
            return Err(Error::InvalidConfig(
                "data_channel_label must not be empty".to_string(),
            ));
        }
        if self.info_notice_ms == 0 || self.warn_notice_ms == 0 || self.alert_notice_ms == 0 {
            return Err(Error::InvalidConfig(
                "notice durations must be non-zero".to_string(),
            ));
        }
        self.transcribe
            .validate()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        Ok(())
    }

    /// An informational notice with this call's info duration.
    pub fn info_notice(&self, text: impl Into<String>) -> Notice {
        Notice::new(text, Duration::from_millis(self.info_notice_ms))
    }

    /// A warning notice with this call's warn duration.
    pub fn warn_notice(&self, text: impl Into<String>) -> Notice {
        Notice::new(text, Duration::from_millis(self.warn_notice_ms))
    }

    /// An alert notice with this call's alert duration.
    pub fn alert_notice(&self, text: impl Into<String>) -> Notice {
        Notice::new(text, Duration::from_millis(self.alert_notice_ms))
    }
}
