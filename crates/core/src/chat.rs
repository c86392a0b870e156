//! Chat data model
//!
//! Messages are immutable once created. Identity is assigned locally on both
//! send and receipt, so ordering in a history is monotonic regardless of
//! clock skew between the two call participants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Which side of the consultation a participant speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    /// Clinician side of the call.
    Doctor,
    /// Patient side of the call.
    Patient,
}

/// One chat message in a call or assistant conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Locally-assigned monotonic id, never reused within a session.
    pub id: u64,
    /// Message body.
    pub text: String,
    /// True when this participant authored the message.
    pub is_self: bool,
    /// Optional role tag of the author.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub role: Option<ParticipantRole>,
    /// Local creation (or receipt) time.
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Build a message authored by this participant.
    pub fn outgoing(id: u64, text: impl Into<String>, role: Option<ParticipantRole>) -> Self {
        Self {
            id,
            text: text.into(),
            is_self: true,
            role,
            timestamp: Utc::now(),
        }
    }

    /// Build a message received from the remote participant.
    ///
    /// Receipt always stamps a fresh local id and timestamp; the sender's
    /// copy of either is never trusted for local ordering.
    pub fn incoming(id: u64, text: impl Into<String>, role: Option<ParticipantRole>) -> Self {
        Self {
            id,
            text: text.into(),
            is_self: false,
            role,
            timestamp: Utc::now(),
        }
    }
}

/// Generator of strictly monotonic message ids.
///
/// Ids are derived from the wall clock in milliseconds and bumped past the
/// previous id when two messages land in the same millisecond.
#[derive(Debug, Default)]
pub struct MessageIdGen {
    last: AtomicU64,
}

impl MessageIdGen {
    /// Create a generator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next id.
    pub fn next(&self) -> u64 {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self.last.compare_exchange_weak(
                last,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(observed) => last = observed,
            }
        }
    }
}

/// Ordered message history with unread bookkeeping.
///
/// Not synchronized itself; callers wrap it in a lock when shared.
#[derive(Debug, Default)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
    unread: usize,
    panel_open: bool,
}

impl ChatLog {
    /// Create an empty log with the panel considered closed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message.
    ///
    /// Remote messages arriving while the panel is closed bump the unread
    /// counter.
    pub fn push(&mut self, message: ChatMessage) {
        if !message.is_self && !self.panel_open {
            self.unread += 1;
        }
        self.messages.push(message);
    }

    /// Messages in arrival order.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Count of remote messages not yet seen.
    pub fn unread(&self) -> usize {
        self.unread
    }

    /// Mark every message read.
    pub fn mark_all_read(&mut self) {
        self.unread = 0;
    }

    /// Record the panel open/closed; opening clears the unread counter.
    pub fn set_panel_open(&mut self, open: bool) {
        self.panel_open = open;
        if open {
            self.unread = 0;
        }
    }

    /// Whether the panel is currently open.
    pub fn is_panel_open(&self) -> bool {
        self.panel_open
    }
}
