//! Session identity and user-facing notices

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fmt;
use std::time::Duration;

/// Generate a fresh session identifier.
///
/// The id embeds the creation time in milliseconds plus a short random
/// suffix, e.g. `session_1718000000000_k3f9x2ab1`. The prefix keeps ids
/// sortable by creation order; the suffix keeps ids from two sessions
/// started in the same millisecond distinct.
pub fn session_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis().max(0);
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(char::from)
        .collect::<String>()
        .to_lowercase();
    format!("session_{}_{}", millis, suffix)
}

/// A transient message surfaced to the participant.
///
/// Notices carry their own display duration so the presentation layer does
/// not need a severity table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Text shown to the participant.
    pub text: String,
    /// How long the notice should stay visible.
    pub duration: Duration,
}

impl Notice {
    /// Create a notice with an explicit display duration.
    pub fn new(text: impl Into<String>, duration: Duration) -> Self {
        Self {
            text: text.into(),
            duration,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_shape() {
        let id = session_id();
        let parts: Vec<&str> = id.splitn(3, '_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "session");
        assert!(parts[1].parse::<u64>().is_ok(), "timestamp part: {}", parts[1]);
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_session_ids_are_distinct() {
        let a = session_id();
        let b = session_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_notice_display() {
        let notice = Notice::new("microphone unavailable", Duration::from_secs(3));
        assert_eq!(notice.to_string(), "microphone unavailable");
    }
}
