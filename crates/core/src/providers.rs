//! External-service seams
//!
//! Every network-backed dependency of a call (credential issuance,
//! translation, the assistant backend, recording upload) sits behind a
//! small async trait here so the call engine stays testable with in-memory
//! fakes.

use crate::chat::{ChatLog, ChatMessage, MessageIdGen};
use crate::error::Result;
use crate::observable::Observable;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::warn;

/// Default language for both transcription and translation.
pub const DEFAULT_LANGUAGE_CODE: &str = "zh-TW";

/// Reply shown when the assistant backend cannot be reached.
const ASSISTANT_FALLBACK_REPLY: &str =
    "Sorry, the assistant is unavailable right now. Please try again later.";

/// Short-lived credentials plus the relay coordinates they are scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsBundle {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub region: String,
    pub channel_id: String,
}

/// Issues call credentials.
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    /// Fetch a credentials bundle for the next connection attempt.
    async fn get_config(&self) -> Result<CredentialsBundle>;
}

/// Caching wrapper around a [`CredentialsProvider`].
///
/// The first successful fetch is reused for every later call until
/// [`refresh`](CachedCredentials::refresh) discards it. Failed fetches are
/// never cached.
pub struct CachedCredentials<P> {
    inner: P,
    cached: RwLock<Option<CredentialsBundle>>,
}

impl<P: CredentialsProvider> CachedCredentials<P> {
    /// Wrap a provider with an empty cache.
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cached: RwLock::new(None),
        }
    }

    /// Drop the cached bundle and fetch a fresh one.
    pub async fn refresh(&self) -> Result<CredentialsBundle> {
        {
            let mut cached = self.cached.write().await;
            *cached = None;
        }
        self.get_config().await
    }
}

#[async_trait]
impl<P: CredentialsProvider> CredentialsProvider for CachedCredentials<P> {
    async fn get_config(&self) -> Result<CredentialsBundle> {
        {
            let cached = self.cached.read().await;
            if let Some(bundle) = cached.as_ref() {
                return Ok(bundle.clone());
            }
        }
        let bundle = self.inner.get_config().await?;
        let mut cached = self.cached.write().await;
        *cached = Some(bundle.clone());
        Ok(bundle)
    }
}

/// A language offered by the translation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    /// BCP 47 style code, e.g. `zh-TW`.
    pub code: String,
    /// Human-readable name for pickers.
    pub name: String,
}

/// Text translation service.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` between the two language codes.
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String>;

    /// Languages the service can translate into.
    async fn list_languages(&self) -> Result<Vec<Language>>;
}

/// Observable source/target language selection.
///
/// Both sides default to [`DEFAULT_LANGUAGE_CODE`]; translation is skipped
/// whenever they match.
#[derive(Debug, Clone)]
pub struct LanguagePair {
    source: Observable<String>,
    target: Observable<String>,
}

impl LanguagePair {
    /// Create a pair with both languages at the default.
    pub fn new() -> Self {
        Self {
            source: Observable::new(DEFAULT_LANGUAGE_CODE.to_string()),
            target: Observable::new(DEFAULT_LANGUAGE_CODE.to_string()),
        }
    }

    /// Language the audio is spoken in.
    pub fn source(&self) -> &Observable<String> {
        &self.source
    }

    /// Language transcripts are displayed in.
    pub fn target(&self) -> &Observable<String> {
        &self.target
    }

    /// Whether a transcript needs translating before display.
    pub fn needs_translation(&self) -> bool {
        self.source.get() != self.target.get()
    }
}

impl Default for LanguagePair {
    fn default() -> Self {
        Self::new()
    }
}

/// Conversational assistant backend.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send one user message and return the assistant's reply text.
    async fn send_message(&self, text: &str, session_id: &str) -> Result<String>;
}

/// Destination for recorded audio files.
#[async_trait]
pub trait StorageUpload: Send + Sync {
    /// Store `bytes` under `filename`.
    async fn upload(&self, bytes: Vec<u8>, filename: &str, content_type: &str) -> Result<()>;
}

/// Assistant conversation bound to one session.
///
/// Backend failures degrade to a canned reply in the log rather than an
/// error; the conversation itself never breaks.
pub struct AssistantChat {
    backend: Arc<dyn ChatBackend>,
    session_id: String,
    log: Arc<Mutex<ChatLog>>,
    loading: Observable<bool>,
    ids: MessageIdGen,
}

impl AssistantChat {
    /// Start a conversation against `backend` with a fresh session id.
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self::with_session_id(backend, crate::session::session_id())
    }

    /// Start a conversation with an explicit session id.
    pub fn with_session_id(backend: Arc<dyn ChatBackend>, session_id: String) -> Self {
        Self {
            backend,
            session_id,
            log: Arc::new(Mutex::new(ChatLog::new())),
            loading: Observable::new(false),
            ids: MessageIdGen::new(),
        }
    }

    /// Session id messages are grouped under on the backend.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Message history shared with the presentation layer.
    pub fn log(&self) -> Arc<Mutex<ChatLog>> {
        Arc::clone(&self.log)
    }

    /// True while a reply is pending.
    pub fn loading(&self) -> &Observable<bool> {
        &self.loading
    }

    /// Send one user message and append the assistant's reply.
    ///
    /// Returns the reply message that was appended.
    pub async fn send(&self, text: impl Into<String>) -> ChatMessage {
        let text = text.into();
        {
            let mut log = self.lock_log();
            log.push(ChatMessage::outgoing(self.ids.next(), text.clone(), None));
        }
        self.loading.set(true);

        let reply_text = match self.backend.send_message(&text, &self.session_id).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("assistant backend request failed: {}", e);
                ASSISTANT_FALLBACK_REPLY.to_string()
            }
        };

        let reply = ChatMessage::incoming(self.ids.next(), reply_text, None);
        {
            let mut log = self.lock_log();
            log.push(reply.clone());
        }
        self.loading.set(false);
        reply
    }

    fn lock_log(&self) -> std::sync::MutexGuard<'_, ChatLog> {
        match self.log.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl CredentialsProvider for CountingProvider {
        async fn get_config(&self) -> Result<CredentialsBundle> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(CredentialsBundle {
                access_key_id: format!("key-{}", n),
                secret_access_key: "secret".to_string(),
                session_token: "token".to_string(),
                region: "ap-northeast-1".to_string(),
                channel_id: "channel".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_credentials_cached_after_first_fetch() {
        let cached = CachedCredentials::new(CountingProvider {
            fetches: AtomicUsize::new(0),
        });

        let first = cached.get_config().await.unwrap();
        let second = cached.get_config().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(cached.inner.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_discards_cached_bundle() {
        let cached = CachedCredentials::new(CountingProvider {
            fetches: AtomicUsize::new(0),
        });

        let first = cached.get_config().await.unwrap();
        let refreshed = cached.refresh().await.unwrap();
        assert_ne!(first.access_key_id, refreshed.access_key_id);
        assert_eq!(cached.inner.fetches.load(Ordering::SeqCst), 2);
    }

    struct EchoBackend;

    #[async_trait]
    impl ChatBackend for EchoBackend {
        async fn send_message(&self, text: &str, _session_id: &str) -> Result<String> {
            Ok(format!("echo: {}", text))
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl ChatBackend for FailingBackend {
        async fn send_message(&self, _text: &str, _session_id: &str) -> Result<String> {
            Err(Error::Provider("backend offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_assistant_appends_user_message_and_reply() {
        let chat = AssistantChat::new(Arc::new(EchoBackend));
        let reply = chat.send("hello").await;

        assert_eq!(reply.text, "echo: hello");
        assert!(!reply.is_self);

        let log = chat.log();
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert!(log.messages()[0].is_self);
        assert!(!log.messages()[1].is_self);
        assert!(log.messages()[1].id > log.messages()[0].id);
    }

    #[tokio::test]
    async fn test_assistant_falls_back_when_backend_fails() {
        let chat = AssistantChat::new(Arc::new(FailingBackend));
        let reply = chat.send("hello").await;

        assert_eq!(reply.text, ASSISTANT_FALLBACK_REPLY);
        assert!(!chat.loading().get(), "loading cleared after failure");

        let log = chat.log();
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2, "both user message and fallback are kept");
    }

    #[tokio::test]
    async fn test_language_pair_defaults_skip_translation() {
        let pair = LanguagePair::new();
        assert!(!pair.needs_translation());

        pair.target().set("en".to_string());
        assert!(pair.needs_translation());
    }

    #[test]
    fn test_credentials_bundle_serde_camel_case() {
        let json = r#"{
            "accessKeyId": "AKID",
            "secretAccessKey": "SECRET",
            "sessionToken": "TOKEN",
            "region": "us-west-2",
            "channelId": "room-7"
        }"#;
        let bundle: CredentialsBundle = serde_json::from_str(json).unwrap();
        assert_eq!(bundle.region, "us-west-2");
        assert_eq!(bundle.channel_id, "room-7");
    }
}
