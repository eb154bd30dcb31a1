//! Conversation sessions and the session store
//!
//! A session holds the continuity state for one logical conversation:
//! which backend mode is active, the backend thread identifier (assistant
//! mode only), and activity timestamps. The store is the only mutable
//! shared state in the core; every mutation goes through its three
//! atomic operations.

use crate::error::{ChatRelayError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Context granularity for grouping inbound messages into sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextGranularity {
    /// One session per room: everyone in the room shares the conversation
    Room,
    /// One session per protocol thread within a room
    Thread,
}

impl ContextGranularity {
    /// Parse a granularity from its configuration string
    ///
    /// # Examples
    ///
    /// ```
    /// use chatrelay::session::ContextGranularity;
    ///
    /// let granularity = ContextGranularity::parse_str("room").unwrap();
    /// assert_eq!(granularity, ContextGranularity::Room);
    /// ```
    pub fn parse_str(s: &str) -> Result<Self> {
        match s {
            "room" => Ok(Self::Room),
            "thread" => Ok(Self::Thread),
            other => Err(ChatRelayError::Config(format!(
                "Unknown context granularity: {}",
                other
            ))
            .into()),
        }
    }
}

/// Backend mode of a session, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Each message is an independent completion call with no memory
    Stateless,
    /// Messages accumulate in one backend thread per session
    Assistant,
}

impl SessionMode {
    /// Parse a mode from its configuration string
    pub fn parse_str(s: &str) -> Result<Self> {
        match s {
            "chat" => Ok(Self::Stateless),
            "assistant" => Ok(Self::Assistant),
            other => Err(
                ChatRelayError::Config(format!("Unknown conversation mode: {}", other)).into(),
            ),
        }
    }
}

/// Deterministic identifier grouping inbound messages into one session
///
/// Same inputs always yield the same key. The configured granularity alone
/// decides the shape: room granularity keys on the room id, thread
/// granularity keys on the protocol thread root, with the sender standing
/// in for unthreaded messages so a key is always derivable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationKey(String);

impl ConversationKey {
    /// Derive the key for an inbound message
    ///
    /// # Arguments
    ///
    /// * `room_id` - Room the message arrived in
    /// * `sender` - Sender identity
    /// * `thread_root` - Protocol thread root, if the message is threaded
    /// * `granularity` - Configured context granularity
    ///
    /// # Examples
    ///
    /// ```
    /// use chatrelay::session::{ContextGranularity, ConversationKey};
    ///
    /// let key = ConversationKey::derive("!r1", "@alice", None, ContextGranularity::Room);
    /// assert_eq!(key.as_str(), "room:!r1");
    /// ```
    pub fn derive(
        room_id: &str,
        sender: &str,
        thread_root: Option<&str>,
        granularity: ContextGranularity,
    ) -> Self {
        match granularity {
            ContextGranularity::Room => Self(format!("room:{}", room_id)),
            ContextGranularity::Thread => {
                let root = thread_root.unwrap_or(sender);
                Self(format!("thread:{}:{}", room_id, root))
            }
        }
    }

    /// The key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Continuity state for one logical conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Identity of this session
    pub key: ConversationKey,
    /// Backend mode, fixed at creation
    pub mode: SessionMode,
    /// Backend thread identifier; assigned at most once, assistant mode only
    pub backend_thread_id: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last successful dispatch time
    pub last_active_at: DateTime<Utc>,
}

impl Session {
    fn new(key: ConversationKey, mode: SessionMode) -> Self {
        let now = Utc::now();
        Self {
            key,
            mode,
            backend_thread_id: None,
            created_at: now,
            last_active_at: now,
        }
    }
}

/// Pluggable persistence behind the session store
///
/// The contract is an opaque key→JSON blob; the store performs
/// write-through on mutation and reconstruction on demand. Implementations
/// live in the `storage` module.
pub trait SessionBackend: Send + Sync {
    /// Load the session stored under `key`, if any
    fn load(&self, key: &str) -> Result<Option<Session>>;

    /// Store `session` under its key, replacing any previous value
    fn store(&self, session: &Session) -> Result<()>;
}

/// Maps conversation keys to sessions
///
/// The in-memory map is authoritative for the process lifetime; the
/// backend provides durability across restarts. All three operations are
/// atomic with respect to concurrent callers on the same key.
pub struct SessionStore {
    sessions: Mutex<HashMap<ConversationKey, Session>>,
    backend: Arc<dyn SessionBackend>,
}

impl SessionStore {
    /// Create a store over the given persistence backend
    pub fn new(backend: Arc<dyn SessionBackend>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            backend,
        }
    }

    /// Resolve the session for `key`, creating it if absent
    ///
    /// Idempotent: repeated calls with the same key return the same
    /// session. A session found in the persistence backend is
    /// reconstructed instead of recreated, so assistant threads survive
    /// restarts.
    ///
    /// # Errors
    ///
    /// Returns error if the persistence backend fails
    pub fn get_or_create(&self, key: &ConversationKey, mode: SessionMode) -> Result<Session> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| ChatRelayError::Storage("session map poisoned".to_string()))?;

        if let Some(session) = sessions.get(key) {
            return Ok(session.clone());
        }

        let session = match self.backend.load(key.as_str())? {
            Some(restored) => {
                tracing::debug!("Restored session {} from storage", key);
                restored
            }
            None => {
                tracing::info!("Creating session {} (mode {:?})", key, mode);
                let created = Session::new(key.clone(), mode);
                self.backend.store(&created)?;
                created
            }
        };

        sessions.insert(key.clone(), session.clone());
        Ok(session)
    }

    /// Attach a backend thread id to the session for `key`
    ///
    /// First-use latch: if a thread id is already attached, that id is
    /// returned unchanged and the new one is discarded. Exactly one caller
    /// wins under concurrent first calls.
    ///
    /// # Errors
    ///
    /// Returns error if the session does not exist, is stateless, or the
    /// persistence backend fails
    pub fn attach_thread_id(&self, key: &ConversationKey, thread_id: &str) -> Result<String> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| ChatRelayError::Storage("session map poisoned".to_string()))?;

        let session = sessions.get_mut(key).ok_or_else(|| {
            ChatRelayError::Storage(format!("no session for key {}", key))
        })?;

        if session.mode == SessionMode::Stateless {
            return Err(ChatRelayError::Storage(format!(
                "session {} is stateless and cannot hold a backend thread",
                key
            ))
            .into());
        }

        if let Some(existing) = &session.backend_thread_id {
            tracing::debug!(
                "Session {} already bound to thread {}, keeping it",
                key,
                existing
            );
            return Ok(existing.clone());
        }

        session.backend_thread_id = Some(thread_id.to_string());
        self.backend.store(session)?;
        tracing::info!("Session {} bound to backend thread {}", key, thread_id);
        Ok(thread_id.to_string())
    }

    /// Update the last-activity timestamp for `key`
    ///
    /// Best-effort: a persistence failure is logged but does not fail a
    /// dispatch that already produced a reply.
    pub fn touch(&self, key: &ConversationKey) {
        let mut sessions = match self.sessions.lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!("Session map poisoned while touching {}", key);
                return;
            }
        };

        if let Some(session) = sessions.get_mut(key) {
            session.last_active_at = Utc::now();
            if let Err(e) = self.backend.store(session) {
                tracing::warn!("Failed to persist activity for {}: {}", key, e);
            }
        }
    }

    /// Number of sessions currently resident in memory
    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Whether no sessions are resident
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
