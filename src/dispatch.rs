//! The dispatch engine
//!
//! One entry point per inbound message: resolve or create the session
//! for its conversation key, run the configured backend operation
//! sequence, and produce exactly one outbound result. Messages for the
//! same key are serialized in arrival order; distinct keys interleave
//! freely. No backend fault escapes this module unhandled.

use crate::backend::{ChatBackend, ChatMessage, RunStatus};
use crate::config::Config;
use crate::error::{ChatRelayError, Result};
use crate::session::{ContextGranularity, ConversationKey, SessionMode, SessionStore};
use crate::transport::InboundMessage;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// User-visible classification of a failed dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Could not reach the backend (network/auth)
    BackendUnavailable,
    /// Backend throttled the request
    RateLimited,
    /// Assistant run exceeded the polling ceiling
    RunTimedOut,
    /// Backend produced no usable content
    EmptyResponse,
    /// Any other backend or session fault
    Backend,
}

impl FailureKind {
    /// The short, non-technical notice sent back to the room
    ///
    /// The conversation never receives silence on failure; silence would
    /// be indistinguishable from the bot being dead.
    pub fn user_notice(&self) -> &'static str {
        match self {
            Self::BackendUnavailable | Self::RateLimited | Self::Backend => {
                "Sorry, I ran into a problem talking to my language model. Please try again in a moment."
            }
            Self::RunTimedOut => {
                "Sorry, that request is taking longer than expected. Please try again."
            }
            Self::EmptyResponse => "Sorry, I couldn't generate a response to that.",
        }
    }
}

/// Outcome of dispatching one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundResult {
    /// A generated reply to send as a text message
    Text(String),
    /// No reply warranted (own echo, non-text event)
    Suppressed,
    /// A failure to surface as a notice
    Failure {
        /// Classification driving the user-visible notice
        kind: FailureKind,
        /// Underlying detail, for logs only
        detail: String,
    },
}

/// Classify an error from the dispatch path
///
/// `MalformedResponse` is folded into `EmptyResponse` for user messaging;
/// anything outside the taxonomy becomes the generic backend failure.
fn classify(err: &anyhow::Error) -> FailureKind {
    match err.downcast_ref::<ChatRelayError>() {
        Some(ChatRelayError::BackendUnavailable(_)) => FailureKind::BackendUnavailable,
        Some(ChatRelayError::RateLimited(_)) => FailureKind::RateLimited,
        Some(ChatRelayError::RunTimedOut { .. }) => FailureKind::RunTimedOut,
        Some(ChatRelayError::EmptyResponse) | Some(ChatRelayError::MalformedResponse(_)) => {
            FailureKind::EmptyResponse
        }
        _ => FailureKind::Backend,
    }
}

/// Rough token estimate for a prompt body (characters / 4)
fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// The conversation session and dispatch engine
///
/// Constructed once at startup with its collaborators injected; the
/// transport layer calls `handle` once per inbound event.
pub struct Dispatcher {
    backend: Arc<dyn ChatBackend>,
    sessions: SessionStore,
    mode: SessionMode,
    granularity: ContextGranularity,
    bot_user_id: String,
    system_preamble: String,
    max_prompt_tokens: usize,
    /// Per-key mutex map serializing dispatch for the same conversation
    dispatch_locks: Mutex<HashMap<ConversationKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl Dispatcher {
    /// Create a dispatcher from validated configuration
    ///
    /// # Arguments
    ///
    /// * `backend` - Backend client adapter
    /// * `sessions` - Session store (sole holder after construction)
    /// * `config` - Validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if the mode or granularity strings are invalid
    /// (already rejected by `Config::validate`, but this constructor does
    /// not assume a validated input)
    pub fn new(backend: Arc<dyn ChatBackend>, sessions: SessionStore, config: &Config) -> Result<Self> {
        let mode = SessionMode::parse_str(&config.bot.mode)?;
        let granularity = ContextGranularity::parse_str(&config.bot.context)?;

        Ok(Self {
            backend,
            sessions,
            mode,
            granularity,
            bot_user_id: config.bot.user_id.clone(),
            system_preamble: config.bot.system_preamble.clone(),
            max_prompt_tokens: config.backend.max_prompt_tokens,
            dispatch_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Dispatch one inbound event to the backend
    ///
    /// Invoked once per inbound chat event. Events from the bot's own
    /// identity and non-text events are suppressed. Everything else
    /// produces either a generated reply or a classified failure; errors
    /// never propagate to the caller.
    pub async fn handle(&self, event: &InboundMessage) -> OutboundResult {
        if event.sender == self.bot_user_id {
            tracing::trace!("Suppressing own message in {}", event.room_id);
            return OutboundResult::Suppressed;
        }

        if !event.is_text() {
            tracing::trace!(
                "Ignoring {} event from {} in {}",
                event.content.msgtype,
                event.sender,
                event.room_id
            );
            return OutboundResult::Suppressed;
        }

        let key = ConversationKey::derive(
            &event.room_id,
            &event.sender,
            event.thread_root.as_deref(),
            self.granularity,
        );

        // Serialize per key: session creation, thread-id latching, and
        // assistant append order all depend on arrival order.
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        match self.dispatch(&key, &event.content.body).await {
            Ok(reply) => {
                self.sessions.touch(&key);
                OutboundResult::Text(reply)
            }
            Err(err) => {
                let kind = classify(&err);
                tracing::error!(
                    "Dispatch failed for {} (sender {}): {:?}: {:#}",
                    key,
                    event.sender,
                    kind,
                    err
                );
                OutboundResult::Failure {
                    kind,
                    detail: format!("{:#}", err),
                }
            }
        }
    }

    /// Run the configured backend operation sequence for one message
    async fn dispatch(&self, key: &ConversationKey, body: &str) -> Result<String> {
        let session = self.sessions.get_or_create(key, self.mode)?;
        let body = self.clamp_prompt(body);

        let reply = match session.mode {
            SessionMode::Stateless => {
                let messages = [
                    ChatMessage::system(self.system_preamble.as_str()),
                    ChatMessage::user(body),
                ];
                self.backend.complete_chat(&messages).await?
            }
            SessionMode::Assistant => {
                let thread_id = match session.backend_thread_id {
                    Some(id) => id,
                    None => {
                        // First-use latch: the store keeps whichever thread
                        // was attached first, so a lost race is harmless.
                        let created = self.backend.create_thread().await?;
                        self.sessions.attach_thread_id(key, &created)?
                    }
                };

                self.backend.append_message(&thread_id, "user", &body).await?;
                let run = self.backend.create_run(&thread_id).await?;

                if run.status != RunStatus::Completed {
                    anyhow::bail!("assistant run {} ended in state {}", run.id, run.status);
                }

                self.backend.extract_reply(&run).await?
            }
        };

        match reply {
            Some(content) if !content.trim().is_empty() => Ok(content),
            _ => Err(ChatRelayError::EmptyResponse.into()),
        }
    }

    /// Bound the inbound prompt to the configured token budget
    fn clamp_prompt<'a>(&self, body: &'a str) -> std::borrow::Cow<'a, str> {
        if estimate_tokens(body) <= self.max_prompt_tokens {
            return std::borrow::Cow::Borrowed(body);
        }

        let limit = self.max_prompt_tokens * 4;
        let cut = body
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|&i| i <= limit)
            .last()
            .unwrap_or(0);

        tracing::warn!(
            "Truncating prompt from ~{} to {} tokens",
            estimate_tokens(body),
            self.max_prompt_tokens
        );
        std::borrow::Cow::Owned(body[..cut].to_string())
    }

    /// Get or create the per-key dispatch lock
    ///
    /// Locks whose Arc is held only by the map (no dispatch in flight or
    /// waiting) are pruned on each call.
    fn lock_for(&self, key: &ConversationKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.dispatch_locks.lock().unwrap();
        locks.retain(|_, arc| Arc::strong_count(arc) > 1);
        locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Read access to the session store (for status display and tests)
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}
