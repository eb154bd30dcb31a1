//! Base backend trait and common types for ChatRelay
//!
//! This module defines the ChatBackend trait that backend clients must
//! implement, along with the message and run types shared by both
//! operation families (stateless completion and assistant threads).

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Message structure for backend conversations
///
/// Represents one entry in the ordered message list sent to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender (user, assistant, system)
    pub role: String,
    /// Content of the message
    pub content: String,
}

impl ChatMessage {
    /// Creates a new user message
    ///
    /// # Examples
    ///
    /// ```
    /// use chatrelay::backend::ChatMessage;
    ///
    /// let msg = ChatMessage::user("Hello!");
    /// assert_eq!(msg.role, "user");
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Creates a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    /// Creates a new system message
    ///
    /// # Examples
    ///
    /// ```
    /// use chatrelay::backend::ChatMessage;
    ///
    /// let msg = ChatMessage::system("You are a helpful assistant");
    /// assert_eq!(msg.role, "system");
    /// ```
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// Terminal and in-flight states of an assistant run
///
/// Mirrors the provider's run lifecycle. Only the four terminal states
/// end a poll loop; everything else means the run is still progressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
    Expired,
}

impl RunStatus {
    /// Whether this status ends a poll loop
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Expired
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::RequiresAction => "requires_action",
            Self::Cancelling => "cancelling",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

/// Terminal record of one assistant run
///
/// Returned by `create_run` once the run has reached a terminal state;
/// carries enough context for `extract_reply` to locate the result.
#[derive(Debug, Clone)]
pub struct RunRecord {
    /// Run identifier assigned by the backend
    pub id: String,
    /// Thread the run executed against
    pub thread_id: String,
    /// Terminal status the run reached
    pub status: RunStatus,
}

/// Backend trait for LLM providers
///
/// Exposes the two remote operation families the dispatch engine relies
/// on: stateless chat completion, and the stateful assistant-thread
/// sequence (create thread, append message, run to terminal state,
/// extract the reply). Implementations hold no conversational state;
/// all continuity lives in the session store.
///
/// # Examples
///
/// ```no_run
/// use chatrelay::backend::{ChatBackend, ChatMessage, RunRecord, RunStatus};
/// use chatrelay::error::Result;
/// use async_trait::async_trait;
///
/// struct MyBackend;
///
/// #[async_trait]
/// impl ChatBackend for MyBackend {
///     async fn complete_chat(&self, _messages: &[ChatMessage]) -> Result<Option<String>> {
///         Ok(Some("Response".to_string()))
///     }
///
///     async fn create_thread(&self) -> Result<String> {
///         Ok("thread_1".to_string())
///     }
///
///     async fn append_message(&self, _thread_id: &str, _role: &str, _content: &str) -> Result<String> {
///         Ok("msg_1".to_string())
///     }
///
///     async fn create_run(&self, thread_id: &str) -> Result<RunRecord> {
///         Ok(RunRecord {
///             id: "run_1".to_string(),
///             thread_id: thread_id.to_string(),
///             status: RunStatus::Completed,
///         })
///     }
///
///     async fn extract_reply(&self, _run: &RunRecord) -> Result<Option<String>> {
///         Ok(Some("Response".to_string()))
///     }
/// }
/// ```
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Completes a bounded message list and returns the generated content
    ///
    /// Returns `None` when the provider produced a choice with no content.
    ///
    /// # Errors
    ///
    /// `BackendUnavailable` on network/auth failure, `RateLimited` on
    /// throttling, `MalformedResponse` if the payload lacks expected fields
    async fn complete_chat(&self, messages: &[ChatMessage]) -> Result<Option<String>>;

    /// Creates a persistent backend thread and returns its identifier
    async fn create_thread(&self) -> Result<String>;

    /// Appends a message to a thread and returns the message identifier
    async fn append_message(&self, thread_id: &str, role: &str, content: &str) -> Result<String>;

    /// Triggers a run and polls internally until it reaches a terminal state
    ///
    /// # Errors
    ///
    /// `RunTimedOut` if the run does not become terminal within the
    /// configured ceiling; the caller is never left blocked indefinitely
    async fn create_run(&self, thread_id: &str) -> Result<RunRecord>;

    /// Retrieves the assistant reply produced by a terminal run
    ///
    /// Returns `None` when the run left no assistant message behind.
    async fn extract_reply(&self, run: &RunRecord) -> Result<Option<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_user() {
        let msg = ChatMessage::user("Hello");
        assert_eq!(msg.role, "user");
        assert_eq!(msg.content, "Hello");
    }

    #[test]
    fn test_message_assistant() {
        let msg = ChatMessage::assistant("Hi there");
        assert_eq!(msg.role, "assistant");
        assert_eq!(msg.content, "Hi there");
    }

    #[test]
    fn test_message_system() {
        let msg = ChatMessage::system("System prompt");
        assert_eq!(msg.role, "system");
        assert_eq!(msg.content, "System prompt");
    }

    #[test]
    fn test_message_serialization() {
        let msg = ChatMessage::user("Test");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"user\""));
        assert!(json.contains("\"content\":\"Test\""));
    }

    #[test]
    fn test_run_status_terminal() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(RunStatus::Expired.is_terminal());
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::InProgress.is_terminal());
        assert!(!RunStatus::RequiresAction.is_terminal());
    }

    #[test]
    fn test_run_status_deserialization() {
        let status: RunStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(status, RunStatus::InProgress);

        let status: RunStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(status, RunStatus::Completed);
    }

    #[test]
    fn test_run_status_display() {
        assert_eq!(RunStatus::InProgress.to_string(), "in_progress");
        assert_eq!(RunStatus::Completed.to_string(), "completed");
        assert_eq!(RunStatus::Expired.to_string(), "expired");
    }
}
