//! OpenAI backend implementation for ChatRelay
//!
//! This module implements the ChatBackend trait against the OpenAI HTTP
//! API: `/chat/completions` for the stateless family and `/threads` plus
//! `/runs` for the assistant family. The run-poll loop lives here so the
//! dispatch engine sees a single suspending operation with a bounded wait.

use crate::backend::{ChatBackend, ChatMessage, RunRecord, RunStatus};
use crate::config::BackendConfig;
use crate::error::{ChatRelayError, Result};

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default API base when none is configured
const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI API backend
///
/// Holds only an HTTP client and immutable configuration; conversational
/// continuity lives entirely in the session store. The `api_base` override
/// lets tests point the client at a mock server.
///
/// # Examples
///
/// ```no_run
/// use chatrelay::config::BackendConfig;
/// use chatrelay::backend::{OpenAiBackend, ChatBackend, ChatMessage};
///
/// # async fn example() -> chatrelay::error::Result<()> {
/// let config = BackendConfig {
///     api_key: Some("sk-test".to_string()),
///     ..Default::default()
/// };
/// let backend = OpenAiBackend::new(config)?;
/// let messages = vec![ChatMessage::user("Hello!")];
/// let reply = backend.complete_chat(&messages).await?;
/// # Ok(())
/// # }
/// ```
pub struct OpenAiBackend {
    client: Client,
    config: BackendConfig,
    api_base: String,
}

/// Request body for /chat/completions
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: usize,
}

/// Response body from /chat/completions
#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

/// One generated choice
#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

/// Generated message within a choice
#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Response body from POST /threads
#[derive(Debug, Deserialize)]
struct ThreadResponse {
    id: String,
}

/// Response body from POST /threads/{id}/messages
#[derive(Debug, Deserialize)]
struct ThreadMessageResponse {
    id: String,
}

/// Request body for POST /threads/{id}/messages
#[derive(Debug, Serialize)]
struct AppendMessageRequest<'a> {
    role: &'a str,
    content: &'a str,
}

/// Request body for POST /threads/{id}/runs
#[derive(Debug, Serialize)]
struct CreateRunRequest<'a> {
    assistant_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<&'a str>,
}

/// Run record as returned by the runs endpoints
#[derive(Debug, Deserialize)]
struct RunResponse {
    id: String,
    thread_id: String,
    status: RunStatus,
}

/// Response body from GET /threads/{id}/messages
#[derive(Debug, Deserialize)]
struct ListMessagesResponse {
    data: Vec<ListedMessage>,
}

/// One message in a thread listing
#[derive(Debug, Deserialize)]
struct ListedMessage {
    role: String,
    #[serde(default)]
    content: Vec<MessageContentPart>,
}

/// One content block of a thread message
#[derive(Debug, Deserialize)]
struct MessageContentPart {
    #[serde(rename = "type")]
    part_type: String,
    #[serde(default)]
    text: Option<MessageText>,
}

/// Text payload of a content block
#[derive(Debug, Deserialize)]
struct MessageText {
    value: String,
}

impl OpenAiBackend {
    /// Create a new OpenAI backend instance
    ///
    /// # Arguments
    ///
    /// * `config` - Backend configuration including credential and model
    ///
    /// # Errors
    ///
    /// Returns error if no API key is available or HTTP client
    /// initialization fails
    pub fn new(config: BackendConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            ChatRelayError::Config(
                "No backend API key configured (set CHATRELAY_API_KEY or OPENAI_API_KEY)"
                    .to_string(),
            )
        })?;

        let mut headers = reqwest::header::HeaderMap::new();
        let mut auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| ChatRelayError::Config(format!("Invalid API key: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);
        // The threads/runs endpoints are gated behind the assistants beta header.
        headers.insert(
            "OpenAI-Beta",
            reqwest::header::HeaderValue::from_static("assistants=v2"),
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent("chatrelay/0.2.0")
            .default_headers(headers)
            .build()
            .map_err(|e| {
                ChatRelayError::BackendUnavailable(format!("Failed to create HTTP client: {}", e))
            })?;

        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        tracing::info!(
            "Initialized OpenAI backend: base={}, model={}",
            api_base,
            config.model
        );

        Ok(Self {
            client,
            config,
            api_base,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// Map a transport-level send error to the backend taxonomy
    fn send_error(operation: &str, err: reqwest::Error) -> anyhow::Error {
        tracing::warn!("Backend {} request failed: {}", operation, err);
        ChatRelayError::BackendUnavailable(format!("{}: {}", operation, err)).into()
    }

    /// Map a non-success HTTP status to the backend taxonomy
    async fn status_error(operation: &str, response: Response) -> anyhow::Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::error!("Backend {} returned {}: {}", operation, status, body);

        if status == StatusCode::TOO_MANY_REQUESTS {
            ChatRelayError::RateLimited(format!("{}: {}", operation, body)).into()
        } else {
            ChatRelayError::BackendUnavailable(format!("{}: {} {}", operation, status, body))
                .into()
        }
    }

    /// Fetch the current state of a run
    async fn fetch_run(&self, thread_id: &str, run_id: &str) -> Result<RunResponse> {
        let url = self.url(&format!("/threads/{}/runs/{}", thread_id, run_id));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::send_error("run poll", e))?;

        if !response.status().is_success() {
            return Err(Self::status_error("run poll", response).await);
        }

        response.json::<RunResponse>().await.map_err(|e| {
            ChatRelayError::MalformedResponse(format!("run poll payload: {}", e)).into()
        })
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    async fn complete_chat(&self, messages: &[ChatMessage]) -> Result<Option<String>> {
        let request = CompletionRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_response_tokens,
        };

        tracing::debug!(
            "Requesting completion: model={}, messages={}",
            self.config.model,
            messages.len()
        );

        let response = self
            .client
            .post(self.url("/chat/completions"))
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::send_error("completion", e))?;

        if !response.status().is_success() {
            return Err(Self::status_error("completion", response).await);
        }

        let completion: CompletionResponse = response.json().await.map_err(|e| {
            ChatRelayError::MalformedResponse(format!("completion payload: {}", e))
        })?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| {
                ChatRelayError::MalformedResponse("completion returned no choices".to_string())
            })?
            .message
            .content;

        Ok(content)
    }

    async fn create_thread(&self) -> Result<String> {
        let response = self
            .client
            .post(self.url("/threads"))
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| Self::send_error("thread create", e))?;

        if !response.status().is_success() {
            return Err(Self::status_error("thread create", response).await);
        }

        let thread: ThreadResponse = response.json().await.map_err(|e| {
            ChatRelayError::MalformedResponse(format!("thread create payload: {}", e))
        })?;

        tracing::debug!("Created backend thread {}", thread.id);
        Ok(thread.id)
    }

    async fn append_message(&self, thread_id: &str, role: &str, content: &str) -> Result<String> {
        let request = AppendMessageRequest { role, content };

        let response = self
            .client
            .post(self.url(&format!("/threads/{}/messages", thread_id)))
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::send_error("message append", e))?;

        if !response.status().is_success() {
            return Err(Self::status_error("message append", response).await);
        }

        let message: ThreadMessageResponse = response.json().await.map_err(|e| {
            ChatRelayError::MalformedResponse(format!("message append payload: {}", e))
        })?;

        Ok(message.id)
    }

    async fn create_run(&self, thread_id: &str) -> Result<RunRecord> {
        let assistant_id = self.config.assistant_id.as_deref().ok_or_else(|| {
            ChatRelayError::Config("backend.assistant_id is not configured".to_string())
        })?;

        let request = CreateRunRequest {
            assistant_id,
            instructions: self.config.run_instructions.as_deref(),
        };

        let response = self
            .client
            .post(self.url(&format!("/threads/{}/runs", thread_id)))
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::send_error("run create", e))?;

        if !response.status().is_success() {
            return Err(Self::status_error("run create", response).await);
        }

        let mut run: RunResponse = response.json().await.map_err(|e| {
            ChatRelayError::MalformedResponse(format!("run create payload: {}", e))
        })?;

        let interval = Duration::from_millis(self.config.poll_interval_ms);
        let ceiling = Duration::from_secs(self.config.poll_timeout_secs);
        let started = tokio::time::Instant::now();

        // Poll until terminal state or ceiling; the transport layer must
        // eventually answer the waiting human, so never block past the ceiling.
        while !run.status.is_terminal() {
            if started.elapsed() >= ceiling {
                tracing::warn!(
                    "Run {} on thread {} still {} after {:?}, giving up",
                    run.id,
                    thread_id,
                    run.status,
                    started.elapsed()
                );
                return Err(ChatRelayError::RunTimedOut {
                    run_id: run.id,
                    waited_secs: self.config.poll_timeout_secs,
                }
                .into());
            }

            tokio::time::sleep(interval).await;
            run = self.fetch_run(thread_id, &run.id).await?;
        }

        tracing::debug!("Run {} reached terminal state {}", run.id, run.status);

        Ok(RunRecord {
            id: run.id,
            thread_id: run.thread_id,
            status: run.status,
        })
    }

    async fn extract_reply(&self, run: &RunRecord) -> Result<Option<String>> {
        let url = self.url(&format!(
            "/threads/{}/messages?order=desc&limit=10",
            run.thread_id
        ));

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::send_error("message list", e))?;

        if !response.status().is_success() {
            return Err(Self::status_error("message list", response).await);
        }

        let listing: ListMessagesResponse = response.json().await.map_err(|e| {
            ChatRelayError::MalformedResponse(format!("message list payload: {}", e))
        })?;

        let reply = listing.data.into_iter().find(|m| m.role == "assistant").map(|m| {
            m.content
                .into_iter()
                .filter(|part| part.part_type == "text")
                .filter_map(|part| part.text)
                .map(|t| t.value)
                .collect::<Vec<_>>()
                .join("\n")
        });

        Ok(reply.filter(|body| !body.is_empty()))
    }
}
