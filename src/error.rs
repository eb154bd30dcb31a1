//! Error types for ChatRelay
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for ChatRelay operations
///
/// This enum encompasses all possible errors that can occur during
/// message dispatch, backend interactions, session storage, and
/// configuration loading.
#[derive(Error, Debug)]
pub enum ChatRelayError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Chat-transport boundary errors (delivery, malformed events)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Network or authentication failure reaching the LLM backend
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Backend throttled the request (HTTP 429). Not retried automatically.
    #[error("Backend rate limited: {0}")]
    RateLimited(String),

    /// Backend payload was missing an expected field
    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    /// Assistant run did not reach a terminal state within the polling ceiling
    #[error("Run timed out after {waited_secs}s (run {run_id})")]
    RunTimedOut {
        /// Identifier of the run that never became terminal
        run_id: String,
        /// Seconds waited before giving up
        waited_secs: u64,
    },

    /// Backend returned no extractable content
    #[error("Backend returned an empty response")]
    EmptyResponse,

    /// Session storage errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for ChatRelay operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
