//! Configuration management for ChatRelay
//!
//! This module handles loading, parsing, and validating configuration
//! from a YAML file with environment variable overrides. Configuration
//! is loaded once at startup and immutable thereafter; inconsistent
//! settings are rejected before the bot connects to anything.

use crate::error::{ChatRelayError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for ChatRelay
///
/// This structure holds all configuration needed for the bot, including
/// backend settings, bot identity and conversation behavior, and session
/// storage settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// LLM backend configuration
    #[serde(default)]
    pub backend: BackendConfig,

    /// Bot identity and conversation behavior
    #[serde(default)]
    pub bot: BotConfig,

    /// Session storage configuration
    #[serde(default)]
    pub session: SessionConfig,
}

/// LLM backend configuration
///
/// Settings for both backend operation families: stateless chat
/// completion and stateful assistant threads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Optional API base URL (useful for tests and local mocks)
    ///
    /// When set, this base is used to build all backend endpoints
    /// (e.g. `/chat/completions`, `/threads`), which allows tests to
    /// point the client at a mock server.
    #[serde(default)]
    pub api_base: Option<String>,

    /// Bearer credential for the backend. Usually left unset in the file
    /// and supplied via `CHATRELAY_API_KEY` or `OPENAI_API_KEY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model to use for chat completions
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature for completions
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens the backend may generate per reply
    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: usize,

    /// Maximum estimated tokens accepted in a single inbound prompt
    #[serde(default = "default_max_prompt_tokens")]
    pub max_prompt_tokens: usize,

    /// Assistant identifier, required when `bot.mode` is "assistant"
    #[serde(default)]
    pub assistant_id: Option<String>,

    /// Optional extra instructions passed when triggering an assistant run
    #[serde(default)]
    pub run_instructions: Option<String>,

    /// Interval between run status polls (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Ceiling on total run-poll wait (seconds)
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.8
}

fn default_max_response_tokens() -> usize {
    1024
}

fn default_max_prompt_tokens() -> usize {
    3000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_poll_timeout_secs() -> u64 {
    60
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_base: None,
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_response_tokens: default_max_response_tokens(),
            max_prompt_tokens: default_max_prompt_tokens(),
            assistant_id: None,
            run_instructions: None,
            poll_interval_ms: default_poll_interval_ms(),
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}

/// Bot identity and conversation behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// The bot's own user identifier; inbound messages from this sender
    /// are suppressed to prevent feedback loops
    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// Conversation mode: "chat" (stateless completion) or "assistant"
    /// (stateful backend thread). Fixed for the process lifetime.
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Context granularity: "room" (one session per room) or "thread"
    /// (one session per protocol thread)
    #[serde(default = "default_context")]
    pub context: String,

    /// System preamble prepended to every stateless completion
    #[serde(default = "default_system_preamble")]
    pub system_preamble: String,
}

fn default_user_id() -> String {
    "@chatrelay:localhost".to_string()
}

fn default_mode() -> String {
    "chat".to_string()
}

fn default_context() -> String {
    "room".to_string()
}

fn default_system_preamble() -> String {
    "You are a helpful assistant responding in a chat room. Keep answers concise.".to_string()
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            mode: default_mode(),
            context: default_context(),
            system_preamble: default_system_preamble(),
        }
    }
}

/// Session storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Persist sessions to disk so assistant threads survive restarts
    #[serde(default)]
    pub persist: bool,

    /// Optional database path override. Falls back to the
    /// `CHATRELAY_SESSION_DB` environment variable, then the platform
    /// data directory.
    #[serde(default)]
    pub db_path: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            persist: false,
            db_path: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// A missing file yields the default configuration so the bot can run
    /// from environment variables alone. After parsing, environment
    /// overrides are applied (currently the backend API key).
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML configuration file
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let mut config: Config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            serde_yaml::from_str(&contents).map_err(ChatRelayError::Yaml)?
        } else {
            tracing::warn!(
                "Configuration file {} not found, using defaults",
                path.display()
            );
            Config::default()
        };

        config.apply_env();
        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// `CHATRELAY_API_KEY` takes precedence, then `OPENAI_API_KEY`, then
    /// whatever the file supplied.
    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("CHATRELAY_API_KEY") {
            self.backend.api_key = Some(key);
        } else if self.backend.api_key.is_none() {
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                self.backend.api_key = Some(key);
            }
        }
    }

    /// Validate the configuration
    ///
    /// Inconsistent settings are fatal at startup: the process refuses to
    /// start rather than running in an inconsistent mode.
    ///
    /// # Errors
    ///
    /// Returns `ChatRelayError::Config` describing the first problem found
    pub fn validate(&self) -> Result<()> {
        match self.bot.mode.as_str() {
            "chat" | "assistant" => {}
            other => {
                return Err(ChatRelayError::Config(format!(
                    "Unknown conversation mode: {} (expected \"chat\" or \"assistant\")",
                    other
                ))
                .into());
            }
        }

        match self.bot.context.as_str() {
            "room" | "thread" => {}
            other => {
                return Err(ChatRelayError::Config(format!(
                    "Unknown context granularity: {} (expected \"room\" or \"thread\")",
                    other
                ))
                .into());
            }
        }

        if self.bot.mode == "assistant" && self.backend.assistant_id.is_none() {
            return Err(ChatRelayError::Config(
                "Assistant mode requires backend.assistant_id".to_string(),
            )
            .into());
        }

        if self.bot.user_id.trim().is_empty() {
            return Err(ChatRelayError::Config("bot.user_id must not be empty".to_string()).into());
        }

        if let Some(base) = &self.backend.api_base {
            url::Url::parse(base).map_err(|e| {
                ChatRelayError::Config(format!("Invalid backend.api_base {}: {}", base, e))
            })?;
        }

        if self.backend.model.trim().is_empty() {
            return Err(
                ChatRelayError::Config("backend.model must not be empty".to_string()).into(),
            );
        }

        if !(0.0..=2.0).contains(&self.backend.temperature) {
            return Err(ChatRelayError::Config(format!(
                "backend.temperature must be within 0.0..=2.0, got {}",
                self.backend.temperature
            ))
            .into());
        }

        if self.backend.poll_interval_ms == 0 {
            return Err(ChatRelayError::Config(
                "backend.poll_interval_ms must be greater than zero".to_string(),
            )
            .into());
        }

        if self.backend.poll_timeout_secs * 1000 < self.backend.poll_interval_ms {
            return Err(ChatRelayError::Config(
                "backend.poll_timeout_secs must cover at least one poll interval".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.bot.mode, "chat");
        assert_eq!(config.bot.context, "room");
        assert_eq!(config.backend.model, "gpt-4o-mini");
        assert_eq!(config.backend.poll_interval_ms, 1000);
        assert_eq!(config.backend.poll_timeout_secs, 60);
        assert!(!config.session.persist);
    }

    #[test]
    fn test_invalid_mode_rejected() {
        let mut config = Config::default();
        config.bot.mode = "prophecy".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Unknown conversation mode"));
    }

    #[test]
    fn test_invalid_context_rejected() {
        let mut config = Config::default();
        config.bot.context = "galaxy".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_assistant_mode_requires_assistant_id() {
        let mut config = Config::default();
        config.bot.mode = "assistant".to_string();
        assert!(config.validate().is_err());

        config.backend.assistant_id = Some("asst_123".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_temperature_bounds() {
        let mut config = Config::default();
        config.backend.temperature = 2.5;
        assert!(config.validate().is_err());

        config.backend.temperature = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let mut config = Config::default();
        config.backend.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeout_must_cover_interval() {
        let mut config = Config::default();
        config.backend.poll_interval_ms = 5000;
        config.backend.poll_timeout_secs = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_user_id_rejected() {
        let mut config = Config::default();
        config.bot.user_id = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_api_base_rejected() {
        let mut config = Config::default();
        config.backend.api_base = Some("not a url".to_string());
        assert!(config.validate().is_err());

        config.backend.api_base = Some("http://localhost:11434/v1".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
backend:
  model: gpt-4o
  temperature: 0.5
bot:
  user_id: "@relay:example.org"
  mode: chat
  context: thread
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.backend.model, "gpt-4o");
        assert_eq!(config.bot.context, "thread");
        assert_eq!(config.backend.max_response_tokens, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load("/nonexistent/chatrelay.yaml").unwrap();
        assert_eq!(config.bot.mode, "chat");
    }
}
