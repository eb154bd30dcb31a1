//! Backend module for ChatRelay
//!
//! This module contains the LLM backend abstraction and the OpenAI
//! implementation of both operation families (stateless completion and
//! assistant threads).

pub mod base;
pub mod openai;

pub use base::{ChatBackend, ChatMessage, RunRecord, RunStatus};
pub use openai::OpenAiBackend;

use crate::config::BackendConfig;
use crate::error::Result;
use std::sync::Arc;

/// Create a backend instance from configuration
///
/// # Errors
///
/// Returns error if the backend cannot be initialized (e.g. missing
/// credential)
pub fn create_backend(config: &BackendConfig) -> Result<Arc<dyn ChatBackend>> {
    Ok(Arc::new(OpenAiBackend::new(config.clone())?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_backend_requires_credential() {
        let config = BackendConfig::default();
        assert!(create_backend(&config).is_err());
    }

    #[test]
    fn test_create_backend_with_credential() {
        let config = BackendConfig {
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        assert!(create_backend(&config).is_ok());
    }
}
