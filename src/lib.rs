//! ChatRelay - chat-protocol bot library
//!
//! This library relays messages from a federated chat protocol into a
//! hosted LLM backend and returns generated replies to the originating
//! conversation. It serves a single deployed bot identity.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `dispatch`: The conversation session and dispatch engine
//! - `session`: Conversation keys, session state, and the session store
//! - `backend`: LLM backend abstraction and the OpenAI implementation
//! - `storage`: Pluggable session persistence (in-memory, sqlite)
//! - `transport`: The chat-transport boundary (inbound events, delivery)
//! - `config`: Configuration loading and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//! - `console`: Local console room for exercising the bot
//!
//! # Example
//!
//! ```no_run
//! use chatrelay::{Config, Dispatcher, SessionStore};
//! use chatrelay::backend::create_backend;
//! use chatrelay::storage::MemoryBackend;
//! use chatrelay::transport::InboundMessage;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml")?;
//!     config.validate()?;
//!
//!     let backend = create_backend(&config.backend)?;
//!     let store = SessionStore::new(Arc::new(MemoryBackend::new()));
//!     let dispatcher = Dispatcher::new(backend, store, &config)?;
//!
//!     let event = InboundMessage::text("!room:example.org", "@alice:example.org", "Hello!");
//!     let result = dispatcher.handle(&event).await;
//!     println!("{:?}", result);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod cli;
pub mod config;
pub mod console;
pub mod dispatch;
pub mod error;
pub mod session;
pub mod storage;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use dispatch::{Dispatcher, FailureKind, OutboundResult};
pub use error::{ChatRelayError, Result};
pub use session::{ContextGranularity, ConversationKey, Session, SessionMode, SessionStore};
pub use transport::{DeliverySink, InboundMessage, MessageContent};
