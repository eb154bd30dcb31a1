//! Shared helpers for integration tests: a scripted backend that records
//! every call, a recording delivery sink, and config builders.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chatrelay::backend::{ChatBackend, ChatMessage, RunRecord, RunStatus};
use chatrelay::error::{ChatRelayError, Result};
use chatrelay::storage::MemoryBackend;
use chatrelay::transport::DeliverySink;
use chatrelay::{Config, Dispatcher, SessionStore};

/// One recorded backend invocation
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Complete { messages: Vec<(String, String)> },
    CreateThread,
    Append {
        thread_id: String,
        role: String,
        content: String,
    },
    CreateRun { thread_id: String },
    ExtractReply { thread_id: String },
}

/// Scripted completion behavior
#[derive(Debug, Clone)]
pub enum CompletionBehavior {
    Reply(String),
    Empty,
    Unavailable,
    RateLimited,
}

/// Scripted assistant-run behavior
#[derive(Debug, Clone)]
pub enum RunBehavior {
    CompleteWith(String),
    TimeOut,
    FailTerminal,
}

/// Backend stub that follows a fixed script and records every call
pub struct ScriptedBackend {
    pub calls: Mutex<Vec<BackendCall>>,
    completion: CompletionBehavior,
    run: RunBehavior,
    thread_counter: AtomicUsize,
    message_counter: AtomicUsize,
}

impl ScriptedBackend {
    pub fn replying(reply: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(
            CompletionBehavior::Reply(reply.into()),
            RunBehavior::CompleteWith("unused".to_string()),
        ))
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self::new(
            CompletionBehavior::Empty,
            RunBehavior::CompleteWith("unused".to_string()),
        ))
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self::new(
            CompletionBehavior::Unavailable,
            RunBehavior::CompleteWith("unused".to_string()),
        ))
    }

    pub fn assistant_replying(reply: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(
            CompletionBehavior::Empty,
            RunBehavior::CompleteWith(reply.into()),
        ))
    }

    pub fn run_times_out() -> Arc<Self> {
        Arc::new(Self::new(CompletionBehavior::Empty, RunBehavior::TimeOut))
    }

    pub fn run_fails() -> Arc<Self> {
        Arc::new(Self::new(
            CompletionBehavior::Empty,
            RunBehavior::FailTerminal,
        ))
    }

    fn new(completion: CompletionBehavior, run: RunBehavior) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            completion,
            run,
            thread_counter: AtomicUsize::new(0),
            message_counter: AtomicUsize::new(0),
        }
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Thread ids handed out so far
    pub fn threads_created(&self) -> usize {
        self.thread_counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete_chat(&self, messages: &[ChatMessage]) -> Result<Option<String>> {
        self.record(BackendCall::Complete {
            messages: messages
                .iter()
                .map(|m| (m.role.clone(), m.content.clone()))
                .collect(),
        });

        match &self.completion {
            CompletionBehavior::Reply(reply) => Ok(Some(reply.clone())),
            CompletionBehavior::Empty => Ok(None),
            CompletionBehavior::Unavailable => {
                Err(ChatRelayError::BackendUnavailable("scripted outage".to_string()).into())
            }
            CompletionBehavior::RateLimited => {
                Err(ChatRelayError::RateLimited("scripted throttle".to_string()).into())
            }
        }
    }

    async fn create_thread(&self) -> Result<String> {
        self.record(BackendCall::CreateThread);
        let n = self.thread_counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("thread_{}", n))
    }

    async fn append_message(&self, thread_id: &str, role: &str, content: &str) -> Result<String> {
        self.record(BackendCall::Append {
            thread_id: thread_id.to_string(),
            role: role.to_string(),
            content: content.to_string(),
        });
        let n = self.message_counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("msg_{}", n))
    }

    async fn create_run(&self, thread_id: &str) -> Result<RunRecord> {
        self.record(BackendCall::CreateRun {
            thread_id: thread_id.to_string(),
        });

        match &self.run {
            RunBehavior::CompleteWith(_) => Ok(RunRecord {
                id: "run_scripted".to_string(),
                thread_id: thread_id.to_string(),
                status: RunStatus::Completed,
            }),
            RunBehavior::TimeOut => Err(ChatRelayError::RunTimedOut {
                run_id: "run_scripted".to_string(),
                waited_secs: 2,
            }
            .into()),
            RunBehavior::FailTerminal => Ok(RunRecord {
                id: "run_scripted".to_string(),
                thread_id: thread_id.to_string(),
                status: RunStatus::Failed,
            }),
        }
    }

    async fn extract_reply(&self, run: &RunRecord) -> Result<Option<String>> {
        self.record(BackendCall::ExtractReply {
            thread_id: run.thread_id.clone(),
        });

        match &self.run {
            RunBehavior::CompleteWith(reply) => Ok(Some(reply.clone())),
            _ => Ok(None),
        }
    }
}

/// Delivery sink that records what would have been sent
#[derive(Default)]
pub struct RecordingSink {
    pub texts: Mutex<Vec<(String, String)>>,
    pub notices: Mutex<Vec<(String, String)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_texts(&self) -> Vec<(String, String)> {
        self.texts.lock().unwrap().clone()
    }

    pub fn sent_notices(&self) -> Vec<(String, String)> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn send_text(&self, room_id: &str, body: &str) -> Result<()> {
        self.texts
            .lock()
            .unwrap()
            .push((room_id.to_string(), body.to_string()));
        Ok(())
    }

    async fn send_notice(&self, room_id: &str, body: &str) -> Result<()> {
        self.notices
            .lock()
            .unwrap()
            .push((room_id.to_string(), body.to_string()));
        Ok(())
    }
}

/// Bot identity used across the integration tests
pub const BOT_USER: &str = "@relay:example.org";

/// Config for stateless chat mode
pub fn chat_config() -> Config {
    let mut config = Config::default();
    config.bot.user_id = BOT_USER.to_string();
    config.bot.mode = "chat".to_string();
    config
}

/// Config for assistant mode
pub fn assistant_config() -> Config {
    let mut config = chat_config();
    config.bot.mode = "assistant".to_string();
    config.backend.assistant_id = Some("asst_test".to_string());
    config
}

/// Dispatcher over an in-memory session store
pub fn dispatcher_with(backend: Arc<ScriptedBackend>, config: &Config) -> Dispatcher {
    config.validate().expect("test config must be valid");
    let store = SessionStore::new(Arc::new(MemoryBackend::new()));
    Dispatcher::new(backend, store, config).expect("dispatcher construction")
}
