//! Local console room
//!
//! A readline-based loop that feeds typed lines into the dispatch engine
//! as inbound room events and prints whatever comes back. This exercises
//! the whole pipeline (session store, backend calls, failure notices)
//! without a live chat transport.

use crate::backend::create_backend;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::session::SessionStore;
use crate::storage::{MemoryBackend, SqliteSessionBackend};
use crate::transport::{relay_event, DeliverySink, InboundMessage};

use async_trait::async_trait;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::sync::Arc;

/// Delivery sink that prints to the local terminal
struct ConsoleSink {
    bot_user_id: String,
}

#[async_trait]
impl DeliverySink for ConsoleSink {
    async fn send_text(&self, _room_id: &str, body: &str) -> Result<()> {
        println!("{} {}", format!("{}:", self.bot_user_id).green().bold(), body);
        Ok(())
    }

    async fn send_notice(&self, _room_id: &str, body: &str) -> Result<()> {
        println!("{}", body.yellow());
        Ok(())
    }
}

/// Build the dispatcher from configuration
///
/// Chooses the session persistence backend based on `session.persist`.
fn build_dispatcher(config: &Config) -> Result<Dispatcher> {
    let backend = create_backend(&config.backend)?;

    let store = if config.session.persist {
        let sqlite = match &config.session.db_path {
            Some(path) => SqliteSessionBackend::new_with_path(path.clone())?,
            None => SqliteSessionBackend::new()?,
        };
        SessionStore::new(Arc::new(sqlite))
    } else {
        SessionStore::new(Arc::new(MemoryBackend::new()))
    };

    Dispatcher::new(backend, store, config)
}

/// Run the console room until the operator exits
///
/// # Arguments
///
/// * `config` - Validated configuration (consumed)
/// * `room` - Room identifier to stamp on every event
/// * `user` - Sender identity to stamp on every event
pub async fn run_console(config: Config, room: String, user: String) -> Result<()> {
    tracing::info!("Starting console room {} as {}", room, user);

    let dispatcher = build_dispatcher(&config)?;
    let sink = ConsoleSink {
        bot_user_id: config.bot.user_id.clone(),
    };

    let mut rl = DefaultEditor::new()?;

    println!(
        "{}",
        format!(
            "chatrelay console: room {}, mode {}, model {}",
            room, config.bot.mode, config.backend.model
        )
        .cyan()
    );
    println!("{}", "Type a message, or /quit to exit.".dimmed());

    loop {
        match rl.readline(&format!("{} ", format!("{}>", user).blue())) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                match trimmed {
                    "/quit" | "/exit" => break,
                    "/status" => {
                        println!(
                            "{}",
                            format!("{} active session(s)", dispatcher.sessions().len()).dimmed()
                        );
                        continue;
                    }
                    _ => {}
                }

                rl.add_history_entry(trimmed)?;

                let event = InboundMessage::text(room.clone(), user.clone(), trimmed);
                relay_event(&dispatcher, &sink, &event).await;
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                tracing::error!("Readline error: {}", e);
                break;
            }
        }
    }

    println!("{}", "Bye.".dimmed());
    Ok(())
}
