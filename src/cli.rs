//! Command-line interface definition for ChatRelay
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for the local console room and configuration
//! checking.

use clap::{Parser, Subcommand};

/// ChatRelay - chat-protocol bot relaying room messages to an LLM backend
#[derive(Parser, Debug, Clone)]
#[command(name = "chatrelay")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for ChatRelay
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Open a local console room and talk to the bot without a transport
    Console {
        /// Room identifier to simulate
        #[arg(long, default_value = "!console:local")]
        room: String,

        /// Sender identity to simulate
        #[arg(long, default_value = "@operator:local")]
        user: String,

        /// Override the conversation mode from config (chat, assistant)
        #[arg(short, long)]
        mode: Option<String>,
    },

    /// Validate the configuration and exit
    Check,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            command: Commands::Check,
        }
    }
}
