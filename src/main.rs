//! ChatRelay - chat-protocol LLM bot
//!
//! Main entry point: initializes logging, loads and validates
//! configuration, and hands off to the selected command.

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chatrelay::cli::{Cli, Commands};
use chatrelay::config::Config;
use chatrelay::console;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_tracing(cli.verbose);

    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let mut config = Config::load(config_path)?;

    match cli.command {
        Commands::Console { room, user, mode } => {
            if let Some(m) = mode {
                tracing::debug!("Using mode override: {}", m);
                config.bot.mode = m;
            }

            // Configuration errors are fatal before anything connects.
            config.validate()?;

            tracing::info!("Starting console room");
            console::run_console(config, room, user).await?;
            Ok(())
        }
        Commands::Check => {
            config.validate()?;
            println!("Configuration OK ({})", config_path);
            Ok(())
        }
    }
}

/// Initialize the tracing subscriber
///
/// `RUST_LOG` takes precedence; `--verbose` raises the default to debug.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "chatrelay=debug,info"
    } else {
        "chatrelay=info,warn"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
