//! PromptGuard - reversible PII tokenization for chat prompts
//!
//! Masks personal data before it reaches a chat application and restores
//! it in rendered responses.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use promptguard::{config::PromptGuardConfig, gateway, PromptGuard};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "promptguard")]
#[command(author = "PromptGuard Team")]
#[command(version)]
#[command(about = "Reversible PII tokenization for chat prompts")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "PROMPTGUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the local HTTP API
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Mask PII in TEXT (or stdin) and store the new tokens
    Mask {
        /// Text to mask; read from stdin when omitted
        text: Option<String>,
    },

    /// Restore known tokens in TEXT (or stdin)
    Unmask {
        /// Text to unmask; read from stdin when omitted
        text: Option<String>,
    },

    /// Show stored token counts per label
    Tokens,

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("promptguard={},tower_http=info", log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    // Load configuration
    let config = match &cli.config {
        Some(path) => PromptGuardConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PromptGuardConfig::default(),
    };

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            let port = port.unwrap_or(config.gateway.port);
            let guard = build_guard(config)?;
            gateway::serve(Arc::new(guard), &host, port).await?;
        }
        Commands::Mask { text } => {
            let guard = build_guard(config)?;
            let outcome = guard.mask_text(&input_text(text)?).await;
            println!("{}", outcome.masked_text);
            tracing::info!(tokens = outcome.tokens.len(), "Mask complete");
        }
        Commands::Unmask { text } => {
            let guard = build_guard(config)?;
            let outcome = guard.unmask_text(&input_text(text)?).await;
            println!("{}", outcome.text);
            if !outcome.unresolved.is_empty() {
                tracing::warn!(
                    unresolved = outcome.unresolved.len(),
                    "Some tokens are not in the store"
                );
            }
        }
        Commands::Tokens => {
            let guard = build_guard(config)?;
            let counts = guard.token_counts().await;
            if counts.is_empty() {
                println!("No tokens stored");
            }
            for (label, count) in counts {
                println!("{:<16} {}", label, count);
            }
        }
        Commands::Config { default } => {
            show_config(if default { None } else { Some(&config) })?;
        }
    }

    Ok(())
}

fn build_guard(config: PromptGuardConfig) -> Result<PromptGuard> {
    PromptGuard::from_config(config).context("Failed to initialize PromptGuard")
}

fn input_text(text: Option<String>) -> Result<String> {
    match text {
        Some(text) => Ok(text),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf.trim_end_matches('\n').to_string())
        }
    }
}

fn show_config(config: Option<&PromptGuardConfig>) -> Result<()> {
    let config = config.cloned().unwrap_or_default();
    let toml = toml::to_string_pretty(&config)?;
    println!("{}", toml);
    Ok(())
}
