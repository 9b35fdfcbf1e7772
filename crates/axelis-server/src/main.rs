// crates/axelis-server/src/main.rs
// Axelis - Multi-tenant conversational assistant for mobile banking

mod cli;

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env from ~/.axelis/.env only (never from CWD — a hostile working
    // directory could override API keys)
    if let Some(home) = dirs::home_dir() {
        if let Err(e) = dotenvy::from_path(home.join(".axelis/.env")) {
            tracing::debug!("Failed to load global .env file: {}", e);
        }
    }

    let cli = Cli::parse();

    let log_level = std::env::var("AXELIS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let level = match log_level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    match cli.command {
        None | Some(Commands::Serve) => cli::run_server().await?,
        Some(Commands::Seed) => cli::run_seed().await?,
        Some(Commands::Sweep { days }) => cli::run_sweep(days).await?,
    }

    Ok(())
}
