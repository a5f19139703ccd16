// src/main.rs — genbot entry point

use std::path::PathBuf;

use clap::Parser;

use genbot::cli::{Cli, Commands};
use genbot::infra::config::Config;
use genbot::infra::{logger, paths};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(paths::config_file_path);

    // `init` runs before a config exists
    if let Some(Commands::Init { force }) = cli.command {
        return genbot::cli::init::run_init(&config_path, force).await;
    }

    // Load config (falls back to defaults if no config.toml)
    let config = if cli.config.is_some() {
        Config::load_from(&config_path)?
    } else {
        Config::load()?
    };

    match cli.command {
        Some(Commands::CheckConfig) => genbot::cli::check::run_check(&config),
        Some(Commands::Run) | None => {
            let level = cli.log_level.as_deref().unwrap_or(&config.log.level);
            logger::init_logging(level, config.log.file.as_deref())?;
            genbot::cli::run::run_bot(config).await
        }
        Some(Commands::Init { .. }) => Ok(()),
    }
}
