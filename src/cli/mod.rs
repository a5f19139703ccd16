// src/cli/mod.rs — CLI definition (clap derive)

pub mod check;
pub mod init;
pub mod run;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "genbot",
    about = "Chat bot dispatching generation requests to pluggable backends",
    version
)]
pub struct Cli {
    /// Config file path
    #[arg(long)]
    pub config: Option<String>,

    /// Log level (overrides the config file; RUST_LOG wins over both)
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start the bot (default)
    Run,
    /// Validate the configuration and print a summary
    CheckConfig,
    /// Write a default config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}
