//! CLI - Command-line argument parsing for helpdeskd

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Help desk daemon
#[derive(Parser)]
#[command(name = "helpdeskd")]
#[command(about = "Help desk ticketing daemon", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (overrides /etc/helpdesk/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand (defaults to `serve`)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API
    Serve,

    /// Insert default SLA policies, sample tickets and the bootstrap admin
    Seed,

    /// Print the stored form of a password
    HashPassword {
        /// Plaintext password
        plain: String,
    },
}
