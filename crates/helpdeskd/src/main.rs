//! Help desk daemon - ticket API with admin sessions and SLA tracking

mod cli;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use helpdesk_common::{hash_password_with_cost, HelpdeskConfig};
use helpdeskd::{ensure_bootstrap_admin, Store};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = HelpdeskConfig::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            info!("Help desk daemon v{} starting", helpdesk_common::VERSION);
            helpdeskd::server::run(config).await
        }
        Commands::Seed => seed(&config),
        Commands::HashPassword { plain } => {
            let hashed = hash_password_with_cost(&plain, config.password)?;
            println!("{}", hashed);
            Ok(())
        }
    }
}

fn seed(config: &HelpdeskConfig) -> Result<()> {
    let store = Store::open_at(&config.database.path)
        .with_context(|| format!("opening database {}", config.database.path))?;

    let report = store.seed_defaults(Utc::now())?;
    info!(
        "Seeded {} SLA policies and {} sample tickets",
        report.policies_created, report.tickets_created
    );
    for policy in store.list_sla_policies()? {
        info!(
            "  {} policy: respond within {}m, resolve within {}m{}",
            policy.priority,
            policy.response_minutes,
            policy.resolve_minutes,
            if policy.active { "" } else { " (inactive)" }
        );
    }

    if ensure_bootstrap_admin(&store, config)? {
        info!("Bootstrap admin ready");
    }
    Ok(())
}
