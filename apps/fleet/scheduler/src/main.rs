//! Fleet Scheduler
//!
//! The background-worker binary of the control plane. Runs the cooperative
//! tasks that never share memory, only the database:
//!
//! - replica coordinator (default every 10 s, single-flight)
//! - pricing consolidation (default every 12 h, cron)
//! - zombie retention purge (daily)
//! - heartbeat staleness check
//! - emergency deadline escalation
//! - SSE event expiry and partition maintenance

use clap::{Parser, Subcommand};
use core_config::Environment;
use core_config::tracing::{init_tracing, install_color_eyre};
use eyre::Result;
use tracing::info;

mod config;
mod partitions;
mod workers;

use config::Config;

#[derive(Parser)]
#[command(name = "fleet-scheduler")]
#[command(about = "Background workers for the spot/on-demand switching control plane")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all background workers until SIGTERM/SIGINT
    Run,

    /// Run a single pricing consolidation pass and exit
    ConsolidateOnce,

    /// Show recent consolidation runs
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let config = Config::from_env()?;
    let environment = Environment::from_env();
    init_tracing(&environment);

    // Initialize metrics
    observability::init_metrics();

    let cli = Cli::parse();

    // Connect to database
    info!("Connecting to database...");
    let db = database::postgres::connect_from_config_with_retry(config.database.clone(), None)
        .await
        .map_err(|e| eyre::eyre!("Database connection failed: {}", e))?;

    match cli.command {
        Commands::Run => {
            workers::run(db, config).await?;
        }

        Commands::ConsolidateOnce => {
            info!("Running one consolidation pass");
            let counters = workers::consolidate_once(db, &config).await?;
            info!(
                "Consolidation complete: {} snapshots, {} duplicates, {} gaps filled, {} backfilled",
                counters.snapshots_processed,
                counters.duplicates_removed,
                counters.gaps_filled,
                counters.backfills_added
            );
        }

        Commands::Status => {
            let runs = workers::recent_runs(db).await?;
            println!("{}", serde_json::to_string_pretty(&runs)?);
        }
    }

    Ok(())
}
