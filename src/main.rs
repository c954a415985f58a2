use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use marketmood::cli::{self, Cli};
use marketmood::config::Config;
use marketmood::db;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with structured JSON logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    let cli = Cli::parse();

    // No command given: print usage and exit cleanly
    if cli.command.is_none() {
        let mut command = Cli::command();
        command.print_help()?;
        println!();
        return Ok(());
    }

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let config = Config::load()?;
    info!(version = env!("CARGO_PKG_VERSION"), "marketmood starting up");

    // Initialize database, run migrations, and verify connectivity
    let db = db::Database::new(&config.database).await?;
    db.run_migrations().await?;
    db.health_check().await?;
    info!("Database initialized successfully");

    if let Err(e) = cli::run(cli, config, db.pool.clone()).await {
        eprintln!("❌ marketmood failed: {:#}", e);
        std::process::exit(1);
    }

    info!("marketmood completed successfully");
    Ok(())
}
