use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::PgPool;
use tracing::info;

use crate::config::Config;
use crate::pipeline::{EventPeriod, PostSort};

pub mod commands;

#[derive(Parser)]
#[command(
    name = "marketmood",
    about = "Financial-news sentiment ingestion and scoring pipeline",
    version = "0.1.0",
    author = "jdhiman"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum EventPeriodArg {
    Today,
    Week,
    Month,
}

impl From<EventPeriodArg> for EventPeriod {
    fn from(arg: EventPeriodArg) -> Self {
        match arg {
            EventPeriodArg::Today => EventPeriod::Today,
            EventPeriodArg::Week => EventPeriod::Week,
            EventPeriodArg::Month => EventPeriod::Month,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum PostSortArg {
    Hot,
    New,
    Top,
}

impl From<PostSortArg> for PostSort {
    fn from(arg: PostSortArg) -> Self {
        match arg {
            PostSortArg::Hot => PostSort::Hot,
            PostSortArg::New => PostSort::New,
            PostSortArg::Top => PostSort::Top,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run selected pipeline phases over a selected period
    Run {
        /// Harvest economic events for a period
        #[arg(long, value_enum)]
        scrape_events: Option<EventPeriodArg>,

        /// Harvest forum posts with a sort mode
        #[arg(long, value_enum)]
        scrape_posts: Option<PostSortArg>,

        /// Per-channel post cap
        #[arg(long, default_value_t = 25)]
        posts_limit: u32,

        /// Override the default channel list (comma separated)
        #[arg(long, value_delimiter = ',')]
        channels: Vec<String>,

        /// Time window for top posts (hour, day, week, month, year, all)
        #[arg(long, default_value = "day")]
        top_time: String,

        /// Analyze unscored items
        #[arg(long)]
        analyze: bool,

        /// Compute and print sentiment for a pair (e.g. EURUSD)
        #[arg(long)]
        pair: Option<String>,

        /// Print sentiment for every supported pair
        #[arg(long)]
        pair_all: bool,

        /// Roll back all writes on success
        #[arg(long)]
        dry_run: bool,
    },

    /// Backfill historical calendar weeks with checkpoint/resume
    Backfill {
        /// First date of the range (YYYY-MM-DD)
        #[arg(long)]
        start_date: NaiveDate,

        /// Last date of the range (YYYY-MM-DD)
        #[arg(long)]
        end_date: NaiveDate,

        /// Resume from the checkpoint file
        #[arg(long)]
        resume: bool,
    },

    /// Periodically refresh and print sentiment for a pair
    Monitor {
        /// Pair to monitor (e.g. EURUSD)
        #[arg(long, default_value = "EURUSD")]
        pair: String,

        /// Override the configured interval
        #[arg(long)]
        interval_minutes: Option<u64>,

        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Run database migrations
    Migrate,
}

/// Execute CLI command with database pool
pub async fn run(cli: Cli, config: Config, pool: PgPool) -> Result<()> {
    let command = match cli.command {
        Some(command) => command,
        None => return Ok(()),
    };

    match command {
        Commands::Run {
            scrape_events,
            scrape_posts,
            posts_limit,
            channels,
            top_time,
            analyze,
            pair,
            pair_all,
            dry_run,
        } => {
            commands::run_pipeline(
                config,
                pool,
                commands::RunArgs {
                    scrape_events: scrape_events.map(Into::into),
                    scrape_posts: scrape_posts.map(Into::into),
                    posts_limit,
                    channels,
                    top_time,
                    analyze,
                    pair,
                    pair_all,
                    dry_run,
                },
            )
            .await?;
        }
        Commands::Backfill {
            start_date,
            end_date,
            resume,
        } => {
            info!("Backfilling {} to {}", start_date, end_date);
            commands::backfill(config, pool, start_date, end_date, resume).await?;
        }
        Commands::Monitor {
            pair,
            interval_minutes,
            once,
        } => {
            commands::monitor(config, pool, pair, interval_minutes, once).await?;
        }
        Commands::Migrate => {
            commands::migrate(pool).await?;
        }
    }
    Ok(())
}
