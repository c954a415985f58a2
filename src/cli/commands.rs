use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::config::Config;
use crate::pairs::{self, FxPair, DEFAULT_LOOKBACK_HOURS};
use crate::pipeline::backfill::BackfillDriver;
use crate::pipeline::monitor::Monitor;
use crate::pipeline::{EventPeriod, Pipeline, PipelineOptions, PostSort};

/// Arguments for the `run` command, mirroring the CLI flag table
pub struct RunArgs {
    pub scrape_events: Option<EventPeriod>,
    pub scrape_posts: Option<PostSort>,
    pub posts_limit: u32,
    pub channels: Vec<String>,
    pub top_time: String,
    pub analyze: bool,
    pub pair: Option<String>,
    pub pair_all: bool,
    pub dry_run: bool,
}

impl RunArgs {
    fn has_action(&self) -> bool {
        self.scrape_events.is_some()
            || self.scrape_posts.is_some()
            || self.analyze
            || self.pair.is_some()
            || self.pair_all
    }
}

/// Run selected pipeline phases, then answer any pair queries
pub async fn run_pipeline(config: Config, pool: PgPool, args: RunArgs) -> Result<()> {
    if !args.has_action() {
        println!("No action requested. See `marketmood run --help` for the available flags.");
        return Ok(());
    }

    let wants_phases = args.scrape_events.is_some() || args.scrape_posts.is_some() || args.analyze;
    if wants_phases {
        let opts = PipelineOptions {
            scrape_events: args.scrape_events,
            scrape_posts: args.scrape_posts,
            top_time_filter: args.top_time.clone(),
            channels: args.channels.clone(),
            post_limit: args.posts_limit,
            analyze: args.analyze,
            dry_run: args.dry_run,
            currencies: None,
        };

        let pipeline = Pipeline::new(config, pool.clone());
        let report = pipeline
            .run(&opts)
            .await
            .context("pipeline run failed")?;

        println!("\n✅ Pipeline run completed");
        if args.scrape_events.is_some() {
            println!(
                "📅 Events: {} scraped, {} stored",
                report.events_scraped, report.events_stored
            );
        }
        if args.scrape_posts.is_some() {
            println!(
                "💬 Posts: {} fetched, {} stored",
                report.posts_fetched, report.posts_stored
            );
        }
        if args.analyze {
            println!(
                "🧠 Analyzed: {} events, {} posts",
                report.events_analyzed, report.posts_analyzed
            );
        }
        if args.dry_run {
            println!("🧪 Dry run: all writes rolled back");
        }
    }

    if let Some(pair_code) = &args.pair {
        let pair = FxPair::parse(pair_code).context("invalid pair code")?;
        print_pair(&pool, pair).await?;
    }

    if args.pair_all {
        let mut conn = pool.acquire().await?;
        let results = pairs::all_pairs_sentiment(&mut conn, DEFAULT_LOOKBACK_HOURS)
            .await
            .context("pair aggregation failed")?;

        println!("\n📊 Pair sentiment (last {}h):\n", DEFAULT_LOOKBACK_HOURS);
        for sentiment in results {
            println!("{}\n", sentiment);
        }
    }

    Ok(())
}

async fn print_pair(pool: &PgPool, pair: FxPair) -> Result<()> {
    let mut conn = pool.acquire().await?;
    let sentiment = pairs::pair_sentiment(&mut conn, pair, DEFAULT_LOOKBACK_HOURS)
        .await
        .context("pair aggregation failed")?;

    println!("\n{}", sentiment);
    Ok(())
}

/// Backfill historical calendar data week by week
pub async fn backfill(
    config: Config,
    pool: PgPool,
    start_date: NaiveDate,
    end_date: NaiveDate,
    resume: bool,
) -> Result<()> {
    if end_date < start_date {
        anyhow::bail!("end date {} is before start date {}", end_date, start_date);
    }

    let driver = BackfillDriver::new(config, pool);
    let summary = driver
        .run(start_date, end_date, resume)
        .await
        .context("backfill failed")?;

    println!("\n✅ Backfill completed");
    println!(
        "📅 Weeks: {} completed, {} skipped, {} failed",
        summary.weeks_completed,
        summary.weeks_skipped,
        summary.failed_weeks.len()
    );
    println!("🗃  Events stored: {}", summary.events_stored);

    if !summary.failed_weeks.is_empty() {
        warn!("Failed weeks recorded in checkpoint: {:?}", summary.failed_weeks);
        println!("⚠️  Failed weeks: {:?}", summary.failed_weeks);
    }

    Ok(())
}

/// Monitor a pair on a fixed interval
pub async fn monitor(
    mut config: Config,
    pool: PgPool,
    pair_code: String,
    interval_minutes: Option<u64>,
    once: bool,
) -> Result<()> {
    let pair = FxPair::parse(&pair_code).context("invalid pair code")?;
    if let Some(minutes) = interval_minutes {
        config.monitor.interval_minutes = minutes;
    }

    info!("Starting monitor for {}", pair.label());
    let monitor = Monitor::new(config, pool, pair);
    monitor.run(once).await.context("monitor failed")?;

    Ok(())
}

/// Run database migrations explicitly
pub async fn migrate(pool: PgPool) -> Result<()> {
    info!("Running database migrations");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    println!("✅ Migrations applied");
    Ok(())
}
