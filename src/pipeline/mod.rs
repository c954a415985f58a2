//! Pipeline orchestration: Harvest -> Analyze -> Persist.

pub mod backfill;
pub mod monitor;

use chrono::Utc;
use sqlx::{PgConnection, PgPool};
use tracing::{info, warn};

use crate::analyzer::SentimentAnalyzer;
use crate::config::Config;
use crate::error::{PipelineError, PipelineResult};
use crate::scraper::{CalendarScraper, ForumClient};
use crate::store;

/// Period selector for event harvesting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPeriod {
    Today,
    Week,
    Month,
}

/// Sort mode for post harvesting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostSort {
    Hot,
    New,
    Top,
}

/// One pipeline invocation's knobs, mirroring the CLI surface
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub scrape_events: Option<EventPeriod>,
    pub scrape_posts: Option<PostSort>,
    pub top_time_filter: String,
    pub channels: Vec<String>,
    pub post_limit: u32,
    pub analyze: bool,
    pub dry_run: bool,
    /// When set, scraped events are filtered to these currencies
    pub currencies: Option<Vec<String>>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            scrape_events: None,
            scrape_posts: None,
            top_time_filter: "day".to_string(),
            channels: Vec::new(),
            post_limit: 25,
            analyze: false,
            dry_run: false,
            currencies: None,
        }
    }
}

/// Summary of one pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub events_scraped: usize,
    pub events_stored: u64,
    pub posts_fetched: usize,
    pub posts_stored: u64,
    pub events_analyzed: u64,
    pub posts_analyzed: u64,
}

/// Orchestrator for the harvest/analyze/persist phases
pub struct Pipeline {
    config: Config,
    pool: PgPool,
}

impl Pipeline {
    pub fn new(config: Config, pool: PgPool) -> Self {
        Self { config, pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Execute the selected phases in order: scrape events, store
    /// events, scrape posts, store posts, analyze unscored.
    ///
    /// In dry-run mode every phase shares one transaction that is
    /// rolled back at the end; otherwise each phase commits
    /// independently.
    pub async fn run(&self, opts: &PipelineOptions) -> PipelineResult<PipelineReport> {
        let mut report = PipelineReport::default();

        if opts.dry_run {
            info!("Dry run: all writes will be rolled back");
            let mut tx = self.pool.begin().await?;
            let outcome = self.run_phases(&mut tx, opts, &mut report).await;
            tx.rollback().await?;
            outcome?;
            info!("Dry run complete; database left untouched");
            return Ok(report);
        }

        if let Some(period) = opts.scrape_events {
            let events = self.harvest_events(period, opts).await?;
            report.events_scraped = events.len();

            let mut tx = self.pool.begin().await?;
            report.events_stored = store::upsert_events(&mut tx, &events).await?;
            tx.commit().await?;
            info!(
                "Stored {} of {} scraped events",
                report.events_stored, report.events_scraped
            );
        }

        if let Some(sort) = opts.scrape_posts {
            let posts = self.harvest_posts(sort, opts).await?;
            report.posts_fetched = posts.len();

            let mut tx = self.pool.begin().await?;
            report.posts_stored = store::upsert_posts(&mut tx, &posts).await?;
            tx.commit().await?;
            info!(
                "Stored {} of {} fetched posts",
                report.posts_stored, report.posts_fetched
            );
        }

        if opts.analyze {
            // Score updates auto-commit per row so a late failure keeps
            // earlier progress
            let mut conn = self.pool.acquire().await?;
            self.analyze_unscored(&mut conn, &mut report).await?;
        }

        Ok(report)
    }

    async fn run_phases(
        &self,
        conn: &mut PgConnection,
        opts: &PipelineOptions,
        report: &mut PipelineReport,
    ) -> PipelineResult<()> {
        if let Some(period) = opts.scrape_events {
            let events = self.harvest_events(period, opts).await?;
            report.events_scraped = events.len();
            report.events_stored = store::upsert_events(conn, &events).await?;
        }

        if let Some(sort) = opts.scrape_posts {
            let posts = self.harvest_posts(sort, opts).await?;
            report.posts_fetched = posts.len();
            report.posts_stored = store::upsert_posts(conn, &posts).await?;
        }

        if opts.analyze {
            self.analyze_unscored(conn, report).await?;
        }

        Ok(())
    }

    /// Scrape events for the selected period. The browser session
    /// lives only for the duration of this phase.
    async fn harvest_events(
        &self,
        period: EventPeriod,
        opts: &PipelineOptions,
    ) -> PipelineResult<Vec<crate::models::NewEvent>> {
        // The calendar source publishes in Eastern time
        let today = Utc::now()
            .with_timezone(&chrono_tz::America::New_York)
            .date_naive();

        let mut scraper = CalendarScraper::new(self.config.scraper.clone());
        let result = match period {
            EventPeriod::Today => scraper.scrape_day(today).await,
            EventPeriod::Week => scraper.scrape_week(today).await,
            EventPeriod::Month => scraper.scrape_month(today).await,
        };
        scraper.close().await;

        let mut events = result?;
        if let Some(currencies) = &opts.currencies {
            events.retain(|e| currencies.iter().any(|c| c == &e.currency));
        }

        info!("Harvested {} events", events.len());
        Ok(events)
    }

    async fn harvest_posts(
        &self,
        sort: PostSort,
        opts: &PipelineOptions,
    ) -> PipelineResult<Vec<crate::models::NewPost>> {
        let client = ForumClient::new(&self.config.forum)?;
        let posts = match sort {
            PostSort::Hot => client.fetch_hot(&opts.channels, opts.post_limit).await?,
            PostSort::New => client.fetch_new(&opts.channels, opts.post_limit).await?,
            PostSort::Top => {
                client
                    .fetch_top(&opts.channels, &opts.top_time_filter, opts.post_limit)
                    .await?
            }
        };

        info!("Harvested {} posts", posts.len());
        Ok(posts)
    }

    /// Analyze everything the unscored filters return, writing each
    /// score as soon as its batch slot completes.
    async fn analyze_unscored(
        &self,
        conn: &mut PgConnection,
        report: &mut PipelineReport,
    ) -> PipelineResult<()> {
        let analyzer = SentimentAnalyzer::new(&self.config.llm)?;

        let events = store::unscored_events(conn).await?;
        if !events.is_empty() {
            info!("Analyzing {} unscored events", events.len());
            let results = analyzer.analyze_events(&events).await;

            for (event, result) in events.iter().zip(results.iter()) {
                if result.is_rate_limited() {
                    return Err(PipelineError::RateLimit { retry_after: 60 });
                }
                if let Some(reason) = &result.metadata.failure_reason {
                    warn!("Event {} scored with failure: {}", event.id, reason);
                }
                store::update_event_score(
                    conn,
                    event.id,
                    result.sentiment_score,
                    &result.raw_response,
                )
                .await?;
                report.events_analyzed += 1;
            }
        }

        let posts = store::unscored_posts(conn).await?;
        if !posts.is_empty() {
            info!("Analyzing {} unscored posts", posts.len());
            let results = analyzer.analyze_posts(&posts).await;

            for (post, result) in posts.iter().zip(results.iter()) {
                if result.is_rate_limited() {
                    return Err(PipelineError::RateLimit { retry_after: 60 });
                }
                if let Some(reason) = &result.metadata.failure_reason {
                    warn!("Post {} scored with failure: {}", post.external_id, reason);
                }
                let sentiments = serde_json::to_value(&result.symbol_sentiments)?;
                store::update_post_score(
                    conn,
                    post.id,
                    result.sentiment_score,
                    &result.raw_response,
                    &result.symbols,
                    &sentiments,
                )
                .await?;
                report.posts_analyzed += 1;
            }
        }

        info!(
            "Analysis complete: {} events, {} posts",
            report.events_analyzed, report.posts_analyzed
        );
        Ok(())
    }
}
