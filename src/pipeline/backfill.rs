//! Historical backfill: drive the calendar scraper week by week over a
//! date range with a resumable checkpoint.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::PipelineResult;
use crate::scraper::CalendarScraper;
use crate::store;

/// Fixed checkpoint location, relative to the working directory
pub const CHECKPOINT_PATH: &str = ".backfill_checkpoint.json";

/// Progress record persisted after every completed week
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_completed_week_anchor: Option<NaiveDate>,
    pub failed_weeks: Vec<NaiveDate>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            last_completed_week_anchor: None,
            failed_weeks: Vec::new(),
            started_at: now,
            updated_at: now,
        }
    }

    pub fn load(path: &Path) -> PipelineResult<Option<Checkpoint>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Write atomically: temp file then rename.
    pub fn save(&self, path: &Path) -> PipelineResult<()> {
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Weeks at or before the anchor are already done.
    pub fn is_completed(&self, week: NaiveDate) -> bool {
        self.last_completed_week_anchor
            .map(|anchor| week <= anchor)
            .unwrap_or(false)
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self::new()
    }
}

/// Monday of the week containing `date`
pub fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Week anchors (Mondays) covering [start, end], ascending
pub fn week_anchors(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut anchors = Vec::new();
    let mut current = monday_of(start);
    let last = monday_of(end);

    while current <= last {
        anchors.push(current);
        current += Duration::weeks(1);
    }
    anchors
}

/// Summary returned when a backfill run finishes
#[derive(Debug, Clone, Default)]
pub struct BackfillSummary {
    pub weeks_completed: usize,
    pub weeks_skipped: usize,
    pub events_stored: u64,
    pub failed_weeks: Vec<NaiveDate>,
}

/// Drives the calendar scraper over a historical range with
/// checkpoint/resume.
pub struct BackfillDriver {
    config: Config,
    pool: PgPool,
    checkpoint_path: PathBuf,
}

impl BackfillDriver {
    pub fn new(config: Config, pool: PgPool) -> Self {
        Self {
            config,
            pool,
            checkpoint_path: PathBuf::from(CHECKPOINT_PATH),
        }
    }

    pub fn with_checkpoint_path(mut self, path: PathBuf) -> Self {
        self.checkpoint_path = path;
        self
    }

    pub async fn run(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        resume: bool,
    ) -> PipelineResult<BackfillSummary> {
        let weeks = week_anchors(start, end);
        let mut checkpoint = if resume {
            Checkpoint::load(&self.checkpoint_path)?.unwrap_or_default()
        } else {
            Checkpoint::new()
        };

        if let Some(anchor) = checkpoint.last_completed_week_anchor {
            info!("Resuming backfill after week {}", anchor);
        }
        info!(
            "Backfilling {} weeks from {} to {}",
            weeks.len(),
            start,
            end
        );

        let mut summary = BackfillSummary::default();
        let mut scraper = CalendarScraper::new(self.config.scraper.clone());

        for week in weeks {
            if checkpoint.is_completed(week) {
                summary.weeks_skipped += 1;
                continue;
            }

            match self.process_week(&mut scraper, week).await {
                Ok(stored) => {
                    summary.weeks_completed += 1;
                    summary.events_stored += stored;

                    // Checkpoint only after the upsert has committed
                    checkpoint.last_completed_week_anchor = Some(week);
                    checkpoint.updated_at = Utc::now();
                    checkpoint.save(&self.checkpoint_path)?;

                    info!("Week {} complete: {} events", week, stored);
                }
                Err(e) => {
                    warn!("Week {} failed, continuing: {}", week, e);
                    checkpoint.failed_weeks.push(week);
                    checkpoint.updated_at = Utc::now();
                    checkpoint.save(&self.checkpoint_path)?;
                    summary.failed_weeks.push(week);
                }
            }

            self.inter_week_delay().await;
        }

        scraper.close().await;

        info!(
            "Backfill finished: {} weeks completed, {} skipped, {} failed, {} events",
            summary.weeks_completed,
            summary.weeks_skipped,
            summary.failed_weeks.len(),
            summary.events_stored
        );
        Ok(summary)
    }

    /// Scrape one week and commit its events. The scraper retries
    /// transient failures internally with bounded backoff.
    async fn process_week(
        &self,
        scraper: &mut CalendarScraper,
        week: NaiveDate,
    ) -> PipelineResult<u64> {
        let events = scraper.scrape_week(week).await?;

        let mut tx = self.pool.begin().await?;
        let stored = store::upsert_events(&mut tx, &events).await?;
        tx.commit().await?;

        Ok(stored)
    }

    /// Extra spacing between weeks, on top of the scraper's own
    /// inter-request delay, to keep the block risk down.
    async fn inter_week_delay(&self) {
        let jitter_ms = rand::thread_rng().gen_range(0..2000);
        let delay =
            std::time::Duration::from_millis(self.config.scraper.min_delay_ms + jitter_ms);
        tokio::time::sleep(delay).await;
    }
}
