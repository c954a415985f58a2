//! Continuous pair monitor: run the pipeline for a configured pair on
//! a fixed interval and print the refreshed pair sentiment.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::PipelineResult;
use crate::pairs::{self, FxPair, DEFAULT_LOOKBACK_HOURS};
use crate::pipeline::{EventPeriod, Pipeline, PipelineOptions, PostSort};

/// Channels the monitor watches; tilted toward forex discussion
const MONITOR_CHANNELS: [&str; 5] = [
    "Forex",
    "forex_trades",
    "ForexFactory",
    "Economics",
    "wallstreetbets",
];

/// Periodic monitor for one currency pair. One tick at a time; a tick
/// always runs to completion before the next is scheduled.
pub struct Monitor {
    pipeline: Pipeline,
    pair: FxPair,
    interval: Duration,
    post_limit: u32,
}

impl Monitor {
    pub fn new(config: Config, pool: sqlx::PgPool, pair: FxPair) -> Self {
        let interval = Duration::from_secs(config.monitor.interval_minutes * 60);
        let post_limit = config.monitor.post_limit;
        Self {
            pipeline: Pipeline::new(config, pool),
            pair,
            interval,
            post_limit,
        }
    }

    /// Run the monitor loop. Ctrl-C finishes the current tick and then
    /// exits. With `once` set, a single tick runs and the loop ends.
    pub async fn run(&self, once: bool) -> PipelineResult<()> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received, finishing current cycle");
                let _ = shutdown_tx.send(true);
            }
        });

        println!(
            "📡 Monitoring {} every {} minutes (Ctrl+C to stop)",
            self.pair.label(),
            self.interval.as_secs() / 60
        );

        let mut cycle: u64 = 0;
        loop {
            cycle += 1;
            info!("Monitor cycle {} starting", cycle);

            if let Err(e) = self.tick().await {
                warn!("Monitor cycle {} failed: {}", cycle, e);
            }

            if once {
                break;
            }
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        println!("📡 Monitor stopped after {} cycles", cycle);
        Ok(())
    }

    /// One monitoring cycle: harvest today's events for the pair's
    /// currencies plus fresh posts, analyze everything unscored, then
    /// print the pair sentiment.
    async fn tick(&self) -> PipelineResult<()> {
        let opts = PipelineOptions {
            scrape_events: Some(EventPeriod::Today),
            scrape_posts: Some(PostSort::Hot),
            channels: MONITOR_CHANNELS.iter().map(|s| s.to_string()).collect(),
            post_limit: self.post_limit,
            analyze: true,
            currencies: Some(vec![
                self.pair.base().to_string(),
                self.pair.quote().to_string(),
            ]),
            ..Default::default()
        };

        let report = self.pipeline.run(&opts).await?;
        info!(
            "Tick stored {} events / {} posts, analyzed {} / {}",
            report.events_stored,
            report.posts_stored,
            report.events_analyzed,
            report.posts_analyzed
        );

        let mut conn = self.pipeline.pool().acquire().await?;
        let sentiment =
            pairs::pair_sentiment(&mut conn, self.pair, DEFAULT_LOOKBACK_HOURS).await?;
        println!("{}", sentiment);

        Ok(())
    }
}
