//! Economic calendar scraper driving a WebDriver-controlled browser.
//! The calendar source renders its table with JavaScript behind anti-bot
//! protection, so plain HTTP fetches are not an option.

use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use fantoccini::{Client, ClientBuilder, Locator};
use rand::Rng;
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ScraperConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::models::NewEvent;
use crate::scraper::parse;

/// Scraper for the economic calendar. Owns a lazily created browser
/// session; not safe to share across tasks.
pub struct CalendarScraper {
    config: ScraperConfig,
    client: Option<Client>,
    last_request: Option<Instant>,
}

impl CalendarScraper {
    pub fn new(config: ScraperConfig) -> Self {
        Self {
            config,
            client: None,
            last_request: None,
        }
    }

    /// Scrape all events for the week containing `date`, ordered by timestamp.
    pub async fn scrape_week(&mut self, date: NaiveDate) -> PipelineResult<Vec<NewEvent>> {
        let url = parse::week_url(date);
        info!("Scraping calendar week: {}", url);
        self.scrape_url(&url, date.year()).await
    }

    /// Scrape events for a single source-timezone day.
    pub async fn scrape_day(&mut self, date: NaiveDate) -> PipelineResult<Vec<NewEvent>> {
        let url = parse::day_url(date);
        info!("Scraping calendar day: {}", url);
        self.scrape_url(&url, date.year()).await
    }

    /// Scrape events for the month containing `date`.
    pub async fn scrape_month(&mut self, date: NaiveDate) -> PipelineResult<Vec<NewEvent>> {
        let url = parse::month_url(date.year(), date.month());
        info!("Scraping calendar month: {}", url);
        self.scrape_url(&url, date.year()).await
    }

    async fn scrape_url(&mut self, url: &str, default_year: i32) -> PipelineResult<Vec<NewEvent>> {
        let html = self.fetch_rendered(url).await?;
        let rows = parse::extract_rows(&html);
        if rows.is_empty() {
            // Distinguish an empty calendar from a page whose structure
            // we no longer recognize
            if !html.contains("calendar__") {
                return Err(PipelineError::parse_error(format!(
                    "calendar table missing at {}",
                    url
                )));
            }
            warn!("Calendar page yielded no rows: {}", url);
            return Ok(Vec::new());
        }

        let events = parse::rows_to_events(&rows, default_year);
        info!("Parsed {} events from {} rows", events.len(), rows.len());
        Ok(events)
    }

    /// Load a page and return the rendered DOM, retrying transient
    /// failures (timeouts, bot challenges) with exponential backoff.
    async fn fetch_rendered(&mut self, url: &str) -> PipelineResult<String> {
        let max_retries = self.config.max_retries;
        let mut attempt: u32 = 0;

        loop {
            self.polite_delay().await;

            match self.load_page(url).await {
                Ok(html) => {
                    if parse::looks_like_challenge(&html) {
                        if attempt >= max_retries {
                            return Err(PipelineError::BotChallenge {
                                url: url.to_string(),
                            });
                        }
                        warn!(
                            "Bot challenge detected (attempt {}/{}), backing off",
                            attempt + 1,
                            max_retries
                        );
                    } else {
                        return Ok(html);
                    }
                }
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    warn!(
                        "Transient scrape error (attempt {}/{}): {}",
                        attempt + 1,
                        max_retries,
                        e
                    );
                }
                Err(e) => return Err(e),
            }

            let backoff = Duration::from_secs(2u64.pow(attempt).min(60));
            debug!("Backing off {:?} before retrying {}", backoff, url);
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    async fn load_page(&mut self, url: &str) -> PipelineResult<String> {
        let timeout = Duration::from_secs(self.config.page_timeout_seconds);
        let client = self.client().await?;

        client.goto(url).await?;

        // The table is attached once the page scripts have run
        match client
            .wait()
            .at_most(timeout)
            .for_element(Locator::Css(".calendar__table"))
            .await
        {
            Ok(_) => {}
            Err(e) => {
                // The page may be a challenge interstitial; let the caller decide
                debug!("Calendar table did not appear: {}", e);
            }
        }

        let html = client.source().await?;
        Ok(html)
    }

    /// Get or lazily create the browser session.
    async fn client(&mut self) -> PipelineResult<&Client> {
        if self.client.is_none() {
            info!(
                "Starting browser session via {} (headless: {})",
                self.config.webdriver_url, self.config.headless
            );

            let mut chrome_args = vec![
                "--disable-blink-features=AutomationControlled".to_string(),
                "--window-size=1920,1080".to_string(),
            ];
            if self.config.headless {
                chrome_args.push("--headless=new".to_string());
            }

            let mut caps = serde_json::map::Map::new();
            caps.insert(
                "goog:chromeOptions".to_string(),
                json!({ "args": chrome_args }),
            );

            let client = ClientBuilder::native()
                .capabilities(caps)
                .connect(&self.config.webdriver_url)
                .await?;

            self.client = Some(client);
        }

        self.client
            .as_ref()
            .ok_or_else(|| PipelineError::Browser("browser session unavailable".to_string()))
    }

    /// Enforce the minimum inter-request delay plus random jitter.
    async fn polite_delay(&mut self) {
        if let Some(last) = self.last_request {
            let jitter_ms = rand::thread_rng().gen_range(0..500);
            let target = Duration::from_millis(self.config.min_delay_ms + jitter_ms);
            let elapsed = last.elapsed();
            if elapsed < target {
                tokio::time::sleep(target - elapsed).await;
            }
        }
        self.last_request = Some(Instant::now());
    }

    /// Shut down the browser session. Safe to call when none is open.
    pub async fn close(&mut self) {
        if let Some(client) = self.client.take() {
            info!("Closing browser session");
            if let Err(e) = client.close().await {
                warn!("Failed to close browser session cleanly: {}", e);
            }
        }
    }
}
