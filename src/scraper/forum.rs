//! Forum client for harvesting posts from financial channels.

use std::num::NonZeroU32;

use chrono::{DateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use roux::util::{FeedOption, RouxError, TimePeriod};
use roux::Subreddit;
use tracing::{info, warn};

use crate::config::ForumConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::models::NewPost;
use crate::retry::retry_with_backoff;

/// Channels harvested when the caller does not name any
pub const DEFAULT_CHANNELS: [&str; 6] = [
    "wallstreetbets",
    "stocks",
    "investing",
    "options",
    "Economics",
    "finance",
];

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Client for fetching posts from named forum channels.
/// Honors a per-minute rate budget; callers block until capacity frees up.
pub struct ForumClient {
    limiter: DirectLimiter,
}

impl ForumClient {
    pub fn new(config: &ForumConfig) -> PipelineResult<Self> {
        if config.client_id.is_none() || config.client_secret.is_none() {
            return Err(PipelineError::Config(
                "Forum credentials required. Set FORUM_CLIENT_ID and FORUM_CLIENT_SECRET"
                    .to_string(),
            ));
        }

        let per_minute = NonZeroU32::new(config.requests_per_minute.max(1))
            .unwrap_or(NonZeroU32::MIN);
        let limiter = RateLimiter::direct(Quota::per_minute(per_minute));

        Ok(Self { limiter })
    }

    /// Fetch hot posts from the given channels (or the default set).
    pub async fn fetch_hot(&self, channels: &[String], limit: u32) -> PipelineResult<Vec<NewPost>> {
        self.fetch(channels, limit, SortMode::Hot).await
    }

    /// Fetch newest posts from the given channels.
    pub async fn fetch_new(&self, channels: &[String], limit: u32) -> PipelineResult<Vec<NewPost>> {
        self.fetch(channels, limit, SortMode::New).await
    }

    /// Fetch top posts over a time window ("hour", "day", "week", "month",
    /// "year", "all").
    pub async fn fetch_top(
        &self,
        channels: &[String],
        time_filter: &str,
        limit: u32,
    ) -> PipelineResult<Vec<NewPost>> {
        self.fetch(channels, limit, SortMode::Top(parse_time_filter(time_filter)))
            .await
    }

    async fn fetch(
        &self,
        channels: &[String],
        limit: u32,
        sort: SortMode,
    ) -> PipelineResult<Vec<NewPost>> {
        let channels: Vec<String> = if channels.is_empty() {
            DEFAULT_CHANNELS.iter().map(|s| s.to_string()).collect()
        } else {
            channels.to_vec()
        };

        let mut posts = Vec::new();
        for channel in &channels {
            // Transient network failures get a couple of retries before
            // the channel is skipped
            let result = retry_with_backoff(
                || async {
                    self.limiter.until_ready().await;

                    let subreddit = Subreddit::new(channel);
                    let fetched = match sort {
                        SortMode::Hot => subreddit.hot(limit, None).await,
                        SortMode::New => subreddit.latest(limit, None).await,
                        SortMode::Top(period) => {
                            subreddit
                                .top(limit, Some(FeedOption::new().period(period)))
                                .await
                        }
                    };
                    fetched.map_err(map_forum_error)
                },
                2,
            )
            .await;

            match result {
                Ok(listing) => {
                    let before = posts.len();
                    for child in listing.data.children {
                        posts.push(submission_to_post(channel, child.data));
                    }
                    info!(
                        "Fetched {} posts from channel {}",
                        posts.len() - before,
                        channel
                    );
                }
                Err(e) => {
                    // Authentication failures are fatal; anything else
                    // skips this channel and carries on
                    if matches!(e, PipelineError::Authentication(_)) {
                        return Err(e);
                    }
                    warn!("Failed to fetch from channel {}: {}", channel, e);
                }
            }
        }

        Ok(posts)
    }
}

#[derive(Debug, Clone, Copy)]
enum SortMode {
    Hot,
    New,
    Top(TimePeriod),
}

fn parse_time_filter(time_filter: &str) -> TimePeriod {
    match time_filter.to_lowercase().as_str() {
        "hour" => TimePeriod::Now,
        "day" => TimePeriod::Today,
        "week" => TimePeriod::ThisWeek,
        "month" => TimePeriod::ThisMonth,
        "year" => TimePeriod::ThisYear,
        "all" => TimePeriod::AllTime,
        other => {
            warn!("Unknown time filter '{}', defaulting to day", other);
            TimePeriod::Today
        }
    }
}

fn submission_to_post(channel: &str, data: roux::submission::SubmissionData) -> NewPost {
    let timestamp = DateTime::<Utc>::from_timestamp(data.created_utc as i64, 0)
        .unwrap_or_else(Utc::now);

    NewPost {
        external_id: data.id,
        channel: channel.to_string(),
        title: data.title,
        body: if data.selftext.trim().is_empty() {
            None
        } else {
            Some(data.selftext)
        },
        url: data.url,
        score: data.ups as i32,
        num_comments: data.num_comments as i32,
        flair: data.link_flair_text,
        timestamp,
    }
}

fn map_forum_error(err: RouxError) -> PipelineError {
    match err {
        RouxError::Status(response) => {
            let status = response.status().as_u16();
            if status == 401 || status == 403 {
                PipelineError::Authentication(format!("forum API returned {}", status))
            } else if status == 429 {
                PipelineError::RateLimit { retry_after: 60 }
            } else {
                PipelineError::api_error(status, "forum API request failed")
            }
        }
        RouxError::Network(e) => PipelineError::Network(e),
        other => PipelineError::Internal(format!("forum API error: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_channels_cover_configured_set() {
        assert_eq!(DEFAULT_CHANNELS.len(), 6);
        assert!(DEFAULT_CHANNELS.contains(&"wallstreetbets"));
        assert!(DEFAULT_CHANNELS.contains(&"Economics"));
    }

    #[test]
    fn test_missing_credentials_is_a_config_error() {
        let config = ForumConfig {
            client_id: None,
            client_secret: None,
            user_agent: "test/0.1".to_string(),
            requests_per_minute: 60,
        };
        let err = ForumClient::new(&config).err();
        assert!(matches!(err, Some(PipelineError::Config(_))));
    }

    #[test]
    fn test_time_filter_mapping() {
        assert!(matches!(parse_time_filter("week"), TimePeriod::ThisWeek));
        assert!(matches!(parse_time_filter("ALL"), TimePeriod::AllTime));
        assert!(matches!(parse_time_filter("bogus"), TimePeriod::Today));
    }
}
