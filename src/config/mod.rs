use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub forum: ForumConfig,
    pub scraper: ScraperConfig,
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    /// Baseline pool size; max_connections = pool_size + max_overflow
    pub pool_size: u32,
    pub max_overflow: u32,
}

impl DatabaseConfig {
    pub fn max_connections(&self) -> u32 {
        self.pool_size + self.max_overflow
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForumConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub user_agent: String,
    pub requests_per_minute: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub webdriver_url: String,
    pub headless: bool,
    pub page_timeout_seconds: u64,
    /// Minimum delay between page loads; jitter is added on top
    pub min_delay_ms: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub interval_minutes: u64,
    pub post_limit: u32,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file - this sets env vars that aren't already set
        dotenv::dotenv().ok();

        let config = Config {
            database: DatabaseConfig {
                url: database_url_from_env()?,
                pool_size: env_parse("DB_POOL_SIZE", 5u32)?,
                max_overflow: env_parse("DB_MAX_OVERFLOW", 5u32)?,
            },
            llm: LlmConfig {
                api_key: env::var("LLM_API_KEY").ok(),
                model: env::var("LLM_MODEL").unwrap_or_else(|_| "gemini-1.5-flash".to_string()),
                base_url: env::var("LLM_BASE_URL").unwrap_or_else(|_| {
                    "https://generativelanguage.googleapis.com/v1beta".to_string()
                }),
                timeout_seconds: env_parse("LLM_TIMEOUT_SECONDS", 30u64)?,
                max_retries: env_parse("LLM_MAX_RETRIES", 3u32)?,
                base_delay_ms: env_parse("LLM_BASE_DELAY_MS", 1000u64)?,
            },
            forum: ForumConfig {
                client_id: env::var("FORUM_CLIENT_ID").ok(),
                client_secret: env::var("FORUM_CLIENT_SECRET").ok(),
                user_agent: env::var("FORUM_USER_AGENT")
                    .unwrap_or_else(|_| "marketmood/0.1.0".to_string()),
                requests_per_minute: env_parse("FORUM_RATE_LIMIT_PER_MINUTE", 60u32)?,
            },
            scraper: ScraperConfig {
                webdriver_url: env::var("WEBDRIVER_URL")
                    .unwrap_or_else(|_| "http://localhost:4444".to_string()),
                headless: env_parse("SCRAPER_HEADLESS", true)?,
                page_timeout_seconds: env_parse("SCRAPER_PAGE_TIMEOUT_SECONDS", 30u64)?,
                min_delay_ms: env_parse("SCRAPER_MIN_DELAY_MS", 1500u64)?,
                max_retries: env_parse("SCRAPER_MAX_RETRIES", 3u32)?,
            },
            monitor: MonitorConfig {
                interval_minutes: env_parse("MONITOR_INTERVAL_MINUTES", 30u64)?,
                post_limit: env_parse("MONITOR_POST_LIMIT", 25u32)?,
            },
        };

        Ok(config)
    }
}

/// Build the connection URL from DB_* parts, or pass DATABASE_URL through when set.
fn database_url_from_env() -> Result<String> {
    if let Ok(url) = env::var("DATABASE_URL") {
        return Ok(url);
    }

    let host = env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
    let name = env::var("DB_NAME").unwrap_or_else(|_| "marketmood".to_string());
    let user = env::var("DB_USER").unwrap_or_else(|_| "postgres".to_string());
    let password = env::var("DB_PASSWORD").unwrap_or_default();

    if password.is_empty() {
        Ok(format!("postgresql://{}@{}:{}/{}", user, host, port, name))
    } else {
        Ok(format!(
            "postgresql://{}:{}@{}:{}/{}",
            user, password, host, port, name
        ))
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("Invalid {} value: {}", key, raw)),
        Err(_) => Ok(default),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/marketmood".to_string(),
                pool_size: 5,
                max_overflow: 5,
            },
            llm: LlmConfig {
                api_key: None,
                model: "gemini-1.5-flash".to_string(),
                base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                timeout_seconds: 30,
                max_retries: 3,
                base_delay_ms: 1000,
            },
            forum: ForumConfig {
                client_id: None,
                client_secret: None,
                user_agent: "marketmood/0.1.0".to_string(),
                requests_per_minute: 60,
            },
            scraper: ScraperConfig {
                webdriver_url: "http://localhost:4444".to_string(),
                headless: true,
                page_timeout_seconds: 30,
                min_delay_ms: 1500,
                max_retries: 3,
            },
            monitor: MonitorConfig {
                interval_minutes: 30,
                post_limit: 25,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_connections_is_pool_plus_overflow() {
        let cfg = DatabaseConfig {
            url: "postgresql://localhost/marketmood".to_string(),
            pool_size: 5,
            max_overflow: 5,
        };
        assert_eq!(cfg.max_connections(), 10);
    }
}
