//! Sentiment analysis: one LLM call per event or post, with image
//! fallback handling, response validation, and bounded-parallel batches.

pub mod gemini;
pub mod images;
pub mod parse;
pub mod prompts;
pub mod tickers;

use std::collections::BTreeMap;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{EconomicEvent, ForumPost};

use gemini::{GeminiClient, RequestPart};
use prompts::SentimentPrompts;

pub use gemini::GenerationOutcome;

/// Default bounded width of batch analysis
const DEFAULT_CONCURRENCY: usize = 4;
const IMAGE_TIMEOUT_SECONDS: u64 = 10;
const IMAGE_MAX_ATTEMPTS: u32 = 3;

/// Metadata describing how an analysis was produced
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub model: String,
    pub retries: u32,
    pub image_download_failed: bool,
    pub failure_reason: Option<String>,
    pub rate_limit_exhausted: bool,
}

/// Result of analyzing one event or post. Always produced; failures
/// are carried in the metadata rather than raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub sentiment_score: f64,
    pub reasoning: String,
    pub symbols: Vec<String>,
    pub symbol_sentiments: BTreeMap<String, f64>,
    pub raw_response: Value,
    pub metadata: AnalysisMetadata,
}

/// Analyzer facade over the LLM client. Thread-safe; batches share the
/// underlying HTTP client.
pub struct SentimentAnalyzer {
    client: GeminiClient,
    http: reqwest::Client,
    concurrency: usize,
}

impl SentimentAnalyzer {
    pub fn new(config: &LlmConfig) -> PipelineResult<Self> {
        let client = GeminiClient::new(config)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(IMAGE_TIMEOUT_SECONDS))
            .user_agent("marketmood/0.1.0")
            .build()
            .map_err(PipelineError::Network)?;

        Ok(Self {
            client,
            http,
            concurrency: DEFAULT_CONCURRENCY,
        })
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Analyze one economic event. Never fails; unrecoverable errors
    /// yield a neutral score with the failure recorded in metadata.
    pub async fn analyze_event(&self, event: &EconomicEvent) -> AnalysisResult {
        let prompt = SentimentPrompts::event_prompt(&event.llm_fields());

        match self.client.generate(&[RequestPart::Text(prompt)]).await {
            Ok(outcome) => {
                let parsed = parse::parse_response(&outcome.text);
                if let Some(reason) = &parsed.parse_error {
                    debug!("Event {} response needed fallback: {}", event.id, reason);
                }
                AnalysisResult {
                    sentiment_score: parsed.score,
                    reasoning: parsed.reasoning,
                    symbols: Vec::new(),
                    symbol_sentiments: BTreeMap::new(),
                    raw_response: json!({ "text": outcome.text }),
                    metadata: AnalysisMetadata {
                        model: self.client.model().to_string(),
                        retries: outcome.retries,
                        ..Default::default()
                    },
                }
            }
            Err(e) => self.failure_result(e, false),
        }
    }

    /// Analyze one forum post, attaching its image when one is linked
    /// and downloadable. A failed download switches to the explicit
    /// text-only fallback prompt.
    pub async fn analyze_post(&self, post: &ForumPost) -> AnalysisResult {
        let title = post.title.as_str();
        let body = post.body.as_deref();
        let url = post.url.as_deref();

        let mut image_download_failed = false;
        let mut image_failure_reason: Option<String> = None;

        let mut parts: Vec<RequestPart> = Vec::new();
        match url.filter(|u| images::is_image_url(u)) {
            Some(image_url) => {
                match images::download(&self.http, image_url, IMAGE_MAX_ATTEMPTS, IMAGE_TIMEOUT_SECONDS)
                    .await
                {
                    Ok(image) => {
                        parts.push(RequestPart::Text(SentimentPrompts::post_with_image_prompt(
                            title, body, url,
                        )));
                        parts.push(RequestPart::InlineImage {
                            mime_type: image.mime_type,
                            data: image.bytes,
                        });
                    }
                    Err(e) => {
                        warn!("Falling back to text-only analysis for {}: {}", post.external_id, e);
                        image_download_failed = true;
                        image_failure_reason = Some(e.to_string());
                        parts.push(RequestPart::Text(
                            SentimentPrompts::post_image_unavailable_prompt(title, body, url),
                        ));
                    }
                }
            }
            None => {
                parts.push(RequestPart::Text(SentimentPrompts::post_prompt(
                    title, body, url,
                )));
            }
        }

        match self.client.generate(&parts).await {
            Ok(outcome) => {
                let parsed = parse::parse_response(&outcome.text);

                // LLM symbols stay authoritative for scoring; the regex
                // extractor only widens the stored list
                let text = format!("{} {}", title, body.unwrap_or_default());
                let extracted = tickers::extract_tickers(&text);
                let symbols = tickers::merge_symbols(&parsed.symbols, &extracted);

                AnalysisResult {
                    sentiment_score: parsed.score,
                    reasoning: parsed.reasoning,
                    symbols,
                    symbol_sentiments: parsed.symbol_sentiments,
                    raw_response: json!({ "text": outcome.text }),
                    metadata: AnalysisMetadata {
                        model: self.client.model().to_string(),
                        retries: outcome.retries,
                        image_download_failed,
                        failure_reason: image_failure_reason,
                        rate_limit_exhausted: false,
                    },
                }
            }
            Err(e) => {
                let mut result = self.failure_result(e, image_download_failed);
                if let Some(image_reason) = image_failure_reason {
                    let llm_reason = result.metadata.failure_reason.take().unwrap_or_default();
                    result.metadata.failure_reason =
                        Some(format!("{}; image: {}", llm_reason, image_reason));
                }
                result
            }
        }
    }

    /// Analyze a batch of events with bounded parallelism.
    /// Output order matches input order; individual failures yield
    /// neutral results rather than aborting the batch.
    pub async fn analyze_events(&self, events: &[EconomicEvent]) -> Vec<AnalysisResult> {
        stream::iter(events)
            .map(|event| self.analyze_event(event))
            .buffered(self.concurrency)
            .collect()
            .await
    }

    /// Analyze a batch of posts with bounded parallelism, preserving
    /// input order.
    pub async fn analyze_posts(&self, posts: &[ForumPost]) -> Vec<AnalysisResult> {
        stream::iter(posts)
            .map(|post| self.analyze_post(post))
            .buffered(self.concurrency)
            .collect()
            .await
    }

    fn failure_result(&self, error: PipelineError, image_download_failed: bool) -> AnalysisResult {
        let rate_limit_exhausted = matches!(error, PipelineError::RateLimit { .. });
        let message = error.to_string();

        AnalysisResult {
            sentiment_score: 0.0,
            reasoning: String::new(),
            symbols: Vec::new(),
            symbol_sentiments: BTreeMap::new(),
            raw_response: json!({ "error": message }),
            metadata: AnalysisMetadata {
                model: self.client.model().to_string(),
                retries: 0,
                image_download_failed,
                failure_reason: Some(message),
                rate_limit_exhausted,
            },
        }
    }
}

impl AnalysisResult {
    /// True when the underlying call exhausted its rate-limit retries;
    /// the pipeline treats this as fatal for the run.
    pub fn is_rate_limited(&self) -> bool {
        self.metadata.rate_limit_exhausted
    }
}
