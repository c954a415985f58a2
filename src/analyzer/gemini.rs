//! HTTP client for the Gemini generateContent endpoint.
//! Supports multimodal requests with inline image parts and retries
//! rate-limit and transient failures with exponential backoff.

use std::time::Duration;

use base64::Engine;
use serde_json::{json, Value};
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::config::LlmConfig;
use crate::error::{PipelineError, PipelineResult};

/// One part of a generateContent request
#[derive(Debug, Clone)]
pub enum RequestPart {
    Text(String),
    InlineImage { mime_type: String, data: Vec<u8> },
}

/// Result of a completed generation, with the retry count that
/// produced it
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub text: String,
    pub retries: u32,
}

/// Gemini API client. Cheap to clone via the shared reqwest client;
/// safe to use concurrently.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout_seconds: u64,
    max_retries: u32,
    base_delay: Duration,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig) -> PipelineResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                PipelineError::Config("LLM_API_KEY is required for sentiment analysis".to_string())
            })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent("marketmood/0.1.0")
            .build()
            .map_err(PipelineError::Network)?;

        Ok(Self {
            http,
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_seconds: config.timeout_seconds,
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Submit a generation request and return the response text.
    /// Rate-limit and transient errors are retried with exponential
    /// backoff; other API errors surface immediately.
    pub async fn generate(&self, parts: &[RequestPart]) -> PipelineResult<GenerationOutcome> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = build_request_body(parts);

        let mut retries: u32 = 0;
        loop {
            let err = match self.attempt(&url, &body).await {
                Ok(text) => return Ok(GenerationOutcome { text, retries }),
                Err(e) => e,
            };

            if err.is_retryable() && retries < self.max_retries {
                let delay = self.base_delay * 2u32.pow(retries);
                warn!(
                    "LLM call failed (attempt {}/{}), retrying in {:?}: {}",
                    retries + 1,
                    self.max_retries,
                    delay,
                    err
                );
                tokio::time::sleep(delay).await;
                retries += 1;
                continue;
            }

            error!("LLM call failed after {} retries: {}", retries, err);
            return Err(err);
        }
    }

    async fn attempt(&self, url: &str, body: &Value) -> PipelineResult<String> {
        let response = match timeout(
            Duration::from_secs(self.timeout_seconds),
            self.http.post(url).json(body).send(),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(PipelineError::Network(e)),
            Err(_) => {
                return Err(PipelineError::Timeout {
                    timeout_seconds: self.timeout_seconds,
                })
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(classify_api_error(status.as_u16(), &body_text));
        }

        let payload: Value = response.json().await?;
        let text = extract_text(&payload).ok_or_else(|| {
            PipelineError::parse_error("no text candidates in LLM response")
        })?;

        debug!("LLM returned {} chars", text.len());
        Ok(text)
    }
}

fn build_request_body(parts: &[RequestPart]) -> Value {
    let encoded: Vec<Value> = parts
        .iter()
        .map(|part| match part {
            RequestPart::Text(text) => json!({ "text": text }),
            RequestPart::InlineImage { mime_type, data } => json!({
                "inline_data": {
                    "mime_type": mime_type,
                    "data": base64::engine::general_purpose::STANDARD.encode(data),
                }
            }),
        })
        .collect();

    json!({ "contents": [{ "parts": encoded }] })
}

/// Concatenate all text parts of the first candidate.
fn extract_text(payload: &Value) -> Option<String> {
    let parts = payload
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("");

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn classify_api_error(status: u16, body: &str) -> PipelineError {
    if status == 429 || body.contains("RESOURCE_EXHAUSTED") {
        return PipelineError::RateLimit { retry_after: 30 };
    }
    PipelineError::api_error(status, truncate(body, 200))
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}
