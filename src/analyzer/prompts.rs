//! Prompt builders for sentiment analysis.
//! One builder per item kind and image-availability state.

use crate::models::EventFields;

/// Format an optional value for a prompt, substituting "N/A"
pub fn format_value(value: &Option<String>) -> String {
    match value {
        Some(s) if !s.trim().is_empty() => s.clone(),
        _ => "N/A".to_string(),
    }
}

/// Prompt template builders for the sentiment analyzer
pub struct SentimentPrompts;

impl SentimentPrompts {
    /// Scoring prompt for an economic calendar event
    pub fn event_prompt(fields: &EventFields) -> String {
        format!(
            r#"Analyze the following economic event and provide a sentiment score.

Event: {event_name}
Currency: {currency}
Impact Level: {impact}
Actual: {actual}
Forecast: {forecast}
Previous: {previous}

Score the sentiment impact on {currency} from -1.0 (strongly bearish) to 1.0 (strongly bullish).

Consider:
- Whether actual beat/missed forecast
- The magnitude of the difference
- The impact level of the release
- Historical significance of this indicator
- Market expectations

Respond with JSON only:
{{"score": <float>, "reasoning": "<brief explanation>"}}"#,
            event_name = fields.event_name,
            currency = fields.currency,
            impact = fields.impact,
            actual = format_value(&fields.actual),
            forecast = format_value(&fields.forecast),
            previous = format_value(&fields.previous),
        )
    }

    /// Scoring prompt for a text-only forum post
    pub fn post_prompt(title: &str, body: Option<&str>, url: Option<&str>) -> String {
        format!(
            r#"Analyze the market sentiment of the following forum post.

Title: {title}
Body: {body}
URL: {url}

Score the overall sentiment from -1.0 (strongly bearish) to 1.0 (strongly bullish).
Identify any stock tickers, crypto symbols, or forex pairs the post discusses
and score the sentiment toward each one individually.

Respond with JSON only:
{{"score": <float>, "reasoning": "<brief explanation>", "symbols": ["<ticker>", ...], "symbol_sentiments": {{"<ticker>": <float>, ...}}}}"#,
            title = title,
            body = body.filter(|b| !b.trim().is_empty()).unwrap_or("N/A"),
            url = url.unwrap_or("N/A"),
        )
    }

    /// Scoring prompt for a post with an attached image.
    /// The image is sent as a separate inline part of the same request.
    pub fn post_with_image_prompt(title: &str, body: Option<&str>, url: Option<&str>) -> String {
        format!(
            r#"Analyze the market sentiment of the following forum post and its attached image.
The image may contain a chart, a position screenshot, or a meme relevant to the sentiment.

Title: {title}
Body: {body}
URL: {url}

Score the overall sentiment from -1.0 (strongly bearish) to 1.0 (strongly bullish),
taking both the text and the image into account.
Identify any stock tickers, crypto symbols, or forex pairs involved
and score the sentiment toward each one individually.

Respond with JSON only:
{{"score": <float>, "reasoning": "<brief explanation>", "symbols": ["<ticker>", ...], "symbol_sentiments": {{"<ticker>": <float>, ...}}}}"#,
            title = title,
            body = body.filter(|b| !b.trim().is_empty()).unwrap_or("N/A"),
            url = url.unwrap_or("N/A"),
        )
    }

    /// Fallback prompt used when the post links an image that could not
    /// be downloaded. The URL stays in the prompt and the analyzer is
    /// told to reason from the text alone.
    pub fn post_image_unavailable_prompt(
        title: &str,
        body: Option<&str>,
        url: Option<&str>,
    ) -> String {
        format!(
            r#"Analyze the market sentiment of the following forum post.

Title: {title}
Body: {body}
Image URL: {url}

Note: the linked image could not be downloaded and is NOT available.
Do not guess at its contents. Reason from the title, body, and context only.

Score the overall sentiment from -1.0 (strongly bearish) to 1.0 (strongly bullish).
Identify any stock tickers, crypto symbols, or forex pairs the post discusses
and score the sentiment toward each one individually.

Respond with JSON only:
{{"score": <float>, "reasoning": "<brief explanation>", "symbols": ["<ticker>", ...], "symbol_sentiments": {{"<ticker>": <float>, ...}}}}"#,
            title = title,
            body = body.filter(|b| !b.trim().is_empty()).unwrap_or("N/A"),
            url = url.unwrap_or("N/A"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_value_substitutes_na() {
        assert_eq!(format_value(&Some("272K".to_string())), "272K");
        assert_eq!(format_value(&Some("  ".to_string())), "N/A");
        assert_eq!(format_value(&None), "N/A");
    }

    #[test]
    fn test_event_prompt_contains_all_fields() {
        let fields = EventFields {
            event_name: "Non-Farm Payrolls".to_string(),
            currency: "USD".to_string(),
            impact: "high".to_string(),
            actual: Some("272K".to_string()),
            forecast: Some("180K".to_string()),
            previous: None,
        };
        let prompt = SentimentPrompts::event_prompt(&fields);

        assert!(prompt.contains("Non-Farm Payrolls"));
        assert!(prompt.contains("Currency: USD"));
        assert!(prompt.contains("Actual: 272K"));
        assert!(prompt.contains("Previous: N/A"));
        assert!(prompt.contains(r#""score""#));
    }

    #[test]
    fn test_image_unavailable_prompt_keeps_url_and_notes_failure() {
        let prompt = SentimentPrompts::post_image_unavailable_prompt(
            "Look at this chart",
            None,
            Some("http://example.test/x.png"),
        );

        assert!(prompt.contains("http://example.test/x.png"));
        assert!(prompt.contains("NOT available"));
        assert!(prompt.contains("Reason from the title, body, and context only"));
    }

    #[test]
    fn test_post_prompt_asks_for_symbols() {
        let prompt = SentimentPrompts::post_prompt("Bought $NVDA calls", Some("to the moon"), None);
        assert!(prompt.contains("symbol_sentiments"));
        assert!(prompt.contains("Body: to the moon"));
    }
}
