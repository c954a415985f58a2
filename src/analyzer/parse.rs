//! Response parsing for the sentiment analyzer.
//! Strict JSON extraction first, then a keyword heuristic fallback so a
//! drifting model never takes the pipeline down.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;

/// Parsed analyzer response, post-validation
#[derive(Debug, Clone, Default)]
pub struct ParsedResponse {
    pub score: f64,
    pub reasoning: String,
    pub symbols: Vec<String>,
    pub symbol_sentiments: BTreeMap<String, f64>,
    pub parse_error: Option<String>,
}

/// Clamp a score into [-1.0, 1.0]. Non-finite values collapse to 0.0.
pub fn clamp_score(score: f64) -> f64 {
    if !score.is_finite() {
        return 0.0;
    }
    score.clamp(-1.0, 1.0)
}

/// Extract a JSON object from text that may contain markdown fences or
/// surrounding prose.
pub fn extract_json(text: &str) -> Option<String> {
    // JSON wrapped in a ```json fence
    if let Some(start) = text.find("```json") {
        if let Some(end) = text[start + 7..].find("```") {
            return Some(text[start + 7..start + 7 + end].trim().to_string());
        }
    }

    // JSON wrapped in a bare fence
    if let Some(start) = text.find("```") {
        if let Some(end) = text[start + 3..].find("```") {
            let candidate = text[start + 3..start + 3 + end].trim();
            if candidate.starts_with('{') {
                return Some(candidate.to_string());
            }
        }
    }

    // Outermost brace-balanced object
    if let Some(start) = text.find('{') {
        let mut depth = 0;
        for (i, c) in text[start..].char_indices() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(text[start..start + i + 1].to_string());
                    }
                }
                _ => {}
            }
        }
    }

    None
}

/// Parse an analyzer response into a validated result.
/// Falls back to keyword heuristics when no parseable JSON is found.
pub fn parse_response(text: &str) -> ParsedResponse {
    if text.trim().is_empty() {
        return ParsedResponse {
            parse_error: Some("empty response".to_string()),
            ..Default::default()
        };
    }

    if let Some(json_str) = extract_json(text) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&json_str) {
            return parse_json_payload(&value);
        }
    }

    // No valid JSON anywhere; score from the raw text
    let (score, reasoning) = score_from_text(text);
    ParsedResponse {
        score,
        reasoning,
        parse_error: Some("no valid JSON in response, used text fallback".to_string()),
        ..Default::default()
    }
}

fn parse_json_payload(value: &serde_json::Value) -> ParsedResponse {
    let mut parse_error = None;

    let score = match value.get("score") {
        Some(raw) => match coerce_number(raw) {
            Some(n) => clamp_score(n),
            None => {
                parse_error = Some(format!("invalid score value: {}", raw));
                0.0
            }
        },
        None => {
            parse_error = Some("missing 'score' field in response".to_string());
            0.0
        }
    };

    let reasoning = value
        .get("reasoning")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let symbols = dedup_symbols(
        value
            .get("symbols")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default(),
    );

    let symbol_sentiments = value
        .get("symbol_sentiments")
        .and_then(|v| v.as_object())
        .map(|obj| {
            let raw: BTreeMap<String, f64> = obj
                .iter()
                .filter_map(|(k, v)| coerce_number(v).map(|n| (k.to_uppercase(), n)))
                .collect();
            filter_sentiments(raw, &symbols)
        })
        .unwrap_or_default();

    ParsedResponse {
        score,
        reasoning,
        symbols,
        symbol_sentiments,
        parse_error,
    }
}

fn coerce_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

lazy_static! {
    static ref SCORE_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)score[:\s]+is[:\s]+(-?\d+\.?\d*)").expect("valid score regex"),
        Regex::new(r"(?i)score[:\s]+(-?\d+\.?\d*)").expect("valid score regex"),
        Regex::new(r"(?i)sentiment[:\s]+score[:\s]+(-?\d+\.?\d*)").expect("valid score regex"),
    ];
}

/// Keyword fallback when the response carries no parseable JSON.
/// Explicit score mentions win; otherwise sentiment cues map to a
/// coarse score.
pub fn score_from_text(text: &str) -> (f64, String) {
    let reasoning = text.trim().to_string();
    if reasoning.is_empty() {
        return (0.0, reasoning);
    }

    let lower = reasoning.to_lowercase();

    for pattern in SCORE_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(&lower) {
            if let Ok(score) = caps[1].parse::<f64>() {
                return (clamp_score(score), reasoning);
            }
        }
    }

    const STRONG_BULLISH: [&str; 3] = ["strongly bullish", "very bullish", "extremely positive"];
    const STRONG_BEARISH: [&str; 3] = ["strongly bearish", "very bearish", "extremely negative"];
    const BULLISH: [&str; 4] = ["bullish", "positive", "optimistic", "favorable"];
    const BEARISH: [&str; 4] = ["bearish", "negative", "pessimistic", "unfavorable"];
    const NEUTRAL: [&str; 4] = ["neutral", "no change", "unchanged", "mixed"];

    if STRONG_BULLISH.iter().any(|p| lower.contains(p)) {
        return (0.8, reasoning);
    }
    if STRONG_BEARISH.iter().any(|p| lower.contains(p)) {
        return (-0.8, reasoning);
    }
    if BULLISH.iter().any(|p| lower.contains(p)) {
        return (0.3, reasoning);
    }
    if BEARISH.iter().any(|p| lower.contains(p)) {
        return (-0.3, reasoning);
    }
    if NEUTRAL.iter().any(|p| lower.contains(p)) {
        return (0.0, reasoning);
    }

    (0.0, reasoning)
}

/// Deduplicate symbols preserving first occurrence. Symbols are
/// uppercased; empties are dropped.
pub fn dedup_symbols(raw: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::new();
    for symbol in raw {
        let normalized = symbol.trim().to_uppercase();
        if normalized.is_empty() {
            continue;
        }
        if seen.insert(normalized.clone()) {
            result.push(normalized);
        }
    }
    result
}

/// Keep only sentiment entries whose symbol appears in the symbols
/// list, clamping each value.
pub fn filter_sentiments(
    raw: BTreeMap<String, f64>,
    symbols: &[String],
) -> BTreeMap<String, f64> {
    raw.into_iter()
        .filter(|(k, _)| symbols.iter().any(|s| s == k))
        .map(|(k, v)| (k, clamp_score(v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_score() {
        assert_eq!(clamp_score(0.5), 0.5);
        assert_eq!(clamp_score(2.5), 1.0);
        assert_eq!(clamp_score(-3.0), -1.0);
        assert_eq!(clamp_score(f64::NAN), 0.0);
    }

    #[test]
    fn test_parse_clean_json() {
        let result = parse_response(r#"{"score": 0.75, "reasoning": "strong beat"}"#);
        assert_eq!(result.score, 0.75);
        assert_eq!(result.reasoning, "strong beat");
        assert!(result.parse_error.is_none());
    }

    #[test]
    fn test_parse_fenced_json_clamps_out_of_range_score() {
        let result = parse_response("```json\n{\"score\": 2.5, \"reasoning\": \"strong beat\"}\n```");
        assert_eq!(result.score, 1.0);
        assert_eq!(result.reasoning, "strong beat");
    }

    #[test]
    fn test_parse_json_with_surrounding_prose() {
        let result =
            parse_response("Here is my analysis:\n{\"score\": -0.4, \"reasoning\": \"miss\"}\nHope that helps!");
        assert_eq!(result.score, -0.4);
    }

    #[test]
    fn test_missing_score_defaults_to_zero() {
        let result = parse_response(r#"{"reasoning": "unclear"}"#);
        assert_eq!(result.score, 0.0);
        assert!(result.parse_error.is_some());
    }

    #[test]
    fn test_non_numeric_score_defaults_to_zero() {
        let result = parse_response(r#"{"score": "very high", "reasoning": "x"}"#);
        assert_eq!(result.score, 0.0);
        assert!(result.parse_error.is_some());
    }

    #[test]
    fn test_string_score_is_coerced() {
        let result = parse_response(r#"{"score": "0.6", "reasoning": "x"}"#);
        assert_eq!(result.score, 0.6);
        assert!(result.parse_error.is_none());
    }

    #[test]
    fn test_free_text_bearish_fallback() {
        let result = parse_response("looks bearish to me");
        assert_eq!(result.score, -0.3);
        assert_eq!(result.reasoning, "looks bearish to me");
        assert!(result.parse_error.is_some());
    }

    #[test]
    fn test_free_text_explicit_score() {
        let (score, _) = score_from_text("I'd say the score is 0.6 overall");
        assert_eq!(score, 0.6);
    }

    #[test]
    fn test_free_text_strong_cues() {
        assert_eq!(score_from_text("strongly bullish setup").0, 0.8);
        assert_eq!(score_from_text("very bearish data").0, -0.8);
        assert_eq!(score_from_text("pretty neutral print").0, 0.0);
    }

    #[test]
    fn test_symbols_dedup_preserves_first_occurrence() {
        let symbols = dedup_symbols(vec![
            "NVDA".to_string(),
            "aapl".to_string(),
            "NVDA".to_string(),
            "BTC".to_string(),
            "AAPL".to_string(),
        ]);
        assert_eq!(symbols, vec!["NVDA", "AAPL", "BTC"]);
    }

    #[test]
    fn test_symbol_sentiments_restricted_to_symbols() {
        let response = r#"{
            "score": 0.7,
            "reasoning": "mixed positions",
            "symbols": ["NVDA", "AAPL", "BTC"],
            "symbol_sentiments": {"NVDA": 0.9, "AAPL": -0.7, "BTC": 0.3, "TSLA": 0.5}
        }"#;
        let result = parse_response(response);

        assert_eq!(result.symbols, vec!["NVDA", "AAPL", "BTC"]);
        assert_eq!(result.symbol_sentiments.len(), 3);
        assert!(!result.symbol_sentiments.contains_key("TSLA"));
        assert_eq!(result.symbol_sentiments["NVDA"], 0.9);
        assert_eq!(result.symbol_sentiments["AAPL"], -0.7);
    }

    #[test]
    fn test_sentiment_values_are_clamped() {
        let mut raw = BTreeMap::new();
        raw.insert("NVDA".to_string(), 3.0);
        let filtered = filter_sentiments(raw, &["NVDA".to_string()]);
        assert_eq!(filtered["NVDA"], 1.0);
    }

    #[test]
    fn test_empty_response() {
        let result = parse_response("   ");
        assert_eq!(result.score, 0.0);
        assert!(result.parse_error.is_some());
    }
}
