//! Persisted entities and their LLM-facing projections

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Canonical impact levels for economic events. Stored lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    High,
    Medium,
    Low,
    Holiday,
}

impl Impact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Impact::High => "high",
            Impact::Medium => "medium",
            Impact::Low => "low",
            Impact::Holiday => "holiday",
        }
    }

    /// Parse a stored token. Unknown tokens default to low.
    pub fn parse(s: &str) -> Impact {
        match s.trim().to_lowercase().as_str() {
            "high" => Impact::High,
            "medium" => Impact::Medium,
            "holiday" => Impact::Holiday,
            _ => Impact::Low,
        }
    }
}

impl std::fmt::Display for Impact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Economic calendar event as persisted
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EconomicEvent {
    pub id: i32,
    pub timestamp: DateTime<Utc>,
    pub currency: String,
    pub event_name: String,
    pub impact: String,
    pub actual: Option<String>,
    pub forecast: Option<String>,
    pub previous: Option<String>,
    pub sentiment_score: Option<f64>,
    pub raw_response: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EconomicEvent {
    /// Projection of the fields submitted to the LLM for scoring
    pub fn llm_fields(&self) -> EventFields {
        EventFields {
            event_name: self.event_name.clone(),
            currency: self.currency.clone(),
            impact: self.impact.clone(),
            actual: self.actual.clone(),
            forecast: self.forecast.clone(),
            previous: self.previous.clone(),
        }
    }
}

/// The event fields the analyzer prompts with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFields {
    pub event_name: String,
    pub currency: String,
    pub impact: String,
    pub actual: Option<String>,
    pub forecast: Option<String>,
    pub previous: Option<String>,
}

impl EventFields {
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("event_name".into(), Value::String(self.event_name.clone()));
        map.insert("currency".into(), Value::String(self.currency.clone()));
        map.insert("impact".into(), Value::String(self.impact.clone()));
        map.insert("actual".into(), opt_string(&self.actual));
        map.insert("forecast".into(), opt_string(&self.forecast));
        map.insert("previous".into(), opt_string(&self.previous));
        map
    }

    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            event_name: map_string(map, "event_name"),
            currency: map_string(map, "currency"),
            impact: map_string(map, "impact"),
            actual: map_opt_string(map, "actual"),
            forecast: map_opt_string(map, "forecast"),
            previous: map_opt_string(map, "previous"),
        }
    }
}

fn opt_string(value: &Option<String>) -> Value {
    match value {
        Some(s) => Value::String(s.clone()),
        None => Value::Null,
    }
}

fn map_string(map: &Map<String, Value>, key: &str) -> String {
    map.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn map_opt_string(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Freshly scraped event, not yet persisted
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub timestamp: DateTime<Utc>,
    pub currency: String,
    pub event_name: String,
    pub impact: Impact,
    pub actual: Option<String>,
    pub forecast: Option<String>,
    pub previous: Option<String>,
    /// Source listed this event without a firm time
    pub tentative: bool,
}

/// Forum post as persisted
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ForumPost {
    pub id: i32,
    pub external_id: String,
    pub channel: String,
    pub title: String,
    pub body: Option<String>,
    pub url: Option<String>,
    pub score: i32,
    pub num_comments: i32,
    pub flair: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub symbols: Option<Vec<String>>,
    pub symbol_sentiments: Option<Value>,
    pub sentiment_score: Option<f64>,
    pub raw_response: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Freshly fetched post, not yet persisted
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub external_id: String,
    pub channel: String,
    pub title: String,
    pub body: Option<String>,
    pub url: Option<String>,
    pub score: i32,
    pub num_comments: i32,
    pub flair: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impact_parse_defaults_to_low() {
        assert_eq!(Impact::parse("high"), Impact::High);
        assert_eq!(Impact::parse("Medium"), Impact::Medium);
        assert_eq!(Impact::parse("HOLIDAY"), Impact::Holiday);
        assert_eq!(Impact::parse("non-economic"), Impact::Low);
        assert_eq!(Impact::parse(""), Impact::Low);
    }

    #[test]
    fn test_event_fields_round_trip() {
        let fields = EventFields {
            event_name: "Non-Farm Payrolls".to_string(),
            currency: "USD".to_string(),
            impact: "high".to_string(),
            actual: Some("272K".to_string()),
            forecast: Some("180K".to_string()),
            previous: None,
        };

        let restored = EventFields::from_map(&fields.to_map());
        assert_eq!(restored, fields);
    }
}
