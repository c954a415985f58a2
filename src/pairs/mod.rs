//! Directional sentiment for currency pairs, derived from per-currency
//! event scores over a lookback window.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;

use crate::analyzer::parse::clamp_score;
use crate::error::{PipelineError, PipelineResult};
use crate::store;

/// Default lookback window: one week
pub const DEFAULT_LOOKBACK_HOURS: i64 = 168;

/// The supported currency pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FxPair {
    EurUsd,
    GbpUsd,
    UsdJpy,
    UsdChf,
    AudUsd,
    UsdCad,
    NzdUsd,
    EurGbp,
    EurJpy,
    GbpJpy,
}

impl FxPair {
    pub const ALL: [FxPair; 10] = [
        FxPair::EurUsd,
        FxPair::GbpUsd,
        FxPair::UsdJpy,
        FxPair::UsdChf,
        FxPair::AudUsd,
        FxPair::UsdCad,
        FxPair::NzdUsd,
        FxPair::EurGbp,
        FxPair::EurJpy,
        FxPair::GbpJpy,
    ];

    pub fn base(&self) -> &'static str {
        match self {
            FxPair::EurUsd | FxPair::EurGbp | FxPair::EurJpy => "EUR",
            FxPair::GbpUsd | FxPair::GbpJpy => "GBP",
            FxPair::UsdJpy | FxPair::UsdChf | FxPair::UsdCad => "USD",
            FxPair::AudUsd => "AUD",
            FxPair::NzdUsd => "NZD",
        }
    }

    pub fn quote(&self) -> &'static str {
        match self {
            FxPair::EurUsd | FxPair::GbpUsd | FxPair::AudUsd | FxPair::NzdUsd => "USD",
            FxPair::UsdJpy | FxPair::EurJpy | FxPair::GbpJpy => "JPY",
            FxPair::UsdChf => "CHF",
            FxPair::UsdCad => "CAD",
            FxPair::EurGbp => "GBP",
        }
    }

    pub fn label(&self) -> String {
        format!("{}/{}", self.base(), self.quote())
    }

    /// Parse "EURUSD", "EUR/USD", "eur-usd", etc.
    pub fn parse(s: &str) -> PipelineResult<FxPair> {
        let cleaned: String = s
            .to_uppercase()
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect();

        for pair in FxPair::ALL {
            if cleaned == format!("{}{}", pair.base(), pair.quote()) {
                return Ok(pair);
            }
        }
        Err(PipelineError::BadPair(s.to_string()))
    }
}

impl std::str::FromStr for FxPair {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FxPair::parse(s)
    }
}

impl std::fmt::Display for FxPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Aggregated sentiment for one side of a pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencySentiment {
    pub currency: String,
    pub mean: f64,
    pub count: i64,
}

/// Directional sentiment for a pair over a lookback window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairSentiment {
    pub pair: String,
    pub score: f64,
    pub base: CurrencySentiment,
    pub quote: CurrencySentiment,
    pub lookback_hours: i64,
    pub signal: &'static str,
}

impl std::fmt::Display for PairSentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let marker = if self.score >= 0.3 {
            "🟢"
        } else if self.score <= -0.3 {
            "🔴"
        } else {
            "⚪"
        };

        writeln!(f, "{} {}: {:+.3}", marker, self.pair, self.score)?;
        writeln!(
            f,
            "   {}: {:+.3} ({} events)",
            self.base.currency, self.base.mean, self.base.count
        )?;
        writeln!(
            f,
            "   {}: {:+.3} ({} events)",
            self.quote.currency, self.quote.mean, self.quote.count
        )?;
        write!(
            f,
            "   Signal: {} (last {}h)",
            self.signal, self.lookback_hours
        )
    }
}

/// Pair score: base mean minus quote mean, clamped to [-1, 1]
pub fn combine(base_mean: f64, quote_mean: f64) -> f64 {
    clamp_score(base_mean - quote_mean)
}

/// Human-readable signal tag for a pair score
pub fn signal_for(score: f64) -> &'static str {
    if score >= 0.3 {
        "Favor base strength"
    } else if score <= -0.3 {
        "Favor quote strength"
    } else {
        "Neutral"
    }
}

/// Compute directional sentiment for one pair.
pub async fn pair_sentiment(
    conn: &mut PgConnection,
    pair: FxPair,
    lookback_hours: i64,
) -> PipelineResult<PairSentiment> {
    let since = Utc::now() - Duration::hours(lookback_hours);

    let (base_mean, base_count) = store::currency_sentiment(conn, pair.base(), since).await?;
    let (quote_mean, quote_count) = store::currency_sentiment(conn, pair.quote(), since).await?;

    let score = combine(base_mean, quote_mean);

    Ok(PairSentiment {
        pair: pair.label(),
        score,
        base: CurrencySentiment {
            currency: pair.base().to_string(),
            mean: base_mean,
            count: base_count,
        },
        quote: CurrencySentiment {
            currency: pair.quote().to_string(),
            mean: quote_mean,
            count: quote_count,
        },
        lookback_hours,
        signal: signal_for(score),
    })
}

/// Sentiment for every supported pair, most actionable first.
pub async fn all_pairs_sentiment(
    conn: &mut PgConnection,
    lookback_hours: i64,
) -> PipelineResult<Vec<PairSentiment>> {
    let mut results = Vec::with_capacity(FxPair::ALL.len());
    for pair in FxPair::ALL {
        results.push(pair_sentiment(conn, pair, lookback_hours).await?);
    }

    results.sort_by(|a, b| {
        b.score
            .abs()
            .partial_cmp(&a.score.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_common_formats() {
        assert_eq!(FxPair::parse("EURUSD").unwrap(), FxPair::EurUsd);
        assert_eq!(FxPair::parse("EUR/USD").unwrap(), FxPair::EurUsd);
        assert_eq!(FxPair::parse("eur-usd").unwrap(), FxPair::EurUsd);
        assert_eq!(FxPair::parse("gbp_jpy").unwrap(), FxPair::GbpJpy);
    }

    #[test]
    fn test_unknown_pair_is_rejected() {
        assert!(matches!(
            FxPair::parse("USDMXN"),
            Err(PipelineError::BadPair(_))
        ));
        assert!(matches!(FxPair::parse(""), Err(PipelineError::BadPair(_))));
    }

    #[test]
    fn test_pair_sides() {
        assert_eq!(FxPair::EurUsd.base(), "EUR");
        assert_eq!(FxPair::EurUsd.quote(), "USD");
        assert_eq!(FxPair::UsdJpy.base(), "USD");
        assert_eq!(FxPair::EurGbp.quote(), "GBP");
        assert_eq!(FxPair::GbpJpy.label(), "GBP/JPY");
    }

    #[test]
    fn test_combine_matches_reference_scenario() {
        // EUR scores [+0.5, +0.3, +0.5], USD scores [-0.2, -0.2]
        let eur_mean = (0.5 + 0.3 + 0.5) / 3.0;
        let usd_mean = -0.2;
        let score = combine(eur_mean, usd_mean);

        assert_eq!((score * 10_000.0).round() / 10_000.0, 0.6333);
        assert_eq!(signal_for(score), "Favor base strength");
    }

    #[test]
    fn test_combine_clamps() {
        assert_eq!(combine(1.0, -1.0), 1.0);
        assert_eq!(combine(-1.0, 1.0), -1.0);
    }

    #[test]
    fn test_signal_thresholds() {
        assert_eq!(signal_for(0.3), "Favor base strength");
        assert_eq!(signal_for(-0.3), "Favor quote strength");
        assert_eq!(signal_for(0.29), "Neutral");
        assert_eq!(signal_for(-0.29), "Neutral");
        assert_eq!(signal_for(0.0), "Neutral");
    }
}
