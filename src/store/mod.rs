//! Persistence layer for events and posts.
//!
//! Every function operates on a `PgConnection` so callers control
//! transaction boundaries: the pipeline threads one rolled-back
//! transaction through every phase in dry-run mode, wraps each upsert
//! phase in its own transaction otherwise, and lets per-row score
//! updates auto-commit so partial failures keep earlier progress.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgConnection;
use tracing::debug;

use crate::analyzer::parse::clamp_score;
use crate::error::PipelineResult;
use crate::models::{EconomicEvent, ForumPost, NewEvent, NewPost};

/// Upsert scraped events, matching on (timestamp, event_name, currency).
/// Conflicts refresh the value columns and updated_at but never touch
/// an existing sentiment_score. Returns the number of rows written.
pub async fn upsert_events(conn: &mut PgConnection, events: &[NewEvent]) -> PipelineResult<u64> {
    let mut written = 0u64;

    for event in events {
        let result = sqlx::query(
            r#"
            INSERT INTO economic_events
                (timestamp, currency, event_name, impact, actual, forecast, previous, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
            ON CONFLICT (timestamp, event_name, currency) DO UPDATE SET
                impact = EXCLUDED.impact,
                actual = EXCLUDED.actual,
                forecast = EXCLUDED.forecast,
                previous = EXCLUDED.previous,
                updated_at = NOW()
            "#,
        )
        .bind(event.timestamp)
        .bind(&event.currency)
        .bind(&event.event_name)
        .bind(event.impact.as_str())
        .bind(&event.actual)
        .bind(&event.forecast)
        .bind(&event.previous)
        .execute(&mut *conn)
        .await?;

        written += result.rows_affected();
    }

    debug!("Upserted {} events", written);
    Ok(written)
}

/// Upsert fetched posts, matching on external_id. Conflicts refresh the
/// vote counts and fetch time while preserving analysis columns.
pub async fn upsert_posts(conn: &mut PgConnection, posts: &[NewPost]) -> PipelineResult<u64> {
    let mut written = 0u64;

    for post in posts {
        let result = sqlx::query(
            r#"
            INSERT INTO forum_posts
                (external_id, channel, title, body, url, score, num_comments, flair,
                 timestamp, fetched_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW(), NOW())
            ON CONFLICT (external_id) DO UPDATE SET
                score = EXCLUDED.score,
                num_comments = EXCLUDED.num_comments,
                flair = EXCLUDED.flair,
                fetched_at = NOW(),
                updated_at = NOW()
            "#,
        )
        .bind(&post.external_id)
        .bind(&post.channel)
        .bind(&post.title)
        .bind(&post.body)
        .bind(&post.url)
        .bind(post.score)
        .bind(post.num_comments)
        .bind(&post.flair)
        .bind(post.timestamp)
        .execute(&mut *conn)
        .await?;

        written += result.rows_affected();
    }

    debug!("Upserted {} posts", written);
    Ok(written)
}

/// Events awaiting analysis: unscored, with a released actual value,
/// and not holidays.
pub async fn unscored_events(conn: &mut PgConnection) -> PipelineResult<Vec<EconomicEvent>> {
    let events = sqlx::query_as::<_, EconomicEvent>(
        r#"
        SELECT * FROM economic_events
        WHERE sentiment_score IS NULL
          AND actual IS NOT NULL
          AND impact <> 'holiday'
        ORDER BY timestamp ASC
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(events)
}

/// Posts awaiting analysis.
pub async fn unscored_posts(conn: &mut PgConnection) -> PipelineResult<Vec<ForumPost>> {
    let posts = sqlx::query_as::<_, ForumPost>(
        r#"
        SELECT * FROM forum_posts
        WHERE sentiment_score IS NULL
        ORDER BY timestamp ASC
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(posts)
}

/// Write one event's score. The score is clamped to [-1, 1] here so no
/// out-of-range value ever reaches the table.
pub async fn update_event_score(
    conn: &mut PgConnection,
    id: i32,
    score: f64,
    raw_response: &Value,
) -> PipelineResult<()> {
    sqlx::query(
        r#"
        UPDATE economic_events
        SET sentiment_score = $2, raw_response = $3, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(clamp_score(score))
    .bind(raw_response)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Write one post's score together with its symbol data.
pub async fn update_post_score(
    conn: &mut PgConnection,
    id: i32,
    score: f64,
    raw_response: &Value,
    symbols: &[String],
    symbol_sentiments: &Value,
) -> PipelineResult<()> {
    sqlx::query(
        r#"
        UPDATE forum_posts
        SET sentiment_score = $2,
            raw_response = $3,
            symbols = $4,
            symbol_sentiments = $5,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(clamp_score(score))
    .bind(raw_response)
    .bind(symbols)
    .bind(symbol_sentiments)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Scored events for one currency inside a time window, newest first.
pub async fn events_for_currency(
    conn: &mut PgConnection,
    currency: &str,
    since: DateTime<Utc>,
) -> PipelineResult<Vec<EconomicEvent>> {
    let events = sqlx::query_as::<_, EconomicEvent>(
        r#"
        SELECT * FROM economic_events
        WHERE currency = $1
          AND timestamp >= $2
          AND sentiment_score IS NOT NULL
        ORDER BY timestamp DESC
        "#,
    )
    .bind(currency)
    .bind(since)
    .fetch_all(&mut *conn)
    .await?;

    Ok(events)
}

/// Mean sentiment and event count for one currency inside a window.
pub async fn currency_sentiment(
    conn: &mut PgConnection,
    currency: &str,
    since: DateTime<Utc>,
) -> PipelineResult<(f64, i64)> {
    let row: (Option<f64>, i64) = sqlx::query_as(
        r#"
        SELECT AVG(sentiment_score), COUNT(*)
        FROM economic_events
        WHERE currency = $1
          AND timestamp >= $2
          AND sentiment_score IS NOT NULL
        "#,
    )
    .bind(currency)
    .bind(since)
    .fetch_one(&mut *conn)
    .await?;

    Ok((row.0.unwrap_or(0.0), row.1))
}

pub async fn event_count(conn: &mut PgConnection) -> PipelineResult<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM economic_events")
        .fetch_one(&mut *conn)
        .await?;
    Ok(row.0)
}

pub async fn post_count(conn: &mut PgConnection) -> PipelineResult<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM forum_posts")
        .fetch_one(&mut *conn)
        .await?;
    Ok(row.0)
}

