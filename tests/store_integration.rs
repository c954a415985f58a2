//! Persistence and aggregation tests against a live PostgreSQL
//! instance, exercising the connection-level store functions the
//! pipeline calls in production.
//! Run with a scratch database:
//!   DATABASE_URL=postgresql://localhost/marketmood_test cargo test -- --ignored

use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use sqlx::{Connection, PgPool};

use marketmood::models::{Impact, NewEvent, NewPost};
use marketmood::pairs::{self, FxPair};
use marketmood::store;

/// Setup test database connection and a clean schema
async fn setup_test_db() -> PgPool {
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgresql://localhost/marketmood_test".to_string());

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    sqlx::query("DELETE FROM economic_events")
        .execute(&pool)
        .await
        .expect("Failed to clear events");
    sqlx::query("DELETE FROM forum_posts")
        .execute(&pool)
        .await
        .expect("Failed to clear posts");

    pool
}

fn nfp_event() -> NewEvent {
    NewEvent {
        timestamp: Utc.with_ymd_and_hms(2024, 6, 7, 12, 30, 0).unwrap(),
        currency: "USD".to_string(),
        event_name: "Non-Farm Payrolls".to_string(),
        impact: Impact::High,
        actual: Some("272K".to_string()),
        forecast: Some("180K".to_string()),
        previous: Some("165K".to_string()),
        tentative: false,
    }
}

fn sample_post(external_id: &str) -> NewPost {
    NewPost {
        external_id: external_id.to_string(),
        channel: "wallstreetbets".to_string(),
        title: "Bought $NVDA calls, sold $AAPL, watching BTC".to_string(),
        body: None,
        url: None,
        score: 128,
        num_comments: 34,
        flair: Some("YOLO".to_string()),
        timestamp: Utc::now() - Duration::hours(2),
    }
}

async fn seed_scored_event(pool: &PgPool, currency: &str, hours_ago: i64, score: f64) {
    sqlx::query(
        r#"
        INSERT INTO economic_events
            (timestamp, currency, event_name, impact, actual, sentiment_score)
        VALUES ($1, $2, $3, 'high', '1.0%', $4)
        "#,
    )
    .bind(Utc::now() - Duration::hours(hours_ago))
    .bind(currency)
    .bind(format!("Seeded {} event {}h", currency, hours_ago))
    .bind(score)
    .execute(pool)
    .await
    .expect("Failed to seed event");
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn test_event_upsert_is_idempotent() {
    let pool = setup_test_db().await;
    let event = nfp_event();

    let mut conn = pool.acquire().await.expect("acquire");
    store::upsert_events(&mut conn, &[event.clone()])
        .await
        .expect("first upsert");

    let first: (i64, chrono::DateTime<Utc>) =
        sqlx::query_as("SELECT COUNT(*), MAX(updated_at) FROM economic_events")
            .fetch_one(&pool)
            .await
            .expect("count");
    assert_eq!(first.0, 1);

    // Second run over the same period must not duplicate and must
    // refresh updated_at
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    store::upsert_events(&mut conn, &[event])
        .await
        .expect("second upsert");

    let second: (i64, chrono::DateTime<Utc>) =
        sqlx::query_as("SELECT COUNT(*), MAX(updated_at) FROM economic_events")
            .fetch_one(&pool)
            .await
            .expect("count");
    assert_eq!(second.0, 1);
    assert!(second.1 > first.1);
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn test_event_upsert_preserves_existing_score() {
    let pool = setup_test_db().await;
    let event = nfp_event();

    let mut conn = pool.acquire().await.expect("acquire");
    store::upsert_events(&mut conn, &[event.clone()])
        .await
        .expect("upsert");

    let events = store::unscored_events(&mut conn).await.expect("unscored");
    assert_eq!(events.len(), 1);
    store::update_event_score(&mut conn, events[0].id, 0.8, &json!({"text": "beat"}))
        .await
        .expect("score");

    // Re-scraping the same event must keep the score in place
    store::upsert_events(&mut conn, &[event])
        .await
        .expect("re-upsert");

    let (score,): (Option<f64>,) =
        sqlx::query_as("SELECT sentiment_score FROM economic_events LIMIT 1")
            .fetch_one(&pool)
            .await
            .expect("fetch");
    assert_eq!(score, Some(0.8));
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn test_unscored_events_filter() {
    let pool = setup_test_db().await;
    let mut conn = pool.acquire().await.expect("acquire");

    let scored = nfp_event();
    let mut pending_actual = nfp_event();
    pending_actual.event_name = "CPI y/y".to_string();
    pending_actual.actual = None;
    let mut holiday = nfp_event();
    holiday.event_name = "Bank Holiday".to_string();
    holiday.impact = Impact::Holiday;

    store::upsert_events(&mut conn, &[scored, pending_actual, holiday])
        .await
        .expect("upsert");

    // Only the released, non-holiday event qualifies
    let unscored = store::unscored_events(&mut conn).await.expect("unscored");
    assert_eq!(unscored.len(), 1);
    assert_eq!(unscored[0].event_name, "Non-Farm Payrolls");

    // Scoring it empties the unscored set; a second analyze pass would
    // find nothing to do
    store::update_event_score(&mut conn, unscored[0].id, 0.5, &json!({"text": "ok"}))
        .await
        .expect("score");
    let unscored = store::unscored_events(&mut conn).await.expect("unscored");
    assert!(unscored.is_empty());
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn test_post_upsert_and_score_clamping() {
    let pool = setup_test_db().await;
    let mut conn = pool.acquire().await.expect("acquire");

    store::upsert_posts(&mut conn, &[sample_post("abc123"), sample_post("abc123")])
        .await
        .expect("upsert");

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM forum_posts")
        .fetch_one(&pool)
        .await
        .expect("count");
    assert_eq!(count, 1);

    let posts = store::unscored_posts(&mut conn).await.expect("unscored");
    assert_eq!(posts.len(), 1);

    // Out-of-range score must be clamped at write time
    let symbols = vec!["NVDA".to_string(), "AAPL".to_string(), "BTC".to_string()];
    let sentiments = json!({"NVDA": 0.9, "AAPL": -0.7, "BTC": 0.3});
    store::update_post_score(&mut conn, posts[0].id, 2.5, &json!({"text": "x"}), &symbols, &sentiments)
        .await
        .expect("score");

    let row: (Option<f64>, Option<Vec<String>>, Option<serde_json::Value>) = sqlx::query_as(
        "SELECT sentiment_score, symbols, symbol_sentiments FROM forum_posts LIMIT 1",
    )
    .fetch_one(&pool)
    .await
    .expect("fetch");

    assert_eq!(row.0, Some(1.0));
    let stored_symbols = row.1.expect("symbols");
    let stored_sentiments = row.2.expect("sentiments");
    // Every sentiment key appears in the symbols list
    for key in stored_sentiments.as_object().expect("object").keys() {
        assert!(stored_symbols.iter().any(|s| s == key));
    }
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn test_rolled_back_transaction_leaves_no_rows() {
    let pool = setup_test_db().await;

    let mut conn = pool.acquire().await.expect("acquire");
    let before = store::event_count(&mut conn).await.expect("count");

    {
        let mut tx = conn.begin().await.expect("begin");
        store::upsert_events(&mut tx, &[nfp_event()])
            .await
            .expect("upsert");
        store::upsert_posts(&mut tx, &[sample_post("xyz789")])
            .await
            .expect("upsert posts");

        // Writes are visible inside the transaction
        assert_eq!(store::event_count(&mut tx).await.expect("count"), before + 1);

        tx.rollback().await.expect("rollback");
    }

    assert_eq!(store::event_count(&mut conn).await.expect("count"), before);
    assert_eq!(store::post_count(&mut conn).await.expect("count"), 0);
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn test_pair_sentiment_matches_reference_values() {
    let pool = setup_test_db().await;

    for score in [0.5, 0.3, 0.5] {
        seed_scored_event(&pool, "EUR", 24, score).await;
    }
    seed_scored_event(&pool, "USD", 24, -0.2).await;
    seed_scored_event(&pool, "USD", 48, -0.2).await;

    let mut conn = pool.acquire().await.expect("acquire");
    let sentiment = pairs::pair_sentiment(&mut conn, FxPair::EurUsd, 168)
        .await
        .expect("pair sentiment");

    assert_eq!(sentiment.base.count, 3);
    assert_eq!(sentiment.quote.count, 2);
    assert_eq!((sentiment.score * 10_000.0).round() / 10_000.0, 0.6333);
    assert_eq!(sentiment.signal, "Favor base strength");
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn test_events_for_currency_respects_window() {
    let pool = setup_test_db().await;

    seed_scored_event(&pool, "EUR", 2, 0.4).await;
    seed_scored_event(&pool, "EUR", 400, 0.9).await;

    let mut conn = pool.acquire().await.expect("acquire");
    let since = Utc::now() - Duration::hours(168);
    let events = store::events_for_currency(&mut conn, "EUR", since)
        .await
        .expect("window query");

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].sentiment_score, Some(0.4));
}
