use sqlx::SqlitePool;

/// Idempotent startup migrations; every statement is CREATE IF NOT
/// EXISTS so reruns are safe.
pub async fn run(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS analysis_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            query_id TEXT NOT NULL,
            ticker TEXT NOT NULL,
            name TEXT NOT NULL,
            report_type TEXT NOT NULL,
            engine_version TEXT NOT NULL,
            current_price REAL,
            change_pct REAL,
            sentiment_score INTEGER NOT NULL,
            analysis_summary TEXT NOT NULL,
            operation_advice TEXT NOT NULL,
            trend_prediction TEXT NOT NULL,
            risk_alerts TEXT NOT NULL,
            ideal_buy REAL,
            secondary_buy REAL,
            stop_loss REAL,
            take_profit REAL,
            raw_result TEXT NOT NULL,
            context_snapshot TEXT,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_history_ticker_created
         ON analysis_history (ticker, created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS news_intel (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            record_id INTEGER NOT NULL REFERENCES analysis_history(id),
            ticker TEXT NOT NULL,
            name TEXT NOT NULL DEFAULT '',
            dimension TEXT NOT NULL,
            query TEXT NOT NULL,
            title TEXT NOT NULL,
            snippet TEXT NOT NULL,
            url TEXT NOT NULL,
            published_at TEXT,
            fingerprint TEXT NOT NULL,
            relevance REAL NOT NULL,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_news_record ON news_intel (record_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS conversation_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            tool_calls TEXT,
            reasoning_blob TEXT,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_conversation_session
         ON conversation_messages (session_id, created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS auth_config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS backtest_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ticker TEXT NOT NULL,
            engine_version TEXT NOT NULL,
            result_json TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}
