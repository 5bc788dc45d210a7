use analysis_core::{
    AnalysisReport, NewsIntel, ReportDetails, ReportMeta, ReportSummary, ReportType,
    StrategyLevels,
};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;

use crate::{Store, StoreError};

#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub ticker: Option<String>,
    pub date: Option<NaiveDate>,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone)]
pub struct ReportPage {
    pub reports: Vec<AnalysisReport>,
    pub total: i64,
}

#[derive(FromRow)]
struct HistoryRow {
    id: i64,
    query_id: String,
    ticker: String,
    name: String,
    report_type: String,
    engine_version: String,
    current_price: Option<f64>,
    change_pct: Option<f64>,
    sentiment_score: i64,
    analysis_summary: String,
    operation_advice: String,
    trend_prediction: String,
    risk_alerts: String,
    ideal_buy: Option<f64>,
    secondary_buy: Option<f64>,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
    raw_result: String,
    context_snapshot: Option<String>,
    created_at: String,
}

impl HistoryRow {
    fn into_report(self) -> Result<AnalysisReport, StoreError> {
        Ok(AnalysisReport {
            meta: ReportMeta {
                id: self.id,
                query_id: self.query_id,
                ticker: self.ticker,
                name: self.name,
                created_at: self
                    .created_at
                    .parse::<DateTime<Utc>>()
                    .unwrap_or_else(|_| Utc::now()),
                current_price: self.current_price,
                change_pct: self.change_pct,
                report_type: ReportType::parse(&self.report_type).unwrap_or_default(),
                engine_version: self.engine_version,
            },
            summary: ReportSummary {
                sentiment_score: self.sentiment_score.clamp(0, 100) as u8,
                analysis_summary: self.analysis_summary,
                operation_advice: self.operation_advice,
                trend_prediction: self.trend_prediction,
                risk_alerts: serde_json::from_str(&self.risk_alerts)?,
            },
            strategy: StrategyLevels {
                ideal_buy: self.ideal_buy,
                secondary_buy: self.secondary_buy,
                stop_loss: self.stop_loss,
                take_profit: self.take_profit,
            },
            details: ReportDetails {
                raw_result: self.raw_result,
                context_snapshot: self.context_snapshot,
            },
        })
    }
}

/// One associated news row, as served by the history detail API.
#[derive(Debug, Clone, FromRow, serde::Serialize)]
pub struct NewsRow {
    pub dimension: String,
    pub title: String,
    pub snippet: String,
    pub url: String,
    pub published_at: Option<String>,
    pub relevance: f64,
}

impl Store {
    /// Persist a report; returns the new primary key and stamps it onto
    /// the report.
    pub async fn save_report(&self, report: &mut AnalysisReport) -> Result<i64, StoreError> {
        let risk_alerts = serde_json::to_string(&report.summary.risk_alerts)?;
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO analysis_history (
                query_id, ticker, name, report_type, engine_version,
                current_price, change_pct, sentiment_score, analysis_summary,
                operation_advice, trend_prediction, risk_alerts,
                ideal_buy, secondary_buy, stop_loss, take_profit,
                raw_result, context_snapshot, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id",
        )
        .bind(&report.meta.query_id)
        .bind(&report.meta.ticker)
        .bind(&report.meta.name)
        .bind(report.meta.report_type.as_str())
        .bind(&report.meta.engine_version)
        .bind(report.meta.current_price)
        .bind(report.meta.change_pct)
        .bind(report.summary.sentiment_score as i64)
        .bind(&report.summary.analysis_summary)
        .bind(&report.summary.operation_advice)
        .bind(&report.summary.trend_prediction)
        .bind(&risk_alerts)
        .bind(report.strategy.ideal_buy)
        .bind(report.strategy.secondary_buy)
        .bind(report.strategy.stop_loss)
        .bind(report.strategy.take_profit)
        .bind(&report.details.raw_result)
        .bind(&report.details.context_snapshot)
        .bind(report.meta.created_at.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;
        report.meta.id = id;
        Ok(id)
    }

    pub async fn get_report(&self, id: i64) -> Result<AnalysisReport, StoreError> {
        let row: Option<HistoryRow> =
            sqlx::query_as("SELECT * FROM analysis_history WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.ok_or(StoreError::NotFound(id))?.into_report()
    }

    /// Latest persisted report for a ticker, if any.
    pub async fn latest_report(&self, ticker: &str) -> Result<Option<AnalysisReport>, StoreError> {
        let row: Option<HistoryRow> = sqlx::query_as(
            "SELECT * FROM analysis_history WHERE ticker = ?
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(ticker)
        .fetch_optional(&self.pool)
        .await?;
        row.map(HistoryRow::into_report).transpose()
    }

    pub async fn list_reports(&self, filter: &ReportFilter) -> Result<ReportPage, StoreError> {
        let page_size = filter.page_size.clamp(1, 100) as i64;
        let offset = filter.page as i64 * page_size;
        let ticker = filter.ticker.clone().unwrap_or_default();
        let date = filter.date.map(|d| d.to_string()).unwrap_or_default();

        let rows: Vec<HistoryRow> = sqlx::query_as(
            "SELECT * FROM analysis_history
             WHERE (? = '' OR ticker = ?)
               AND (? = '' OR substr(created_at, 1, 10) = ?)
             ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(&ticker)
        .bind(&ticker)
        .bind(&date)
        .bind(&date)
        .bind(page_size)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM analysis_history
             WHERE (? = '' OR ticker = ?)
               AND (? = '' OR substr(created_at, 1, 10) = ?)",
        )
        .bind(&ticker)
        .bind(&ticker)
        .bind(&date)
        .bind(&date)
        .fetch_one(&self.pool)
        .await?;

        let reports = rows
            .into_iter()
            .map(HistoryRow::into_report)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ReportPage { reports, total })
    }

    /// Persist the intel rows for a report, one row per item, in one
    /// transaction: either every row lands or none does. `name` is the
    /// backfilled stock name from the finished report.
    pub async fn save_news_intel(
        &self,
        record_id: i64,
        intel: &NewsIntel,
        name: &str,
    ) -> Result<usize, StoreError> {
        struct Row {
            dimension: String,
            query: String,
            title: String,
            snippet: String,
            url: String,
            published_at: Option<String>,
            fingerprint: String,
            relevance: f64,
        }

        let now = Utc::now().to_rfc3339();
        let ticker = intel.ticker.clone();
        let name = name.to_string();
        let rows: Vec<Row> = intel
            .dimensions
            .iter()
            .flat_map(|dim| {
                dim.items.iter().map(|item| Row {
                    dimension: dim.name.clone(),
                    query: dim.query.clone(),
                    title: item.title.clone(),
                    snippet: item.snippet.clone(),
                    url: item.url.clone(),
                    published_at: item.published_at.map(|d| d.to_rfc3339()),
                    fingerprint: item.fingerprint.to_string(),
                    relevance: item.relevance,
                })
            })
            .collect();
        let written = rows.len();

        self.in_tx(move |tx| {
            Box::pin(async move {
                for row in &rows {
                    sqlx::query(
                        "INSERT INTO news_intel (
                            record_id, ticker, name, dimension, query, title, snippet,
                            url, published_at, fingerprint, relevance, created_at
                        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    )
                    .bind(record_id)
                    .bind(&ticker)
                    .bind(&name)
                    .bind(&row.dimension)
                    .bind(&row.query)
                    .bind(&row.title)
                    .bind(&row.snippet)
                    .bind(&row.url)
                    .bind(&row.published_at)
                    .bind(&row.fingerprint)
                    .bind(row.relevance)
                    .bind(&now)
                    .execute(&mut **tx)
                    .await?;
                }
                Ok(written)
            })
        })
        .await
    }

    pub async fn news_for_record(&self, record_id: i64) -> Result<Vec<NewsRow>, StoreError> {
        let rows: Vec<NewsRow> = sqlx::query_as(
            "SELECT dimension, title, snippet, url, published_at, relevance
             FROM news_intel WHERE record_id = ? ORDER BY relevance DESC",
        )
        .bind(record_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{NewsDimension, NewsItem};

    async fn memory_store() -> Store {
        Store::connect("sqlite::memory:").await.unwrap()
    }

    fn report(ticker: &str, query_id: &str) -> AnalysisReport {
        AnalysisReport {
            meta: ReportMeta {
                id: 0,
                query_id: query_id.into(),
                ticker: ticker.into(),
                name: "Test Co".into(),
                created_at: Utc::now(),
                current_price: Some(10.5),
                change_pct: Some(-0.3),
                report_type: ReportType::Detailed,
                engine_version: "0.9.0".into(),
            },
            summary: ReportSummary {
                sentiment_score: 55,
                analysis_summary: "sideways".into(),
                operation_advice: "hold".into(),
                trend_prediction: "neutral".into(),
                risk_alerts: vec!["earnings next week".into()],
            },
            strategy: StrategyLevels {
                ideal_buy: Some(10.0),
                secondary_buy: None,
                stop_loss: Some(9.5),
                take_profit: Some(12.0),
            },
            details: ReportDetails { raw_result: "{}".into(), context_snapshot: None },
        }
    }

    #[tokio::test]
    async fn report_round_trip_preserves_content() {
        let store = memory_store().await;
        let mut original = report("600519", "q-1");
        let id = store.save_report(&mut original).await.unwrap();
        assert!(id > 0);
        assert_eq!(original.meta.id, id);

        let reloaded = store.get_report(id).await.unwrap();
        assert_eq!(reloaded.summary, original.summary);
        assert_eq!(reloaded.strategy, original.strategy);
        assert_eq!(reloaded.meta.ticker, "600519");
        // Re-serialization is stable.
        assert_eq!(
            serde_json::to_string(&reloaded.strategy).unwrap(),
            serde_json::to_string(&original.strategy).unwrap()
        );
    }

    #[tokio::test]
    async fn ids_are_unique_even_when_query_id_collides() {
        let store = memory_store().await;
        let mut a = report("600519", "batch-1");
        let mut b = report("AAPL", "batch-1");
        let id_a = store.save_report(&mut a).await.unwrap();
        let id_b = store.save_report(&mut b).await.unwrap();
        assert_ne!(id_a, id_b);
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let store = memory_store().await;
        assert!(matches!(store.get_report(999).await, Err(StoreError::NotFound(999))));
    }

    #[tokio::test]
    async fn list_filters_by_ticker() {
        let store = memory_store().await;
        store.save_report(&mut report("600519", "q")).await.unwrap();
        store.save_report(&mut report("AAPL", "q")).await.unwrap();

        let page = store
            .list_reports(&ReportFilter {
                ticker: Some("AAPL".into()),
                page_size: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.reports[0].meta.ticker, "AAPL");
    }

    #[tokio::test]
    async fn news_rows_reference_report_id() {
        let store = memory_store().await;
        let mut r = report("600519", "q");
        let record_id = store.save_report(&mut r).await.unwrap();

        let intel = NewsIntel {
            ticker: "600519".into(),
            dimensions: vec![NewsDimension {
                name: "company_news".into(),
                query: "moutai".into(),
                items: vec![NewsItem {
                    title: "t".into(),
                    snippet: "s".into(),
                    url: "https://x/1".into(),
                    published_at: Some(Utc::now()),
                    source: "company_news".into(),
                    fingerprint: 7,
                    relevance: 0.9,
                }],
            }],
            search_fallback: false,
        };
        let written = store.save_news_intel(record_id, &intel, "贵州茅台").await.unwrap();
        assert_eq!(written, 1);

        let rows = store.news_for_record(record_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "t");
    }
}
