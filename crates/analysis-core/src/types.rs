use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::Market;

/// Identifier of a concrete data source (eastmoney, tencent, sina, yahoo...).
pub type SourceId = &'static str;

/// Daily OHLCV candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
}

/// Realtime quote snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub ticker: String,
    #[serde(default)]
    pub name: Option<String>,
    pub price: f64,
    pub change_pct: f64,
    /// Today's volume vs 5-day average at this time of day, when the
    /// source reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turnover_rate: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

/// Derived technical indicator snapshot for the latest bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicalSnapshot {
    pub ma5: Option<f64>,
    pub ma10: Option<f64>,
    pub ma20: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub rsi14: Option<f64>,
    /// Deviation of the close from MA20, in percent.
    pub bias_pct: Option<f64>,
    /// Acceptance band for the bias, in percent. Strong trends widen it.
    pub bias_band_pct: f64,
    /// MA5 > MA10 > MA20 at the most recent bar.
    pub bullish_alignment: bool,
    /// Composite trend strength, 0-100.
    pub trend_strength: f64,
    /// True when a virtual intraday candle was appended before computing.
    pub intraday: bool,
}

/// One ranked news search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub snippet: String,
    pub url: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    pub source: String,
    /// Stable dedup hash of normalized title + url.
    pub fingerprint: u64,
    /// Provider relevance x recency decay, higher first.
    pub relevance: f64,
}

/// Aggregated multi-dimension news for one ticker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewsIntel {
    pub ticker: String,
    pub dimensions: Vec<NewsDimension>,
    /// True when every provider failed and the intel is empty-by-fallback.
    pub search_fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsDimension {
    pub name: String,
    pub query: String,
    pub items: Vec<NewsItem>,
}

impl NewsIntel {
    pub fn total_items(&self) -> usize {
        self.dimensions.iter().map(|d| d.items.len()).sum()
    }
}

/// Market-review scope for index reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewRegion {
    Cn,
    Us,
    Both,
}

impl ReviewRegion {
    pub fn parse(s: &str) -> Option<ReviewRegion> {
        match s {
            "cn" => Some(ReviewRegion::Cn),
            "us" => Some(ReviewRegion::Us),
            "both" => Some(ReviewRegion::Both),
            _ => None,
        }
    }
}

/// Kind of report a pipeline run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    #[default]
    Detailed,
    Summary,
    MarketReview,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Detailed => "detailed",
            ReportType::Summary => "summary",
            ReportType::MarketReview => "market_review",
        }
    }

    pub fn parse(s: &str) -> Option<ReportType> {
        match s {
            "detailed" => Some(ReportType::Detailed),
            "summary" => Some(ReportType::Summary),
            "market_review" => Some(ReportType::MarketReview),
            _ => None,
        }
    }
}

/// Everything handed to the LLM for one ticker, size-bounded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceBundle {
    pub ticker: String,
    pub name: String,
    pub market: Market,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<Quote>,
    pub candles: Vec<Candle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technicals: Option<TechnicalSnapshot>,
    pub news: NewsIntel,
    /// Summary of the previous persisted report, for continuity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_report: Option<String>,
    /// Fields that were cut to fit the size budget, by name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub truncated_fields: Vec<String>,
}

/// Speaker role of one conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    Tool,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
            TurnRole::Tool => "tool",
        }
    }

    pub fn parse(s: &str) -> Option<TurnRole> {
        match s {
            "user" => Some(TurnRole::User),
            "assistant" => Some(TurnRole::Assistant),
            "tool" => Some(TurnRole::Tool),
            _ => None,
        }
    }
}

/// One persisted turn of an agent chat session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub session_id: String,
    pub role: TurnRole,
    pub content: String,
    /// JSON-encoded tool calls, when the assistant requested any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<String>,
    /// Opaque provider reasoning payload, echoed back next turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_blob: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn candle_serde_round_trip() {
        let c = Candle {
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            open: 10.0,
            high: 11.0,
            low: 9.5,
            close: 10.8,
            volume: 123456.0,
            amount: Some(1.3e6),
        };
        let json = serde_json::to_string(&c).unwrap();
        let back: Candle = serde_json::from_str(&json).unwrap();
        assert_eq!(c, back);
    }

    #[test]
    fn report_type_round_trips_as_str() {
        for rt in [ReportType::Detailed, ReportType::Summary, ReportType::MarketReview] {
            assert_eq!(ReportType::parse(rt.as_str()), Some(rt));
        }
        assert_eq!(ReportType::parse("weekly"), None);
    }
}
