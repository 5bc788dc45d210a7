//! Yahoo v8 chart API: the dedicated US stock + index source.

use analysis_core::{Candle, Market, Quote};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::source::{DataFetcher, SourceDescriptor};
use crate::transport::{get_with_retry, vendor_client, RateLimiter};
use crate::FetchError;

const SOURCE: &str = "yahoo";

pub struct YahooFetcher {
    client: reqwest::Client,
    limiter: RateLimiter,
    base_url: String,
}

impl YahooFetcher {
    pub fn new() -> Self {
        Self::with_base_url("https://query1.finance.yahoo.com".to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        YahooFetcher {
            client: vendor_client(),
            limiter: RateLimiter::new(60, std::time::Duration::from_secs(60)),
            base_url,
        }
    }
}

impl Default for YahooFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Deserialize)]
struct ChartError {
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Deserialize)]
struct ChartMeta {
    #[serde(default, rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
    #[serde(default, rename = "chartPreviousClose")]
    chart_previous_close: Option<f64>,
    #[serde(default, rename = "shortName")]
    short_name: Option<String>,
}

#[derive(Deserialize)]
struct Indicators {
    quote: Vec<OhlcvArrays>,
}

#[derive(Deserialize)]
struct OhlcvArrays {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

fn candles_from_chart(result: &ChartResult) -> Vec<Candle> {
    let Some(ohlcv) = result.indicators.quote.first() else {
        return Vec::new();
    };
    let mut out = Vec::with_capacity(result.timestamp.len());
    let mut last_date = None;
    for (i, &ts) in result.timestamp.iter().enumerate() {
        let Some(dt) = DateTime::<Utc>::from_timestamp(ts, 0) else {
            continue;
        };
        let date = dt.date_naive();
        // Trailing intraday rows repeat the last session's date.
        if last_date == Some(date) {
            continue;
        }
        let (Some(open), Some(high), Some(low), Some(close)) = (
            ohlcv.open.get(i).copied().flatten(),
            ohlcv.high.get(i).copied().flatten(),
            ohlcv.low.get(i).copied().flatten(),
            ohlcv.close.get(i).copied().flatten(),
        ) else {
            continue;
        };
        last_date = Some(date);
        out.push(Candle {
            date,
            open,
            high,
            low,
            close,
            volume: ohlcv.volume.get(i).copied().flatten().unwrap_or(0.0),
            amount: None,
        });
    }
    out
}

#[async_trait]
impl DataFetcher for YahooFetcher {
    fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor { id: SOURCE, priority: 40, markets: &[Market::Us, Market::HongKong] }
    }

    async fn history(&self, ticker: &str, days: u32) -> Result<Vec<Candle>, FetchError> {
        let range_days = days.max(5);
        let url = format!(
            "{}/v8/finance/chart/{}?interval=1d&range={}d",
            self.base_url, ticker, range_days
        );
        let body = get_with_retry(&self.client, &self.limiter, SOURCE, &url).await?;
        let parsed: ChartResponse = serde_json::from_str(&body).map_err(|e| {
            FetchError::Malformed { source_name: SOURCE, message: e.to_string() }
        })?;
        if let Some(err) = parsed.chart.error {
            return Err(FetchError::Malformed { source_name: SOURCE, message: err.description });
        }
        let result = parsed
            .chart
            .result
            .as_ref()
            .and_then(|r| r.first())
            .ok_or(FetchError::Malformed { source_name: SOURCE, message: "empty result".into() })?;
        let candles = candles_from_chart(result);
        if candles.is_empty() {
            return Err(FetchError::Malformed { source_name: SOURCE, message: "no candles".into() });
        }
        Ok(candles)
    }

    async fn realtime(&self, ticker: &str) -> Result<Quote, FetchError> {
        let url = format!(
            "{}/v8/finance/chart/{}?interval=1d&range=2d",
            self.base_url, ticker
        );
        let body = get_with_retry(&self.client, &self.limiter, SOURCE, &url).await?;
        let parsed: ChartResponse = serde_json::from_str(&body).map_err(|e| {
            FetchError::Malformed { source_name: SOURCE, message: e.to_string() }
        })?;
        let result = parsed
            .chart
            .result
            .as_ref()
            .and_then(|r| r.first())
            .ok_or(FetchError::Malformed { source_name: SOURCE, message: "empty result".into() })?;
        let price = result.meta.regular_market_price.ok_or(FetchError::Malformed {
            source_name: SOURCE,
            message: "missing regularMarketPrice".into(),
        })?;
        let change_pct = match result.meta.chart_previous_close {
            Some(prev) if prev > 0.0 => (price - prev) / prev * 100.0,
            _ => 0.0,
        };
        Ok(Quote {
            ticker: ticker.to_string(),
            name: result.meta.short_name.clone(),
            price,
            change_pct,
            volume_ratio: None,
            turnover_rate: None,
            timestamp: Utc::now(),
            source: SOURCE.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chart_json() -> &'static str {
        r#"{"chart":{"result":[{"meta":{"regularMarketPrice":512.3,
            "chartPreviousClose":500.0,"shortName":"S&P 500"},
            "timestamp":[1767225600,1767312000,1767398400],
            "indicators":{"quote":[{"open":[1.0,2.0,null],
            "high":[1.5,2.5,3.5],"low":[0.5,1.5,2.5],
            "close":[1.2,2.2,null],"volume":[10,20,30]}]}}],"error":null}}"#
    }

    #[test]
    fn chart_rows_with_nulls_are_dropped() {
        let parsed: ChartResponse = serde_json::from_str(chart_json()).unwrap();
        let result = &parsed.chart.result.as_ref().unwrap()[0];
        let candles = candles_from_chart(result);
        // Third row has null open/close and is skipped.
        assert_eq!(candles.len(), 2);
        assert!(candles[0].date < candles[1].date);
    }

    #[test]
    fn quote_change_pct_vs_previous_close() {
        let parsed: ChartResponse = serde_json::from_str(chart_json()).unwrap();
        let meta = &parsed.chart.result.as_ref().unwrap()[0].meta;
        let price = meta.regular_market_price.unwrap();
        let prev = meta.chart_previous_close.unwrap();
        assert!(((price - prev) / prev * 100.0 - 2.46).abs() < 0.01);
    }
}
