//! Eastmoney push2 quote endpoints: primary mainland + HK source.

use analysis_core::{Candle, Market, Quote};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use crate::source::{DataFetcher, SourceDescriptor};
use crate::transport::{get_with_retry, vendor_client, RateLimiter};
use crate::FetchError;

const SOURCE: &str = "eastmoney";

pub struct EastmoneyFetcher {
    client: reqwest::Client,
    limiter: RateLimiter,
    base_url: String,
}

impl EastmoneyFetcher {
    pub fn new() -> Self {
        Self::with_base_url("https://push2his.eastmoney.com".to_string())
    }

    /// Test seam: point the fetcher at a local stub server.
    pub fn with_base_url(base_url: String) -> Self {
        EastmoneyFetcher {
            client: vendor_client(),
            limiter: RateLimiter::new(120, std::time::Duration::from_secs(60)),
            base_url,
        }
    }

    /// Eastmoney secid: market prefix 1 = Shanghai, 0 = Shenzhen, 116 = HK.
    fn secid(ticker: &str) -> Result<String, FetchError> {
        match Market::of(ticker) {
            Some(Market::AShare) => {
                let prefix = if ticker.starts_with('6') { "1" } else { "0" };
                Ok(format!("{prefix}.{ticker}"))
            }
            Some(Market::HongKong) => {
                let digits = ticker.trim_start_matches("HK");
                Ok(format!("116.{digits}"))
            }
            _ => Err(FetchError::MarketUnsupported { source_name: SOURCE, ticker: ticker.to_string() }),
        }
    }
}

impl Default for EastmoneyFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct KlineResponse {
    data: Option<KlineData>,
}

#[derive(Deserialize)]
struct KlineData {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    klines: Vec<String>,
}

#[derive(Deserialize)]
struct QuoteResponse {
    data: Option<QuoteData>,
}

/// push2 field codes: f43 price(x100), f57 code, f58 name, f170 change
/// pct(x100), f50 volume ratio(x100), f168 turnover rate(x100).
#[derive(Deserialize)]
struct QuoteData {
    #[serde(default)]
    f43: Option<f64>,
    #[serde(default)]
    f58: Option<String>,
    #[serde(default)]
    f170: Option<f64>,
    #[serde(default)]
    f50: Option<f64>,
    #[serde(default)]
    f168: Option<f64>,
}

fn parse_kline_row(row: &str) -> Option<Candle> {
    // "2026-03-02,1620.0,1635.5,1640.0,1615.0,35210,5.7e9,..."
    let mut parts = row.split(',');
    let date = NaiveDate::parse_from_str(parts.next()?, "%Y-%m-%d").ok()?;
    let open: f64 = parts.next()?.parse().ok()?;
    let close: f64 = parts.next()?.parse().ok()?;
    let high: f64 = parts.next()?.parse().ok()?;
    let low: f64 = parts.next()?.parse().ok()?;
    let volume: f64 = parts.next()?.parse().ok()?;
    let amount = parts.next().and_then(|s| s.parse().ok());
    Some(Candle { date, open, high, low, close, volume, amount })
}

#[async_trait]
impl DataFetcher for EastmoneyFetcher {
    fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor {
            id: SOURCE,
            priority: 10,
            markets: &[Market::AShare, Market::HongKong],
        }
    }

    async fn history(&self, ticker: &str, days: u32) -> Result<Vec<Candle>, FetchError> {
        let secid = Self::secid(ticker)?;
        let url = format!(
            "{}/api/qt/stock/kline/get?secid={}&klt=101&fqt=1&lmt={}&\
             fields1=f1,f2,f3&fields2=f51,f52,f53,f54,f55,f56,f57",
            self.base_url, secid, days
        );
        let body = get_with_retry(&self.client, &self.limiter, SOURCE, &url).await?;
        let parsed: KlineResponse = serde_json::from_str(&body).map_err(|e| {
            FetchError::Malformed { source_name: SOURCE, message: e.to_string() }
        })?;
        let data = parsed.data.ok_or(FetchError::Malformed {
            source_name: SOURCE,
            message: "null data".into(),
        })?;
        let candles: Vec<Candle> =
            data.klines.iter().filter_map(|row| parse_kline_row(row)).collect();
        if candles.is_empty() {
            return Err(FetchError::Malformed { source_name: SOURCE, message: "empty klines".into() });
        }
        Ok(candles)
    }

    async fn realtime(&self, ticker: &str) -> Result<Quote, FetchError> {
        let secid = Self::secid(ticker)?;
        let url = format!(
            "{}/api/qt/stock/get?secid={}&fields=f43,f50,f57,f58,f168,f170",
            self.base_url, secid
        );
        let body = get_with_retry(&self.client, &self.limiter, SOURCE, &url).await?;
        let parsed: QuoteResponse = serde_json::from_str(&body).map_err(|e| {
            FetchError::Malformed { source_name: SOURCE, message: e.to_string() }
        })?;
        let data = parsed.data.ok_or(FetchError::Malformed {
            source_name: SOURCE,
            message: "null data".into(),
        })?;
        let price = data.f43.ok_or(FetchError::Malformed {
            source_name: SOURCE,
            message: "missing price".into(),
        })? / 100.0;
        Ok(Quote {
            ticker: ticker.to_string(),
            name: data.f58,
            price,
            change_pct: data.f170.map(|v| v / 100.0).unwrap_or(0.0),
            volume_ratio: data.f50.map(|v| v / 100.0),
            turnover_rate: data.f168.map(|v| v / 100.0),
            timestamp: Utc::now(),
            source: SOURCE.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secid_prefixes() {
        assert_eq!(EastmoneyFetcher::secid("600519").unwrap(), "1.600519");
        assert_eq!(EastmoneyFetcher::secid("000001").unwrap(), "0.000001");
        assert_eq!(EastmoneyFetcher::secid("00700").unwrap(), "116.00700");
        assert!(matches!(
            EastmoneyFetcher::secid("AAPL"),
            Err(FetchError::MarketUnsupported { .. })
        ));
    }

    #[test]
    fn kline_row_parses_in_field_order() {
        let c = parse_kline_row("2026-03-02,10.0,10.8,11.0,9.9,123456,9.9e7").unwrap();
        assert_eq!(c.date, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert_eq!(c.open, 10.0);
        assert_eq!(c.close, 10.8);
        assert_eq!(c.high, 11.0);
        assert_eq!(c.low, 9.9);
        assert_eq!(c.amount, Some(9.9e7));
        assert!(parse_kline_row("garbage").is_none());
    }
}
