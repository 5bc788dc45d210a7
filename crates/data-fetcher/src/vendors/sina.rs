//! Sina hq quote endpoint, last-resort mainland source.

use analysis_core::{Candle, Market, Quote};
use async_trait::async_trait;
use chrono::Utc;

use crate::source::{DataFetcher, SourceDescriptor};
use crate::transport::{get_with_retry, vendor_client, RateLimiter};
use crate::FetchError;

const SOURCE: &str = "sina";

pub struct SinaFetcher {
    client: reqwest::Client,
    limiter: RateLimiter,
    base_url: String,
}

impl SinaFetcher {
    pub fn new() -> Self {
        Self::with_base_url("https://hq.sinajs.cn".to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        SinaFetcher {
            client: vendor_client(),
            limiter: RateLimiter::new(60, std::time::Duration::from_secs(60)),
            base_url,
        }
    }

    fn symbol(ticker: &str) -> Result<String, FetchError> {
        match Market::of(ticker) {
            Some(Market::AShare) => {
                let prefix = if ticker.starts_with('6') { "sh" } else { "sz" };
                Ok(format!("{prefix}{ticker}"))
            }
            _ => Err(FetchError::MarketUnsupported { source_name: SOURCE, ticker: ticker.to_string() }),
        }
    }
}

impl Default for SinaFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// var hq_str_sh600519="贵州茅台,1598.00,1600.00,1620.00,..." —
/// comma-separated: 0 name, 1 open, 2 prev close, 3 current.
fn parse_hq_line(ticker: &str, body: &str) -> Option<Quote> {
    let payload = body.split('"').nth(1)?;
    let fields: Vec<&str> = payload.split(',').collect();
    if fields.len() < 4 {
        return None;
    }
    let price: f64 = fields[3].parse().ok()?;
    let prev_close: f64 = fields[2].parse().ok()?;
    if price <= 0.0 {
        return None;
    }
    let change_pct = if prev_close > 0.0 { (price - prev_close) / prev_close * 100.0 } else { 0.0 };
    Some(Quote {
        ticker: ticker.to_string(),
        name: Some(fields[0].to_string()).filter(|s| !s.is_empty()),
        price,
        change_pct,
        volume_ratio: None,
        turnover_rate: None,
        timestamp: Utc::now(),
        source: SOURCE.to_string(),
    })
}

#[async_trait]
impl DataFetcher for SinaFetcher {
    fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor { id: SOURCE, priority: 30, markets: &[Market::AShare] }
    }

    async fn history(&self, ticker: &str, _days: u32) -> Result<Vec<Candle>, FetchError> {
        Err(FetchError::MarketUnsupported { source_name: SOURCE, ticker: ticker.to_string() })
    }

    async fn realtime(&self, ticker: &str) -> Result<Quote, FetchError> {
        let symbol = Self::symbol(ticker)?;
        let url = format!("{}/list={}", self.base_url, symbol);
        let body = get_with_retry(&self.client, &self.limiter, SOURCE, &url).await?;
        parse_hq_line(ticker, &body).ok_or(FetchError::Malformed {
            source_name: SOURCE,
            message: "unparseable hq line".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_pct_from_prev_close() {
        let body = "var hq_str_sh600519=\"贵州茅台,1598.00,1600.00,1632.00,1640.0\";";
        let q = parse_hq_line("600519", body).unwrap();
        assert_eq!(q.price, 1632.0);
        assert!((q.change_pct - 2.0).abs() < 1e-9);
    }

    #[test]
    fn zero_price_rejected() {
        let body = "var hq_str_sh600519=\"x,0.0,0.0,0.00\";";
        assert!(parse_hq_line("600519", body).is_none());
    }
}
