//! Tencent gtimg quote endpoint. Secondary mainland/HK source; its main
//! value is the one-request batch quote form.

use analysis_core::{Candle, Market, Quote};
use async_trait::async_trait;
use chrono::Utc;

use crate::source::{DataFetcher, SourceDescriptor};
use crate::transport::{get_with_retry, vendor_client, RateLimiter};
use crate::FetchError;

const SOURCE: &str = "tencent";

pub struct TencentFetcher {
    client: reqwest::Client,
    limiter: RateLimiter,
    base_url: String,
}

impl TencentFetcher {
    pub fn new() -> Self {
        Self::with_base_url("https://qt.gtimg.cn".to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        TencentFetcher {
            client: vendor_client(),
            limiter: RateLimiter::new(120, std::time::Duration::from_secs(60)),
            base_url,
        }
    }

    fn symbol(ticker: &str) -> Result<String, FetchError> {
        match Market::of(ticker) {
            Some(Market::AShare) => {
                let prefix = if ticker.starts_with('6') { "sh" } else { "sz" };
                Ok(format!("{prefix}{ticker}"))
            }
            Some(Market::HongKong) => {
                Ok(format!("hk{}", ticker.trim_start_matches("HK")))
            }
            _ => Err(FetchError::MarketUnsupported { source_name: SOURCE, ticker: ticker.to_string() }),
        }
    }
}

impl Default for TencentFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// v_sh600519="1~贵州茅台~600519~1620.00~1600.00~...~3.10~..." —
/// tilde-separated positional fields: 1 name, 3 price, 32 change pct,
/// 38 turnover, 49 volume ratio.
fn parse_quote_line(ticker: &str, line: &str) -> Option<Quote> {
    let payload = line.split('"').nth(1)?;
    let fields: Vec<&str> = payload.split('~').collect();
    if fields.len() < 33 {
        return None;
    }
    let price: f64 = fields[3].parse().ok()?;
    if price <= 0.0 {
        return None;
    }
    Some(Quote {
        ticker: ticker.to_string(),
        name: Some(fields[1].to_string()).filter(|s| !s.is_empty()),
        price,
        change_pct: fields[32].parse().unwrap_or(0.0),
        volume_ratio: fields.get(49).and_then(|s| s.parse().ok()),
        turnover_rate: fields.get(38).and_then(|s| s.parse().ok()),
        timestamp: Utc::now(),
        source: SOURCE.to_string(),
    })
}

#[async_trait]
impl DataFetcher for TencentFetcher {
    fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor {
            id: SOURCE,
            priority: 20,
            markets: &[Market::AShare, Market::HongKong],
        }
    }

    async fn history(&self, ticker: &str, _days: u32) -> Result<Vec<Candle>, FetchError> {
        // The gtimg endpoint only serves realtime snapshots.
        Err(FetchError::MarketUnsupported { source_name: SOURCE, ticker: ticker.to_string() })
    }

    async fn realtime(&self, ticker: &str) -> Result<Quote, FetchError> {
        let symbol = Self::symbol(ticker)?;
        let url = format!("{}/q={}", self.base_url, symbol);
        let body = get_with_retry(&self.client, &self.limiter, SOURCE, &url).await?;
        parse_quote_line(ticker, &body).ok_or(FetchError::Malformed {
            source_name: SOURCE,
            message: "unparseable quote line".into(),
        })
    }

    async fn realtime_batch(&self, tickers: &[String]) -> Vec<(String, Result<Quote, FetchError>)> {
        let mut symbols = Vec::new();
        for t in tickers {
            match Self::symbol(t) {
                Ok(s) => symbols.push((t.clone(), s)),
                Err(_) => continue,
            }
        }
        if symbols.is_empty() {
            return Vec::new();
        }
        let joined: Vec<&str> = symbols.iter().map(|(_, s)| s.as_str()).collect();
        let url = format!("{}/q={}", self.base_url, joined.join(","));
        let body = match get_with_retry(&self.client, &self.limiter, SOURCE, &url).await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("{SOURCE}: batch quote failed: {e}");
                return symbols
                    .into_iter()
                    .map(|(t, _)| {
                        (t.clone(), Err(FetchError::Transport {
                            source_name: SOURCE,
                            message: "batch request failed".into(),
                        }))
                    })
                    .collect();
            }
        };

        let lines: Vec<&str> = body.lines().collect();
        symbols
            .into_iter()
            .enumerate()
            .map(|(i, (ticker, _))| {
                let result = lines
                    .get(i)
                    .and_then(|line| parse_quote_line(&ticker, line))
                    .ok_or(FetchError::Malformed {
                        source_name: SOURCE,
                        message: "missing line in batch response".into(),
                    });
                (ticker, result)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_line() -> String {
        let mut fields = vec!["1"; 55];
        fields[1] = "贵州茅台";
        fields[3] = "1620.00";
        fields[32] = "3.10";
        fields[38] = "0.85";
        fields[49] = "1.20";
        format!("v_sh600519=\"{}\";", fields.join("~"))
    }

    #[test]
    fn quote_line_positions() {
        let q = parse_quote_line("600519", &sample_line()).unwrap();
        assert_eq!(q.price, 1620.0);
        assert_eq!(q.change_pct, 3.10);
        assert_eq!(q.name.as_deref(), Some("贵州茅台"));
        assert_eq!(q.volume_ratio, Some(1.20));
        assert_eq!(q.turnover_rate, Some(0.85));
    }

    #[test]
    fn truncated_line_is_rejected() {
        assert!(parse_quote_line("600519", "v_sh600519=\"1~x~y\";").is_none());
        assert!(parse_quote_line("600519", "").is_none());
    }

    #[test]
    fn symbol_prefixes() {
        assert_eq!(TencentFetcher::symbol("600519").unwrap(), "sh600519");
        assert_eq!(TencentFetcher::symbol("300750").unwrap(), "sz300750");
        assert_eq!(TencentFetcher::symbol("00700").unwrap(), "hk00700");
    }
}
