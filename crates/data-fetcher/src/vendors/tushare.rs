//! Tushare Pro: token-gated A-share source. Only registered when
//! TUSHARE_TOKEN is configured.

use analysis_core::{Candle, Market, Quote};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::source::{DataFetcher, SourceDescriptor};
use crate::transport::{vendor_client, RateLimiter};
use crate::FetchError;

const SOURCE: &str = "tushare";

pub struct TushareFetcher {
    token: String,
    client: reqwest::Client,
    limiter: RateLimiter,
    base_url: String,
}

impl TushareFetcher {
    pub fn new(token: String) -> Self {
        Self::with_base_url(token, "https://api.tushare.pro".to_string())
    }

    pub fn with_base_url(token: String, base_url: String) -> Self {
        TushareFetcher {
            token,
            client: vendor_client(),
            // Free-tier accounts are capped well below this.
            limiter: RateLimiter::new(60, std::time::Duration::from_secs(60)),
            base_url,
        }
    }

    /// 600519 -> 600519.SH, 000001 -> 000001.SZ
    fn ts_code(ticker: &str) -> Result<String, FetchError> {
        match Market::of(ticker) {
            Some(Market::AShare) => {
                let suffix = if ticker.starts_with('6') { "SH" } else { "SZ" };
                Ok(format!("{ticker}.{suffix}"))
            }
            _ => Err(FetchError::MarketUnsupported { source_name: SOURCE, ticker: ticker.to_string() }),
        }
    }

    async fn call(&self, api_name: &str, params: Value, fields: &str) -> Result<TushareData, FetchError> {
        self.limiter.acquire().await;
        let body = json!({
            "api_name": api_name,
            "token": self.token,
            "params": params,
            "fields": fields,
        });
        let response = self
            .client
            .post(&self.base_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| FetchError::Transport { source_name: SOURCE, message: e.to_string() })?;
        if !response.status().is_success() {
            return Err(FetchError::Transport {
                source_name: SOURCE,
                message: format!("HTTP {}", response.status()),
            });
        }
        let parsed: TushareResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Malformed { source_name: SOURCE, message: e.to_string() })?;
        if parsed.code != 0 {
            return Err(FetchError::Transport {
                source_name: SOURCE,
                message: parsed.msg.unwrap_or_else(|| format!("code {}", parsed.code)),
            });
        }
        parsed.data.ok_or(FetchError::Malformed { source_name: SOURCE, message: "null data".into() })
    }
}

#[derive(Deserialize)]
struct TushareResponse {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<TushareData>,
}

#[derive(Deserialize)]
struct TushareData {
    fields: Vec<String>,
    items: Vec<Vec<Value>>,
}

impl TushareData {
    fn column(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == name)
    }
}

#[async_trait]
impl DataFetcher for TushareFetcher {
    fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor { id: SOURCE, priority: 15, markets: &[Market::AShare] }
    }

    async fn history(&self, ticker: &str, days: u32) -> Result<Vec<Candle>, FetchError> {
        let ts_code = Self::ts_code(ticker)?;
        let end = Utc::now().date_naive();
        let start = end - chrono::Duration::days(days as i64 * 2);
        let data = self
            .call(
                "daily",
                json!({
                    "ts_code": ts_code,
                    "start_date": start.format("%Y%m%d").to_string(),
                    "end_date": end.format("%Y%m%d").to_string(),
                }),
                "trade_date,open,high,low,close,vol,amount",
            )
            .await?;

        let date_i = data.column("trade_date");
        let open_i = data.column("open");
        let high_i = data.column("high");
        let low_i = data.column("low");
        let close_i = data.column("close");
        let vol_i = data.column("vol");
        let amount_i = data.column("amount");
        let (Some(date_i), Some(open_i), Some(high_i), Some(low_i), Some(close_i), Some(vol_i)) =
            (date_i, open_i, high_i, low_i, close_i, vol_i)
        else {
            return Err(FetchError::Malformed { source_name: SOURCE, message: "missing columns".into() });
        };

        let mut candles: Vec<Candle> = data
            .items
            .iter()
            .filter_map(|row| {
                let date = row.get(date_i)?.as_str()?;
                Some(Candle {
                    date: NaiveDate::parse_from_str(date, "%Y%m%d").ok()?,
                    open: row.get(open_i)?.as_f64()?,
                    high: row.get(high_i)?.as_f64()?,
                    low: row.get(low_i)?.as_f64()?,
                    close: row.get(close_i)?.as_f64()?,
                    volume: row.get(vol_i)?.as_f64()?,
                    amount: amount_i.and_then(|i| row.get(i)).and_then(Value::as_f64),
                })
            })
            .collect();
        // The API answers newest first.
        candles.sort_by_key(|c| c.date);
        candles.dedup_by_key(|c| c.date);
        if candles.is_empty() {
            return Err(FetchError::Malformed { source_name: SOURCE, message: "no rows".into() });
        }
        let keep = candles.len().saturating_sub(days as usize);
        Ok(candles.split_off(keep))
    }

    async fn realtime(&self, ticker: &str) -> Result<Quote, FetchError> {
        // Tushare's realtime tier is separate; serve the latest daily
        // close instead so the pool can fall back to a live source.
        let candles = self.history(ticker, 2).await?;
        let last = candles.last().expect("history is non-empty on Ok");
        let prev_close = if candles.len() >= 2 { candles[candles.len() - 2].close } else { last.open };
        let change_pct =
            if prev_close > 0.0 { (last.close - prev_close) / prev_close * 100.0 } else { 0.0 };
        Ok(Quote {
            ticker: ticker.to_string(),
            name: None,
            price: last.close,
            change_pct,
            volume_ratio: None,
            turnover_rate: None,
            timestamp: Utc::now(),
            source: SOURCE.to_string(),
        })
    }

    async fn name(&self, ticker: &str) -> Result<String, FetchError> {
        let ts_code = Self::ts_code(ticker)?;
        let data = self
            .call("stock_basic", json!({ "ts_code": ts_code }), "ts_code,name")
            .await?;
        let name_i = data
            .column("name")
            .ok_or(FetchError::Malformed { source_name: SOURCE, message: "missing name column".into() })?;
        data.items
            .first()
            .and_then(|row| row.get(name_i))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| FetchError::NotFound(ticker.to_string()))
    }
}
