use analysis_core::{Candle, Market, Quote};
use async_trait::async_trait;

use crate::FetchError;

/// Static description of a registered source.
#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    pub id: &'static str,
    /// Lower wins. Config may override per source.
    pub priority: i32,
    pub markets: &'static [Market],
}

impl SourceDescriptor {
    pub fn supports(&self, market: Market) -> bool {
        self.markets.contains(&market)
    }
}

/// Uniform capability over heterogeneous vendor endpoints.
///
/// `ticker` is always canonical; US index symbols are already mapped to
/// the vendor form before dispatch.
#[async_trait]
pub trait DataFetcher: Send + Sync {
    fn descriptor(&self) -> SourceDescriptor;

    async fn history(&self, ticker: &str, days: u32) -> Result<Vec<Candle>, FetchError>;

    async fn realtime(&self, ticker: &str) -> Result<Quote, FetchError>;

    /// Fetch quotes for many tickers in one round trip, where the vendor
    /// allows it. The default falls back to per-ticker calls.
    async fn realtime_batch(&self, tickers: &[String]) -> Vec<(String, Result<Quote, FetchError>)> {
        let mut out = Vec::with_capacity(tickers.len());
        for t in tickers {
            out.push((t.clone(), self.realtime(t).await));
        }
        out
    }

    async fn name(&self, ticker: &str) -> Result<String, FetchError> {
        let quote = self.realtime(ticker).await?;
        quote.name.ok_or_else(|| FetchError::NotFound(ticker.to_string()))
    }
}

/// Validate the series contract: strictly increasing dates, no
/// duplicates. Sources returning unordered data are malformed.
pub fn validate_series(source_name: &'static str, candles: &[Candle]) -> Result<(), FetchError> {
    for pair in candles.windows(2) {
        if pair[1].date <= pair[0].date {
            return Err(FetchError::Malformed {
                source_name,
                message: format!(
                    "candle dates not strictly increasing: {} then {}",
                    pair[0].date, pair[1].date
                ),
            });
        }
    }
    Ok(())
}
