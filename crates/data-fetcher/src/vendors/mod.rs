mod eastmoney;
mod sina;
mod tencent;
mod tushare;
mod yahoo;

pub use eastmoney::EastmoneyFetcher;
pub use sina::SinaFetcher;
pub use tencent::TencentFetcher;
pub use tushare::TushareFetcher;
pub use yahoo::YahooFetcher;

use std::sync::Arc;

use crate::DataFetcher;

/// Default source registry in priority order. Config overrides reorder
/// or disable individual entries at the pool layer; tushare joins only
/// when a token is configured.
pub fn default_sources(tushare_token: Option<String>) -> Vec<Arc<dyn DataFetcher>> {
    let mut sources: Vec<Arc<dyn DataFetcher>> = vec![
        Arc::new(EastmoneyFetcher::new()),
        Arc::new(TencentFetcher::new()),
        Arc::new(SinaFetcher::new()),
        Arc::new(YahooFetcher::new()),
    ];
    if let Some(token) = tushare_token {
        sources.push(Arc::new(TushareFetcher::new(token)));
    }
    sources
}
