/// Orthogonal search dimensions issued per ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    CompanyNews,
    SectorNews,
    RiskCheck,
    Earnings,
    MarketCommentary,
}

pub const MAX_SEARCH_DIMENSIONS: usize = 5;

pub const ALL_DIMENSIONS: [Dimension; MAX_SEARCH_DIMENSIONS] = [
    Dimension::CompanyNews,
    Dimension::SectorNews,
    Dimension::RiskCheck,
    Dimension::Earnings,
    Dimension::MarketCommentary,
];

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::CompanyNews => "company_news",
            Dimension::SectorNews => "sector_news",
            Dimension::RiskCheck => "risk_check",
            Dimension::Earnings => "earnings",
            Dimension::MarketCommentary => "market_commentary",
        }
    }
}

/// A-share ETF codes start 51/56/58 (Shanghai) or 159 (Shenzhen).
fn is_etf(ticker: &str) -> bool {
    ticker.starts_with("51")
        || ticker.starts_with("56")
        || ticker.starts_with("58")
        || ticker.starts_with("159")
}

/// Templated queries for one ticker, capped at `max` dimensions.
///
/// ETF tickers use fund-flavored templates that avoid fund-manager and
/// shareholder noise the stock templates would attract.
pub fn queries_for(ticker: &str, name: &str, max: usize) -> Vec<(Dimension, String)> {
    let subject = if name.is_empty() { ticker.to_string() } else { format!("{name} {ticker}") };
    let etf = is_etf(ticker);
    ALL_DIMENSIONS
        .iter()
        .take(max.min(MAX_SEARCH_DIMENSIONS))
        .map(|dim| {
            let query = match (dim, etf) {
                (Dimension::CompanyNews, false) => format!("{subject} 最新消息 公告"),
                (Dimension::CompanyNews, true) => format!("{subject} ETF 资金流向 规模变动"),
                (Dimension::SectorNews, false) => format!("{subject} 所属行业 板块动态"),
                (Dimension::SectorNews, true) => format!("{subject} 跟踪指数 成分股动态"),
                (Dimension::RiskCheck, false) => {
                    format!("{subject} 减持 处罚 业绩预亏 风险")
                }
                (Dimension::RiskCheck, true) => format!("{subject} 折价 溢价 清盘 风险"),
                (Dimension::Earnings, false) => format!("{subject} 业绩预告 财报 盈利"),
                (Dimension::Earnings, true) => format!("{subject} 净值 跟踪误差"),
                (Dimension::MarketCommentary, _) => format!("{subject} 市场观点 分析"),
            };
            (*dim, query)
        })
        .collect()
}
