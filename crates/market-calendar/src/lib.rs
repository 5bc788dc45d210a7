mod holidays;
mod nyse;

use std::collections::HashSet;

use analysis_core::{Market, ReviewRegion};
use chrono::{Datelike, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;

/// Outcome of gating one batch against the trading calendars.
#[derive(Debug, Clone, PartialEq)]
pub struct GateDecision {
    /// Tickers whose market trades today.
    pub run: Vec<String>,
    /// (ticker, market) pairs skipped because the market is closed.
    pub skipped: Vec<(String, Option<Market>)>,
    /// True when every market in the batch is closed.
    pub all_closed: bool,
}

/// IANA timezone a market's "today" is resolved in.
pub fn market_timezone(market: Market) -> Tz {
    match market {
        Market::AShare => chrono_tz::Asia::Shanghai,
        Market::HongKong => chrono_tz::Asia::Hong_Kong,
        Market::Us => chrono_tz::America::New_York,
    }
}

/// Pure per-market trading-day check. Weekends never trade; otherwise the
/// market's holiday calendar decides. Dates outside the embedded tables
/// fail open (weekend rule only), matching the degraded behavior when no
/// calendar data is available.
pub fn is_trading_day(market: Market, date: NaiveDate) -> bool {
    if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }
    match market {
        Market::AShare => !holidays::cn_holiday(date),
        Market::HongKong => !holidays::hk_holiday(date),
        Market::Us => !nyse::nyse_holiday(date),
    }
}

/// Today's date in the market's own timezone. A server in UTC must not
/// mis-date an A-share session that already rolled over in Shanghai.
pub fn market_today(market: Market) -> NaiveDate {
    Utc::now().with_timezone(&market_timezone(market)).date_naive()
}

/// Markets currently in a trading day, each by its local date.
pub fn open_markets_today() -> HashSet<Market> {
    [Market::AShare, Market::HongKong, Market::Us]
        .into_iter()
        .filter(|m| is_trading_day(*m, market_today(*m)))
        .collect()
}

/// Partition a batch by market and drop tickers whose market is closed.
///
/// Unrecognized tickers fail open: they run. `bypass` (from `--force-run`
/// or TRADING_DAY_CHECK_ENABLED=false) keeps everything.
pub fn gate_batch(tickers: &[String], bypass: bool) -> GateDecision {
    if bypass {
        return GateDecision { run: tickers.to_vec(), skipped: Vec::new(), all_closed: false };
    }
    let open = open_markets_today();
    let mut run = Vec::new();
    let mut skipped = Vec::new();
    for ticker in tickers {
        match Market::of(ticker) {
            Some(market) if !open.contains(&market) => skipped.push((ticker.clone(), Some(market))),
            Some(_) => run.push(ticker.clone()),
            None => run.push(ticker.clone()),
        }
    }
    let all_closed = run.is_empty() && !skipped.is_empty();
    GateDecision { run, skipped, all_closed }
}

/// Effective market-review region for today.
///
/// Returns None when every configured region's market is closed (skip the
/// review entirely).
pub fn effective_review_region(
    configured: ReviewRegion,
    open: &HashSet<Market>,
) -> Option<ReviewRegion> {
    let cn = open.contains(&Market::AShare);
    let us = open.contains(&Market::Us);
    match configured {
        ReviewRegion::Cn => cn.then_some(ReviewRegion::Cn),
        ReviewRegion::Us => us.then_some(ReviewRegion::Us),
        ReviewRegion::Both => match (cn, us) {
            (true, true) => Some(ReviewRegion::Both),
            (true, false) => Some(ReviewRegion::Cn),
            (false, true) => Some(ReviewRegion::Us),
            (false, false) => None,
        },
    }
}
