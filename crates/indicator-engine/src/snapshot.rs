//! Builds the TechnicalSnapshot the pipeline attaches to the evidence
//! bundle, including the intraday virtual-candle rule.

use analysis_core::{Candle, Quote, TechnicalSnapshot};
use chrono::NaiveDate;

use crate::indicators;

#[derive(Debug, Clone, Copy)]
pub struct SnapshotOptions {
    /// Append a virtual candle at the live price before computing, when
    /// the quote is from the current trading day.
    pub realtime_indicators: bool,
    /// Base acceptance band for bias, in percent (BIAS_THRESHOLD).
    pub bias_threshold: f64,
    /// "Today" in the ticker's market timezone; quotes from other days
    /// never inject a virtual candle.
    pub today: NaiveDate,
}

/// Compute the snapshot for a candle series plus an optional live quote.
///
/// When a virtual candle is injected, its close is the live price and its
/// open/high/low carry the prior close forward: they only exist to keep
/// the MA window length honest and are not used elsewhere.
pub fn compute_snapshot(
    candles: &[Candle],
    quote: Option<&Quote>,
    opts: SnapshotOptions,
) -> TechnicalSnapshot {
    let mut series = candles.to_vec();
    let mut intraday = false;

    if opts.realtime_indicators {
        if let Some(q) = quote {
            let quote_date = q.timestamp.date_naive();
            let already_has_today = series.last().is_some_and(|c| c.date >= quote_date);
            if quote_date == opts.today && !already_has_today {
                if let Some(prev) = series.last().cloned() {
                    series.push(Candle {
                        date: quote_date,
                        open: prev.close,
                        high: prev.close.max(q.price),
                        low: prev.close.min(q.price),
                        close: q.price,
                        volume: 0.0,
                        amount: None,
                    });
                    intraday = true;
                }
            }
        }
    }

    let closes = indicators::closes(&series);
    let macd = indicators::macd(&closes, 12, 26, 9);
    let (macd_v, macd_sig, macd_hist) = match macd.last() {
        Some((a, b, c)) => (Some(a), Some(b), Some(c)),
        None => (None, None, None),
    };

    let bullish_alignment = indicators::bullish_alignment(&closes);
    let trend_strength = indicators::trend_strength(&closes);
    TechnicalSnapshot {
        ma5: indicators::sma_last(&closes, 5),
        ma10: indicators::sma_last(&closes, 10),
        ma20: indicators::sma_last(&closes, 20),
        macd: macd_v,
        macd_signal: macd_sig,
        macd_histogram: macd_hist,
        rsi14: indicators::rsi(&closes, 14).last().copied(),
        bias_pct: indicators::bias_pct(&closes, 20),
        bias_band_pct: effective_bias_band(bullish_alignment, trend_strength, opts.bias_threshold),
        bullish_alignment,
        trend_strength,
        intraday,
    }
}

/// Effective bias acceptance band: strong trends get 1.5x headroom.
fn effective_bias_band(bullish_alignment: bool, trend_strength: f64, base: f64) -> f64 {
    if bullish_alignment && trend_strength >= 70.0 {
        base * 1.5
    } else {
        base
    }
}
