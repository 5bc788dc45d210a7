//! Indicator math over daily candle series. Pure functions, no I/O.
//!
//! Series-returning functions align their output to the *end* of the
//! input: the last element always describes the most recent bar.

use analysis_core::Candle;

pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

/// Simple moving average over the trailing `period` values, one output
/// per input bar from the first full window onward.
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }
    let mut out = Vec::with_capacity(data.len() + 1 - period);
    let mut window_sum: f64 = data[..period].iter().sum();
    out.push(window_sum / period as f64);
    for i in period..data.len() {
        window_sum += data[i] - data[i - period];
        out.push(window_sum / period as f64);
    }
    out
}

/// Latest SMA value, or None when the series is shorter than `period`.
pub fn sma_last(data: &[f64], period: usize) -> Option<f64> {
    if period == 0 || data.len() < period {
        return None;
    }
    Some(data[data.len() - period..].iter().sum::<f64>() / period as f64)
}

/// Exponential moving average seeded with the SMA of the first window.
pub fn ema(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.is_empty() {
        return vec![];
    }
    if data.len() < period {
        // Short series: degrade to the running mean, one value.
        return vec![data.iter().sum::<f64>() / data.len() as f64];
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(data.len());
    out.push(data[..period].iter().sum::<f64>() / period as f64);
    for &x in &data[1..] {
        let prev = *out.last().expect("seeded above");
        out.push((x - prev) * k + prev);
    }
    out
}

/// RSI with Wilder smoothing. Output aligned to the end of the input.
pub fn rsi(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period + 1 {
        return vec![];
    }
    let deltas: Vec<f64> = data.windows(2).map(|w| w[1] - w[0]).collect();
    let mut avg_gain = deltas[..period].iter().filter(|d| **d > 0.0).sum::<f64>() / period as f64;
    let mut avg_loss =
        deltas[..period].iter().filter(|d| **d < 0.0).map(|d| -d).sum::<f64>() / period as f64;

    let mut out = Vec::with_capacity(deltas.len() - period + 1);
    let to_rsi = |gain: f64, loss: f64| {
        if loss == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + gain / loss)
        }
    };
    out.push(to_rsi(avg_gain, avg_loss));
    for &delta in &deltas[period..] {
        let (gain, loss) = if delta >= 0.0 { (delta, 0.0) } else { (0.0, -delta) };
        avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        out.push(to_rsi(avg_gain, avg_loss));
    }
    out
}

pub struct MacdResult {
    pub macd_line: Vec<f64>,
    pub signal_line: Vec<f64>,
    pub histogram: Vec<f64>,
}

impl MacdResult {
    pub fn last(&self) -> Option<(f64, f64, f64)> {
        Some((
            *self.macd_line.last()?,
            *self.signal_line.last()?,
            *self.histogram.last()?,
        ))
    }
}

/// MACD(fast, slow, signal) over closes.
pub fn macd(data: &[f64], fast: usize, slow: usize, signal: usize) -> MacdResult {
    if fast == 0 || slow == 0 || signal == 0 || slow <= fast || data.len() < slow {
        return MacdResult { macd_line: vec![], signal_line: vec![], histogram: vec![] };
    }
    let ema_fast = ema(data, fast);
    let ema_slow = ema(data, slow);
    // Both series end at the latest bar; align from the back.
    let n = ema_fast.len().min(ema_slow.len());
    let macd_line: Vec<f64> = (0..n)
        .map(|i| {
            ema_fast[ema_fast.len() - n + i] - ema_slow[ema_slow.len() - n + i]
        })
        .collect();
    let signal_line = ema(&macd_line, signal);
    let m = signal_line.len().min(macd_line.len());
    let histogram: Vec<f64> = (0..m)
        .map(|i| macd_line[macd_line.len() - m + i] - signal_line[signal_line.len() - m + i])
        .collect();
    MacdResult { macd_line, signal_line, histogram }
}

/// Deviation of the latest close from its `period`-day SMA, in percent.
pub fn bias_pct(data: &[f64], period: usize) -> Option<f64> {
    let ma = sma_last(data, period)?;
    let last = *data.last()?;
    if ma == 0.0 {
        return None;
    }
    Some((last - ma) / ma * 100.0)
}

/// MA5 > MA10 > MA20 at the most recent bar.
pub fn bullish_alignment(data: &[f64]) -> bool {
    match (sma_last(data, 5), sma_last(data, 10), sma_last(data, 20)) {
        (Some(a), Some(b), Some(c)) => a > b && b > c,
        _ => false,
    }
}

/// Composite trend strength in [0, 100]: slope of MA5, MA spread, and
/// momentum over the last 10 bars, equally weighted.
pub fn trend_strength(data: &[f64]) -> f64 {
    if data.len() < 20 {
        return 0.0;
    }
    let ma5_series = sma(data, 5);
    let slope_score = if ma5_series.len() >= 5 {
        let recent = &ma5_series[ma5_series.len() - 5..];
        let rise = (recent[4] - recent[0]) / recent[0].abs().max(f64::EPSILON) * 100.0;
        (rise * 10.0).clamp(0.0, 100.0)
    } else {
        0.0
    };

    let spread_score = match (sma_last(data, 5), sma_last(data, 20)) {
        (Some(fast), Some(slow)) if slow > 0.0 => {
            (((fast - slow) / slow) * 100.0 * 10.0).clamp(0.0, 100.0)
        }
        _ => 0.0,
    };

    let momentum_score = {
        let p0 = data[data.len() - 10];
        if p0 > 0.0 {
            ((data[data.len() - 1] - p0) / p0 * 100.0 * 5.0).clamp(0.0, 100.0)
        } else {
            0.0
        }
    };

    (slope_score + spread_score + momentum_score) / 3.0
}
