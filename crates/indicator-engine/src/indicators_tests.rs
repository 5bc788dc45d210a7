use analysis_core::{Candle, Quote};
use chrono::NaiveDate;

use crate::indicators::*;
use crate::snapshot::{compute_snapshot, SnapshotOptions};

fn day(n: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 1).unwrap() + chrono::Duration::days(n as i64)
}

fn candles_from(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            date: day(i as u32),
            open: close - 0.5,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1_000_000.0,
            amount: None,
        })
        .collect()
}

fn rising(n: usize) -> Vec<f64> {
    (0..n).map(|i| 100.0 + i as f64).collect()
}

#[test]
fn sma_matches_hand_computation() {
    let out = sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
    assert_eq!(out.len(), 3);
    assert!((out[0] - 2.0).abs() < 1e-9);
    assert!((out[2] - 4.0).abs() < 1e-9);
    assert_eq!(sma_last(&[1.0, 2.0, 3.0, 4.0, 5.0], 3), Some(4.0));
}

#[test]
fn sma_short_series_is_empty() {
    assert!(sma(&[1.0, 2.0], 5).is_empty());
    assert_eq!(sma_last(&[1.0, 2.0], 5), None);
}

#[test]
fn ema_seeds_with_sma_and_follows_trend() {
    let data = rising(10);
    let out = ema(&data, 3);
    assert_eq!(out.len(), data.len());
    assert!((out[0] - 100.0).abs() < 1e-9);
    for w in out.windows(2) {
        assert!(w[1] > w[0]);
    }
}

#[test]
fn rsi_bounded_and_saturates_on_pure_uptrend() {
    let out = rsi(&rising(30), 14);
    assert!(!out.is_empty());
    for v in &out {
        assert!((0.0..=100.0).contains(v));
    }
    assert!((out.last().unwrap() - 100.0).abs() < 1e-9);
}

#[test]
fn macd_positive_in_uptrend() {
    let result = macd(&rising(60), 12, 26, 9);
    let (line, signal, hist) = result.last().unwrap();
    assert!(line > 0.0);
    assert!(signal > 0.0);
    assert!(hist.abs() < line.abs() + 1.0);
}

#[test]
fn bias_is_zero_for_flat_series() {
    let flat = vec![50.0; 30];
    let b = bias_pct(&flat, 20).unwrap();
    assert!(b.abs() < 1e-9);
}

#[test]
fn alignment_requires_strict_ordering() {
    assert!(bullish_alignment(&rising(30)));
    let falling: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
    assert!(!bullish_alignment(&falling));
    assert!(!bullish_alignment(&[1.0; 30]));
}

#[test]
fn trend_strength_ranks_steeper_trends_higher() {
    let steep: Vec<f64> = (0..40).map(|i| 100.0 * 1.02f64.powi(i)).collect();
    let shallow: Vec<f64> = (0..40).map(|i| 100.0 + 0.05 * i as f64).collect();
    assert!(trend_strength(&steep) > trend_strength(&shallow));
    assert!(trend_strength(&steep) <= 100.0);
    assert_eq!(trend_strength(&[1.0; 5]), 0.0);
}

#[test]
fn virtual_candle_moves_snapshot_to_live_price() {
    let candles = candles_from(&rising(30));
    let last_date = candles.last().unwrap().date;
    let today = last_date + chrono::Duration::days(1);
    let quote = Quote {
        ticker: "600519".into(),
        name: None,
        price: 150.0,
        change_pct: 2.0,
        volume_ratio: None,
        turnover_rate: None,
        timestamp: today.and_hms_opt(6, 0, 0).unwrap().and_utc(),
        source: "test".into(),
    };

    let with_rt = compute_snapshot(
        &candles,
        Some(&quote),
        SnapshotOptions { realtime_indicators: true, bias_threshold: 5.0, today },
    );
    let without_rt = compute_snapshot(
        &candles,
        Some(&quote),
        SnapshotOptions { realtime_indicators: false, bias_threshold: 5.0, today },
    );

    assert!(with_rt.intraday);
    assert!(!without_rt.intraday);
    // The injected close (150) is far above the trend tail (~129), so the
    // realtime MA5 must exceed the close-only MA5.
    assert!(with_rt.ma5.unwrap() > without_rt.ma5.unwrap());
}

#[test]
fn stale_quote_never_injects() {
    let candles = candles_from(&rising(30));
    let today = candles.last().unwrap().date + chrono::Duration::days(3);
    let quote = Quote {
        ticker: "600519".into(),
        name: None,
        price: 150.0,
        change_pct: 0.0,
        volume_ratio: None,
        turnover_rate: None,
        // Quote from an older day than `today`.
        timestamp: candles.last().unwrap().date.and_hms_opt(6, 0, 0).unwrap().and_utc(),
        source: "test".into(),
    };
    let snap = compute_snapshot(
        &candles,
        Some(&quote),
        SnapshotOptions { realtime_indicators: true, bias_threshold: 5.0, today },
    );
    assert!(!snap.intraday);
}

#[test]
fn strong_trend_widens_bias_band() {
    let steep: Vec<f64> = (0..40).map(|i| 100.0 * 1.02f64.powi(i)).collect();
    let snap = compute_snapshot(
        &candles_from(&steep),
        None,
        SnapshotOptions {
            realtime_indicators: false,
            bias_threshold: 5.0,
            today: day(50),
        },
    );
    assert!(snap.bullish_alignment);
    assert!(snap.trend_strength >= 70.0);
    assert_eq!(snap.bias_band_pct, 7.5);

    // A flat series never widens.
    let flat_snap = compute_snapshot(
        &candles_from(&[100.0; 30]),
        None,
        SnapshotOptions {
            realtime_indicators: false,
            bias_threshold: 5.0,
            today: day(50),
        },
    );
    assert_eq!(flat_snap.bias_band_pct, 5.0);
}
