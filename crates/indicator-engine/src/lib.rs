pub mod indicators;
pub mod snapshot;

#[cfg(test)]
mod indicators_tests;

pub use indicators::{ema, macd, rsi, sma, MacdResult};
pub use snapshot::{compute_snapshot, SnapshotOptions};
